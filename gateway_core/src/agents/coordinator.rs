//! Spawn → validate → execute → synthesize pipeline with lesson persistence
//! and role-scoped tool boundaries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::agents::agent::SubAgent;
use crate::agents::executor::{SubAgentExecutor, ToolDispatch};
use crate::agents::fs_tools::WorkspaceFs;
use crate::agents::llm::{LlmClient, LlmMessage};
use crate::agents::memory::{Lesson, LessonSink};
use crate::agents::role::SubAgentRole;
use crate::agents::router::ToolRouter;

/// A pending request to spawn a sub-agent.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Unique name to register the agent under.
    pub name: String,
    /// Task description.
    pub task: String,
    /// Role name, parsed leniently (unknown names fall back to Assistant).
    pub role: String,
}

/// Strict-boolean authorization check for a tool's scope. Implementations
/// MUST return the literal `true`/`false` the trait signature already
/// enforces — this is what makes the check resistant to permissive mocks
/// that a dynamically-typed equivalent would need to guard against
/// explicitly.
#[async_trait]
pub trait PolicyCallback: Send + Sync {
    /// Whether `agent_name` may invoke a tool requiring `scope`.
    async fn is_authorized(&self, agent_name: &str, scope: &str) -> bool;
}

/// Always authorizes. Useful for tests and for deployments that only rely
/// on the role scope-set boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllPolicy;

#[async_trait]
impl PolicyCallback for AllowAllPolicy {
    async fn is_authorized(&self, _agent_name: &str, _scope: &str) -> bool {
        true
    }
}

/// Receives a best-effort notification when a lesson is persisted (e.g. to
/// forward to subscribed WS clients). Failures inside an implementation
/// must be swallowed by that implementation; this trait has no `Result` on
/// purpose.
#[async_trait]
pub trait LessonObserver: Send + Sync {
    /// Notify observers of a newly persisted lesson.
    async fn notify(&self, lesson: &Lesson);
}

/// The RAG collaborator `query_rag` forwards to. Out of scope to implement
/// here; only the call shape is specified.
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Run `query` against the index and return its textual result.
    async fn query(&self, query: &str) -> String;
}

#[derive(Clone, Copy)]
struct AgentRecord {
    role: SubAgentRole,
    active: bool,
}

/// Coordinates the full sub-agent lifecycle.
pub struct SubAgentCoordinator {
    agents: Mutex<HashMap<String, AgentRecord>>,
    llm: Arc<dyn LlmClient>,
    lessons: Arc<dyn LessonSink>,
    policy: Arc<dyn PolicyCallback>,
    fs: WorkspaceFs,
    rag: Option<Arc<dyn RagBackend>>,
    tool_router: Arc<dyn ToolRouter>,
    observer: Option<Arc<dyn LessonObserver>>,
}

impl SubAgentCoordinator {
    /// Build a coordinator from its collaborators.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        lessons: Arc<dyn LessonSink>,
        policy: Arc<dyn PolicyCallback>,
        fs: WorkspaceFs,
        rag: Option<Arc<dyn RagBackend>>,
        tool_router: Arc<dyn ToolRouter>,
        observer: Option<Arc<dyn LessonObserver>>,
    ) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            llm,
            lessons,
            policy,
            fs,
            rag,
            tool_router,
            observer,
        }
    }

    /// Whether `name` is currently reachable through the agent table.
    pub async fn is_registered(&self, name: &str) -> bool {
        self.agents.lock().await.contains_key(name)
    }

    /// Spawn, validate, run, and synthesize a sub-agent, returning the
    /// summary string a caller should surface.
    pub async fn spawn(&self, request: SpawnRequest) -> String {
        let role = SubAgentRole::parse(&request.role);
        let mut agent = SubAgent::new(request.name.clone(), role, request.task.clone());

        let plan_prompt = format!(
            "Propose a numbered plan for role {} to accomplish: {}",
            role.label(),
            agent.task
        );
        let plan_response = self.llm.complete(&[LlmMessage::user(plan_prompt)]).await;
        agent.generate_plan(&plan_response);

        let validation_prompt = format!(
            "Pre-flight review. task={:?} name={:?} role={:?} plan={:?}. \
             Respond with VALID if this plan is safe to execute, otherwise DENY with a reason.",
            agent.task, agent.name, role.label(), agent.plan
        );
        let validation = self.llm.complete(&[LlmMessage::user(validation_prompt)]).await;
        if !validation.to_lowercase().contains("valid") {
            self.agents.lock().await.remove(&agent.name);
            return "blocked by pre-flight check".to_string();
        }

        agent.active = true;
        agent.managed = true;
        self.agents
            .lock()
            .await
            .insert(agent.name.clone(), AgentRecord { role, active: true });

        let raw_result = SubAgentExecutor::run(&mut agent, self.llm.as_ref(), self).await;

        let synthesis_prompt = format!(
            "Summarize this agent run as a JSON object with keys summary, findings, \
             learned_lesson, next_steps. Run output: {raw_result}"
        );
        let synthesis = self.llm.complete(&[LlmMessage::user(synthesis_prompt)]).await;

        self.extract_and_persist(&agent, &synthesis).await
    }

    async fn extract_and_persist(&self, agent: &SubAgent, synthesis: &str) -> String {
        let Some(value) = extract_json_object(synthesis) else {
            return synthesis.to_string();
        };

        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or(synthesis)
            .to_string();

        if let Some(lesson_text) = value.get("learned_lesson").and_then(Value::as_str) {
            let created_at = chrono::Utc::now().timestamp();
            let lesson = Lesson {
                key: format!("lesson_{}_{}", agent.name, created_at),
                kind: "learned_lesson",
                content: lesson_text.to_string(),
                tags: vec![agent.name.clone(), agent.role.label().to_string(), "synthesis".to_string()],
                created_at,
            };

            let _ = self.lessons.write(lesson.clone()).await;
            if let Some(observer) = &self.observer {
                observer.notify(&lesson).await;
            }
        }

        summary
    }

    /// Execute a single tool call on behalf of a registered, active agent.
    pub async fn execute_tool(&self, agent_name: &str, tool: &str, args_json: &str) -> String {
        let record = match self.agents.lock().await.get(agent_name).copied() {
            Some(record) => record,
            None => return "Agent not found".to_string(),
        };

        if !record.active {
            return "not active or validated".to_string();
        }

        let Some(scope) = tool_scope(tool) else {
            return "outside the domain boundaries".to_string();
        };
        if !record.role.allows(scope) {
            return "outside the domain boundaries".to_string();
        }

        // Strict comparison against the literal `true`, not just truthiness,
        // so a permissive policy mock can't slip a non-bool past this check.
        #[allow(clippy::bool_comparison)]
        if self.policy.is_authorized(agent_name, scope).await != true {
            return "Permission denied".to_string();
        }

        self.dispatch_tool(tool, args_json).await
    }

    async fn dispatch_tool(&self, tool: &str, args_json: &str) -> String {
        let args: Value = serde_json::from_str(args_json).unwrap_or(Value::Null);

        match tool {
            "read_file" => {
                let path = args.get("path").and_then(Value::as_str).unwrap_or("").to_string();
                match self.fs.read_file_text(path).await {
                    Ok(content) => content,
                    Err(err) => err,
                }
            }
            "write_file" => {
                let path = args.get("path").and_then(Value::as_str).unwrap_or("").to_string();
                let content = args.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                match self.fs.write_file(path, content.into_bytes()).await {
                    Ok(msg) => msg,
                    Err(err) => err,
                }
            }
            "query_rag" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                match &self.rag {
                    Some(rag) => rag.query(query).await,
                    None => "logic not implemented".to_string(),
                }
            }
            other => self
                .tool_router
                .call_tool(other, args_json)
                .await
                .unwrap_or_else(|| "logic not implemented".to_string()),
        }
    }
}

#[async_trait]
impl ToolDispatch for SubAgentCoordinator {
    async fn execute_tool(&self, agent_name: &str, tool: &str, args_json: &str) -> String {
        SubAgentCoordinator::execute_tool(self, agent_name, tool, args_json).await
    }
}

fn tool_scope(tool: &str) -> Option<&'static str> {
    match tool {
        "read_file" => Some("fs.read"),
        "write_file" => Some("fs.write"),
        "run_test" => Some("shell.test"),
        "query_rag" => Some("rag.query"),
        "analyze_data" => Some("data.execute"),
        "security_audit" => Some("security.audit"),
        "memory_search" => Some("memory.search"),
        _ => None,
    }
}

/// Extract the first balanced `{...}` JSON object from free-form text,
/// mirroring the original's DOTALL regex extraction without needing a
/// regex dependency for a single bounded scan.
fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::llm::ScriptedLlm;
    use crate::agents::memory::InMemoryLessonStore;
    use crate::agents::router::NullToolRouter;

    fn coordinator(llm_responses: Vec<String>, lessons: Arc<InMemoryLessonStore>) -> SubAgentCoordinator {
        SubAgentCoordinator::new(
            Arc::new(ScriptedLlm::new(llm_responses)),
            lessons,
            Arc::new(AllowAllPolicy),
            WorkspaceFs::new(std::env::temp_dir()),
            None,
            Arc::new(NullToolRouter),
            None,
        )
    }

    #[tokio::test]
    async fn pre_flight_denial_blocks_registration() {
        let lessons = Arc::new(InMemoryLessonStore::new());
        let coordinator = coordinator(
            vec![
                "1. rm -rf production/*".to_string(),
                "DENY: destructive".to_string(),
            ],
            lessons,
        );

        let result = coordinator
            .spawn(SpawnRequest {
                name: "a1".to_string(),
                task: "delete production".to_string(),
                role: "Senior Dev".to_string(),
            })
            .await;

        assert!(result.contains("blocked by pre-flight check"));
        assert!(!coordinator.is_registered("a1").await);
    }

    #[tokio::test]
    async fn valid_run_persists_lesson_with_expected_tags() {
        let lessons = Arc::new(InMemoryLessonStore::new());
        let coordinator = coordinator(
            vec![
                "1. Investigate X".to_string(),
                "VALID".to_string(),
                "Found X".to_string(),
                r#"{"summary":"ok","learned_lesson":"CRITICAL: always back up X"}"#.to_string(),
            ],
            lessons.clone(),
        );

        let result = coordinator
            .spawn(SpawnRequest {
                name: "a1".to_string(),
                task: "investigate".to_string(),
                role: "Assistant".to_string(),
            })
            .await;

        assert_eq!(result, "ok");
        let all = lessons.all().await;
        assert_eq!(all.len(), 1);
        assert!(all[0].content.starts_with("CRITICAL:"));
        assert!(all[0].tags.contains(&"a1".to_string()));
    }

    #[tokio::test]
    async fn execute_tool_rejects_unknown_agent() {
        let lessons = Arc::new(InMemoryLessonStore::new());
        let coordinator = coordinator(vec!["VALID".to_string()], lessons);
        let result = coordinator.execute_tool("ghost", "read_file", "{}").await;
        assert_eq!(result, "Agent not found");
    }

    #[tokio::test]
    async fn execute_tool_rejects_out_of_scope_tool() {
        let lessons = Arc::new(InMemoryLessonStore::new());
        let coordinator = coordinator(
            vec![
                "1. query".to_string(),
                "VALID".to_string(),
                "done".to_string(),
                r#"{"summary":"done"}"#.to_string(),
            ],
            lessons,
        );
        coordinator
            .spawn(SpawnRequest {
                name: "assistant1".to_string(),
                task: "answer questions".to_string(),
                role: "Assistant".to_string(),
            })
            .await;

        let result = coordinator.execute_tool("assistant1", "write_file", "{}").await;
        assert_eq!(result, "outside the domain boundaries");
    }
}
