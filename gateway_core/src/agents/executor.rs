//! Role-scoped execution loop for a planned sub-agent task.

use async_trait::async_trait;

use crate::agents::agent::{HistoryEntry, SubAgent};
use crate::agents::llm::{LlmClient, LlmMessage};

/// "max steps" sentinel returned when the executor exhausts its step budget
/// without the model producing a final plain-text answer.
pub const MAX_STEPS_SENTINEL: &str = "max steps reached without a final answer";

/// Delegate for dispatching a tool-use directive back through the
/// coordinator's `execute_tool` pipeline, kept as a trait so the
/// executor doesn't need to own or borrow the coordinator directly.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Execute one tool call on behalf of `agent_name`, returning the short
    /// result string (never an exception).
    async fn execute_tool(&self, agent_name: &str, tool: &str, args_json: &str) -> String;
}

/// One parsed tool-use directive out of a model response: `TOOL: name {json}`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolCall {
    tool: String,
    args_json: String,
}

fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    response
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("TOOL:")?;
            let rest = rest.trim();
            let (tool, args_json) = match rest.split_once(' ') {
                Some((tool, args)) => (tool.trim(), args.trim()),
                None => (rest, "{}"),
            };
            if tool.is_empty() {
                return None;
            }
            Some(ToolCall {
                tool: tool.to_string(),
                args_json: args_json.to_string(),
            })
        })
        .collect()
}

/// Runs a planned sub-agent to completion or to its step budget.
pub struct SubAgentExecutor;

impl SubAgentExecutor {
    /// Execute `agent`'s plan, up to `agent.max_steps` model turns.
    pub async fn run(agent: &mut SubAgent, llm: &dyn LlmClient, tools: &dyn ToolDispatch) -> String {
        let system = Self::build_context(agent);

        for _step in 0..agent.max_steps {
            let mut messages = vec![LlmMessage::system(system.clone()), LlmMessage::user(agent.task.clone())];
            for entry in &agent.history {
                messages.push(LlmMessage::user(entry.response.clone()));
            }

            let response = llm.complete(&messages).await;

            let calls = parse_tool_calls(&response);
            if calls.is_empty() {
                agent.history.push(HistoryEntry {
                    prompt: system.clone(),
                    response: response.clone(),
                });
                return response;
            }

            let mut tool_summary = String::new();
            for call in calls {
                let result = tools.execute_tool(&agent.name, &call.tool, &call.args_json).await;
                tool_summary.push_str(&format!("{}: {}\n", call.tool, result));
            }
            agent.history.push(HistoryEntry {
                prompt: system.clone(),
                response: tool_summary,
            });
        }

        MAX_STEPS_SENTINEL.to_string()
    }

    fn build_context(agent: &SubAgent) -> String {
        let scopes: Vec<&str> = agent.role.scopes().into_iter().collect();
        format!(
            "role={} scopes={:?} plan={:?}",
            agent.role.label(),
            scopes,
            agent.plan
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::llm::ScriptedLlm;
    use crate::agents::role::SubAgentRole;

    struct EchoTools;

    #[async_trait]
    impl ToolDispatch for EchoTools {
        async fn execute_tool(&self, _agent_name: &str, tool: &str, _args_json: &str) -> String {
            format!("ran {tool}")
        }
    }

    #[tokio::test]
    async fn plain_text_response_returns_immediately() {
        let mut agent = SubAgent::new("a1", SubAgentRole::Assistant, "summarize logs");
        let llm = ScriptedLlm::new(vec!["all good".to_string()]);
        let result = SubAgentExecutor::run(&mut agent, &llm, &EchoTools).await;
        assert_eq!(result, "all good");
    }

    #[tokio::test]
    async fn tool_directive_is_dispatched_then_loop_continues() {
        let mut agent = SubAgent::new("a1", SubAgentRole::SeniorDev, "read config");
        let llm = ScriptedLlm::new(vec![
            "TOOL: read_file {\"path\":\"a.txt\"}".to_string(),
            "done".to_string(),
        ]);
        let result = SubAgentExecutor::run(&mut agent, &llm, &EchoTools).await;
        assert_eq!(result, "done");
        assert!(agent.history[0].response.contains("ran read_file"));
    }

    #[tokio::test]
    async fn exhausting_max_steps_returns_sentinel() {
        let mut agent = SubAgent::new("a1", SubAgentRole::SeniorDev, "loop forever");
        agent.max_steps = 2;
        let llm = ScriptedLlm::new(vec!["TOOL: read_file {}".to_string()]);
        let result = SubAgentExecutor::run(&mut agent, &llm, &EchoTools).await;
        assert_eq!(result, MAX_STEPS_SENTINEL);
    }
}
