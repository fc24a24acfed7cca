//! Sub-Agent Coordinator: spawn→validate→execute→synthesize pipeline with
//! role-scoped tool boundaries and workspace-confined filesystem tools.

/// The `SubAgent` record: identity, role, plan, and run history.
pub mod agent;
/// Spawn/execute_tool pipeline, pre-flight validation, lesson persistence.
pub mod coordinator;
/// Role-scoped execution loop for a planned task.
pub mod executor;
/// Path-confined, TOCTOU-safe filesystem tools.
pub mod fs_tools;
/// Pluggable LLM collaborator trait and a scripted test double.
pub mod llm;
/// Lesson persistence.
pub mod memory;
/// Fixed role enumeration and scope-sets.
pub mod role;
/// Fallback dispatch for tools not implemented locally.
pub mod router;

pub use agent::SubAgent;
pub use coordinator::{AllowAllPolicy, LessonObserver, PolicyCallback, RagBackend, SpawnRequest, SubAgentCoordinator};
pub use executor::{SubAgentExecutor, ToolDispatch};
pub use fs_tools::WorkspaceFs;
pub use llm::{LlmClient, LlmMessage, ScriptedLlm};
pub use memory::{InMemoryLessonStore, Lesson, LessonSink};
pub use role::SubAgentRole;
pub use router::{NullToolRouter, ToolRouter};
