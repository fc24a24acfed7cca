//! Pluggable LLM collaborator. The concrete provider is out of scope for
//! this crate (see Non-goals); only the trait boundary the coordinator and
//! executor invoke is specified here.

use async_trait::async_trait;

/// A single turn of conversation sent to the model.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    /// Either "system", "user", or "assistant".
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

impl LlmMessage {
    /// Build a system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    /// Build a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// The minimal surface the Sub-Agent Coordinator and Executor need from an
/// LLM: turn a list of messages into one response string. Tool-use directives
/// are represented as plain text the executor parses (`TOOL: name {json}`)
/// rather than a structured function-call API, since no particular provider
/// is assumed.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a conversation, returning the model's response text.
    async fn complete(&self, messages: &[LlmMessage]) -> String;
}

/// A canned-response client for tests: returns a fixed string regardless of
/// input, or cycles through a script of responses if more than one is given.
pub struct ScriptedLlm {
    responses: tokio::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedLlm {
    /// Build a client that returns each of `responses` in order, then keeps
    /// returning the last one.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[LlmMessage]) -> String {
        let mut responses = self.responses.lock().await;
        if responses.len() > 1 {
            responses.pop_front().unwrap_or_default()
        } else {
            responses.front().cloned().unwrap_or_default()
        }
    }
}
