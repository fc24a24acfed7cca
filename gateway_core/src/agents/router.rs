//! Fallback dispatch for tool calls the coordinator doesn't implement
//! locally, modeled on the original's MCP adapter fallback.

use async_trait::async_trait;

/// A tool call not recognized by the coordinator's built-in handlers is
/// offered to a `ToolRouter` before giving up. The default implementation
/// always reports the tool as unimplemented, matching the original's
/// behavior when no MCP adapter is configured.
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Attempt to dispatch `tool` with `args_json` outside the built-in
    /// handlers. Returns `None` if this router can't handle the tool.
    async fn call_tool(&self, tool: &str, args_json: &str) -> Option<String>;
}

/// Always declines; used when no external tool router is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullToolRouter;

#[async_trait]
impl ToolRouter for NullToolRouter {
    async fn call_tool(&self, _tool: &str, _args_json: &str) -> Option<String> {
        None
    }
}
