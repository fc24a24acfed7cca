//! The orchestrator callback the ingress control flow ends at: bridges tagged
//! frames out of the gateway into the platform registry and the sub-agent
//! coordinator.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::agents::coordinator::{SpawnRequest, SubAgentCoordinator};
use gateway_core::core::{FrameHandler, UnifiedGateway};
use gateway_core::model::Frame;
use gateway_core::platform::registry::PlatformRegistry;
use serde_json::{json, Value};

/// Dispatches `platform_connect` frames to the platform registry and
/// `spawn_agent` frames to the sub-agent coordinator; every other frame kind
/// is accepted but otherwise unhandled by this crate, per the Non-goals
/// around concrete wire protocols and orchestration logic.
pub struct Orchestrator {
    gateway: Arc<UnifiedGateway>,
    platforms: Arc<PlatformRegistry>,
    agents: Arc<SubAgentCoordinator>,
}

impl Orchestrator {
    /// Build an orchestrator over the gateway it replies through and the
    /// two subsystems it bridges frames into.
    pub fn new(gateway: Arc<UnifiedGateway>, platforms: Arc<PlatformRegistry>, agents: Arc<SubAgentCoordinator>) -> Self {
        Self { gateway, platforms, agents }
    }

    async fn handle_platform_connect(&self, client_id: &str, frame: &Frame) {
        let platform = frame.payload.get("platform").and_then(Value::as_str).unwrap_or_default();
        let credentials = frame.payload.get("credentials").cloned().unwrap_or(Value::Null);
        let config = frame.payload.get("config").cloned().unwrap_or(Value::Null);

        let authenticated = frame.meta.as_ref().is_some_and(|meta| meta.authenticated);
        if platform.is_empty() || !authenticated {
            self.gateway
                .send_error(client_id, &gateway_core::model::ErrorFrame::to_wire("platform_connect requires authentication"))
                .await;
            return;
        }

        let adapter = self.platforms.connect(platform, &credentials, &config).await;
        let reply = Frame {
            kind: "platform_connect_ack".to_string(),
            payload: json!({ "platform": adapter.name() }).as_object().cloned().unwrap_or_default(),
            meta: None,
        };
        self.gateway.send(client_id, &reply).await;
    }

    async fn handle_spawn_agent(&self, client_id: &str, frame: &Frame) {
        let name = frame.payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let task = frame.payload.get("task").and_then(Value::as_str).unwrap_or_default().to_string();
        let role = frame.payload.get("role").and_then(Value::as_str).unwrap_or("assistant").to_string();

        let summary = self.agents.spawn(SpawnRequest { name, task, role }).await;
        let reply = Frame {
            kind: "spawn_agent_result".to_string(),
            payload: json!({ "summary": summary }).as_object().cloned().unwrap_or_default(),
            meta: None,
        };
        self.gateway.send(client_id, &reply).await;
    }
}

#[async_trait]
impl FrameHandler for Orchestrator {
    async fn handle(&self, client_id: &str, frame: Frame) {
        match frame.kind.as_str() {
            "platform_connect" => self.handle_platform_connect(client_id, &frame).await,
            "spawn_agent" => self.handle_spawn_agent(client_id, &frame).await,
            _ => {
                tracing::debug!(kind = %frame.kind, %client_id, "frame kind has no orchestrator binding");
            }
        }
    }
}
