//! Accepts classified connections, runs admission/tagging, and forwards
//! frames to a registered handler. Transport-agnostic: the binary crate
//! owns the actual WebSocket, this module owns the policy around it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::codec::FrameCodec;
use crate::core::health::HealthMonitor;
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::ConnectionRegistry;
use crate::core::trust::{Classification, TrustClassifier};
use crate::core::tunnel::TunnelSupervisor;
use crate::model::{ClientConnection, ConnectionClass, ErrorFrame, Frame, FrameMeta};

/// A writable, closable handle to a single client's transport. Implemented
/// by the gateway binary over an axum `WebSocket` (or equivalent).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single text frame. Returns `false` on any transport error;
    /// the gateway treats that as cause to evict the client.
    async fn send_text(&self, text: String) -> bool;

    /// Best-effort close. Must never panic or block indefinitely.
    async fn close(&self);
}

/// Callback invoked with every tagged, admitted frame.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Handle one inbound frame. Must not raise; errors are this handler's
    /// own responsibility to log.
    async fn handle(&self, client_id: &str, frame: Frame);
}

/// Outcome of ingesting one raw inbound message, from the caller's point of
/// view: either the frame was forwarded, or a short error frame should be
/// sent back to the client (never a disconnect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Frame was admitted, tagged, and handed to the handler.
    Forwarded,
    /// Admission denied; wire text of the error frame to send.
    RateLimited(String),
    /// JSON parse failed; wire text of the error frame to send.
    InvalidJson(String),
}

/// Configuration for which classes should have a tunnel started at `start()`.
#[derive(Debug, Default, Clone)]
pub struct DesiredTunnels(pub Vec<ConnectionClass>);

struct Registered {
    transport: Arc<dyn Transport>,
}

/// The Unified Gateway: ties together classification, rate limiting,
/// optional encryption, the connection registry, tunnel supervision, and
/// health monitoring.
pub struct UnifiedGateway {
    registry: Arc<ConnectionRegistry>,
    rate_limiter: Arc<RateLimiter>,
    classifier: TrustClassifier,
    codec: Option<FrameCodec>,
    tunnels: Arc<TunnelSupervisor>,
    health: Arc<HealthMonitor>,
    desired_tunnels: DesiredTunnels,
    transports: Mutex<HashMap<String, Registered>>,
    handler: Mutex<Option<Arc<dyn FrameHandler>>>,
}

impl UnifiedGateway {
    /// Build a gateway from its collaborators. `codec` is `None` when
    /// encryption is disabled.
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        tunnels: Arc<TunnelSupervisor>,
        health: Arc<HealthMonitor>,
        desired_tunnels: DesiredTunnels,
        codec: Option<FrameCodec>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rate_limiter,
            classifier: TrustClassifier,
            codec,
            tunnels,
            health,
            desired_tunnels,
            transports: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
        }
    }

    /// Shared registry handle, for diagnostics or the binary's shutdown path.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Install the frame-received callback, the orchestrator bridge.
    pub async fn register_handler(&self, handler: Arc<dyn FrameHandler>) {
        *self.handler.lock().await = Some(handler);
    }

    /// Start tunnels for every class with `desired=true` and the health
    /// monitor loop. The local accept listener itself is bound by the
    /// binary before or after calling this; order between the two doesn't
    /// matter since neither depends on the other being ready first.
    pub async fn start(self: &Arc<Self>) {
        for class in &self.desired_tunnels.0 {
            self.tunnels.start(*class).await;
        }
        let health = self.health.clone();
        tokio::spawn(async move { health.run().await });
    }

    /// Close all client transports, drain the registry, terminate tunnels,
    /// and stop the health monitor. Idempotent: calling twice on an already
    /// empty gateway is a no-op.
    pub async fn stop(&self) {
        self.health.cancel();

        let mut transports = self.transports.lock().await;
        for (_, registered) in transports.drain() {
            registered.transport.close().await;
        }
        drop(transports);

        self.registry.drain().await;
        self.tunnels.stop_all().await;
    }

    /// Classify and register a new connection, returning its client id.
    /// Call once per accepted socket, before reading any frames.
    pub async fn accept(
        &self,
        peer: &str,
        headers: &HashMap<String, String>,
        user_agent: Option<String>,
        authenticated: bool,
        transport: Arc<dyn Transport>,
    ) -> (String, ConnectionClass) {
        let Classification { class, peer } = self.classifier.classify(peer, headers);
        let client_id = ClientConnection::derive_id(class, &peer, user_agent.as_deref());

        self.registry
            .register(ClientConnection {
                id: client_id.clone(),
                class,
                peer,
                since: chrono::Utc::now().timestamp(),
                authenticated,
                user_agent,
                country: None,
            })
            .await;

        self.transports
            .lock()
            .await
            .insert(client_id.clone(), Registered { transport });

        (client_id, class)
    }

    /// Unregister a connection and close its transport. Called on read-loop
    /// exit; safe to call even if the client was never registered.
    pub async fn disconnect(&self, client_id: &str) {
        self.registry.unregister(client_id).await;
        if let Some(registered) = self.transports.lock().await.remove(client_id) {
            registered.transport.close().await;
        }
    }

    /// Ingest one raw inbound message for an already-registered client:
    /// decrypt if enabled, admit, parse, tag, and dispatch to the handler.
    ///
    /// `raw` should already be normalized to text by the caller (best-effort
    /// UTF-8 decode of the wire bytes, coercing failures to an empty
    /// string) — this function never panics on malformed
    /// input.
    pub async fn ingest(&self, client_id: &str, raw: &str) -> IngestOutcome {
        let Some(conn) = self.registry.get(client_id).await else {
            return IngestOutcome::InvalidJson(ErrorFrame::to_wire("Internal error"));
        };

        if !self.rate_limiter.admit(conn.class, client_id).await {
            return IngestOutcome::RateLimited(ErrorFrame::to_wire("Rate limit exceeded"));
        }

        let text = match &self.codec {
            Some(codec) => codec.decrypt(raw),
            None => raw.to_string(),
        };

        let mut frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(_) => return IngestOutcome::InvalidJson(ErrorFrame::to_wire("Invalid JSON")),
        };

        frame.tag(FrameMeta {
            connection_type: conn.class.wire_name().to_string(),
            client_id: client_id.to_string(),
            ip_address: conn.peer.clone(),
            authenticated: conn.authenticated,
        });

        if let Some(handler) = self.handler.lock().await.clone() {
            handler.handle(client_id, frame).await;
        }

        IngestOutcome::Forwarded
    }

    /// Serialize and send `frame` to `client_id`. On transport failure, the
    /// client is evicted. Returns whether the send succeeded.
    pub async fn send(&self, client_id: &str, frame: &Frame) -> bool {
        let transport = self.transports.lock().await.get(client_id).map(|r| r.transport.clone());
        let Some(transport) = transport else {
            return false;
        };

        let mut text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(_) => return false,
        };
        if let Some(codec) = &self.codec {
            text = codec.encrypt(&text);
        }

        let ok = transport.send_text(text).await;
        if !ok {
            self.disconnect(client_id).await;
        }
        ok
    }

    /// Best-effort send of a raw (already-serialized) error frame, swallowing
    /// failures — errors here are always best-effort.
    pub async fn send_error(&self, client_id: &str, wire_error: &str) {
        if let Some(transport) = self.transports.lock().await.get(client_id).map(|r| r.transport.clone()) {
            let _ = transport.send_text(wire_error.to_string()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use std::collections::HashSet;
    use crate::model::RateLimits;

    struct RecordingTransport {
        fail: AtomicBool,
        sent: StdMutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { fail: AtomicBool::new(false), sent: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, text: String) -> bool {
            if self.fail.load(Ordering::SeqCst) {
                return false;
            }
            self.sent.lock().unwrap().push(text);
            true
        }

        async fn close(&self) {}
    }

    struct RecordingHandler {
        frames: tokio::sync::Mutex<Vec<(String, Frame)>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self { frames: tokio::sync::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl FrameHandler for RecordingHandler {
        async fn handle(&self, client_id: &str, frame: Frame) {
            self.frames.lock().await.push((client_id.to_string(), frame));
        }
    }

    fn gateway() -> Arc<UnifiedGateway> {
        Arc::new(UnifiedGateway::new(
            Arc::new(RateLimiter::new(RateLimits::default())),
            Arc::new(TunnelSupervisor::new(HashMap::new())),
            Arc::new(HealthMonitor::new(
                Arc::new(TunnelSupervisor::new(HashMap::new())),
                HashSet::new(),
                None,
            )),
            DesiredTunnels(Vec::new()),
            None,
        ))
    }

    #[tokio::test]
    async fn accept_registers_client_and_ingest_tags_class() {
        let gw = gateway();
        let handler = Arc::new(RecordingHandler::new());
        gw.register_handler(handler.clone()).await;

        let transport = Arc::new(RecordingTransport::new());
        let (client_id, class) = gw
            .accept("127.0.0.1", &HashMap::new(), Some("curl".to_string()), false, transport)
            .await;
        assert_eq!(class, ConnectionClass::Local);
        assert!(gw.registry().contains(&client_id).await);

        let outcome = gw.ingest(&client_id, r#"{"type":"message","content":"hi"}"#).await;
        assert_eq!(outcome, IngestOutcome::Forwarded);

        let frames = handler.frames.lock().await;
        assert_eq!(frames.len(), 1);
        let (seen_client, frame) = &frames[0];
        assert_eq!(seen_client, &client_id);
        let meta = frame.meta.as_ref().expect("tagged frame carries meta");
        assert_eq!(meta.connection_type, "local");
        assert_eq!(meta.client_id, client_id);
    }

    #[tokio::test]
    async fn cloudflare_header_reclassifies_peer_and_forwards_ip_in_meta() {
        let gw = gateway();
        let handler = Arc::new(RecordingHandler::new());
        gw.register_handler(handler.clone()).await;

        let mut headers = HashMap::new();
        headers.insert("cf-connecting-ip".to_string(), "203.0.113.9".to_string());
        let transport = Arc::new(RecordingTransport::new());
        let (client_id, class) = gw.accept("10.0.0.5", &headers, None, false, transport).await;
        assert_eq!(class, ConnectionClass::Tunneled);

        gw.ingest(&client_id, r#"{"type":"message","content":"hi"}"#).await;
        let frames = handler.frames.lock().await;
        let meta = frames[0].1.meta.as_ref().unwrap();
        assert_eq!(meta.connection_type, "cloudflare");
        assert_eq!(meta.ip_address, "203.0.113.9");
    }

    #[tokio::test]
    async fn client_supplied_meta_and_authenticated_are_overwritten() {
        let gw = gateway();
        let handler = Arc::new(RecordingHandler::new());
        gw.register_handler(handler.clone()).await;

        let transport = Arc::new(RecordingTransport::new());
        let (client_id, _) = gw.accept("127.0.0.1", &HashMap::new(), None, false, transport).await;

        let raw = r#"{"type":"shell.execute","params":{"command":"rm -rf /"},"_meta":{"connection_type":"direct","client_id":"spoofed","ip_address":"9.9.9.9","authenticated":true}}"#;
        gw.ingest(&client_id, raw).await;

        let frames = handler.frames.lock().await;
        let meta = frames[0].1.meta.as_ref().unwrap();
        assert_eq!(meta.connection_type, "local");
        assert_eq!(meta.client_id, client_id);
        assert!(!meta.authenticated);
    }

    #[tokio::test]
    async fn invalid_json_returns_error_outcome_without_dispatch() {
        let gw = gateway();
        let handler = Arc::new(RecordingHandler::new());
        gw.register_handler(handler.clone()).await;

        let transport = Arc::new(RecordingTransport::new());
        let (client_id, _) = gw.accept("127.0.0.1", &HashMap::new(), None, false, transport).await;

        let outcome = gw.ingest(&client_id, "not json").await;
        assert!(matches!(outcome, IngestOutcome::InvalidJson(_)));
        assert!(handler.frames.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_failure_evicts_client() {
        let gw = gateway();
        let transport = Arc::new(RecordingTransport::new());
        let (client_id, _) = gw.accept("127.0.0.1", &HashMap::new(), None, false, transport.clone()).await;

        transport.fail.store(true, Ordering::SeqCst);
        let frame = Frame { kind: "message".to_string(), payload: serde_json::Map::new(), meta: None };
        let ok = gw.send(&client_id, &frame).await;
        assert!(!ok);
        assert!(!gw.registry().contains(&client_id).await);
    }

    #[tokio::test]
    async fn stop_drains_registry_and_closes_transports() {
        let gw = gateway();
        let transport = Arc::new(RecordingTransport::new());
        gw.accept("127.0.0.1", &HashMap::new(), None, false, transport).await;
        assert_eq!(gw.registry().len().await, 1);

        gw.stop().await;
        assert!(gw.registry().is_empty().await);
    }
}
