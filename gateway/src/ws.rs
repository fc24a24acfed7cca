//! axum WebSocket termination: upgrade handling, header normalization, and
//! the per-connection read loop that drives `UnifiedGateway::ingest`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use gateway_core::core::trust::TrustClassifier;
use gateway_core::core::{IngestOutcome, Transport, UnifiedGateway};
use tokio::sync::Mutex;

/// Shared state axum hands to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The gateway instance handlers dispatch into.
    pub gateway: Arc<UnifiedGateway>,
}

struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, text: String) -> bool {
        self.sink.lock().await.send(Message::Text(text.into())).await.is_ok()
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }
}

fn normalize_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// The combined local/tunnel/VPN WebSocket endpoint. Trust is decided from
/// headers and the observed peer, not from which listener the request
/// arrived on.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let header_map = normalize_headers(&headers);
    let user_agent = header_map.get("user-agent").cloned();
    ws.on_upgrade(move |socket| handle_socket(socket, addr, header_map, user_agent, state))
        .into_response()
}

/// The loopback-only local endpoint. Rejects any request whose Host header
/// resolves to a non-loopback address before the WS handshake completes.
pub async fn local_ws_handler(
    ws: WebSocketUpgrade,
    connect_info: ConnectInfo<SocketAddr>,
    state: State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Some(host) = headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok()) {
        let host_only = host.split(':').next().unwrap_or(host);
        let is_loopback = host_only == "localhost" || TrustClassifier::is_loopback(host_only);
        if !is_loopback {
            return (StatusCode::FORBIDDEN, "local endpoint is loopback-only").into_response();
        }
    }

    ws_handler(ws, connect_info, state, headers).await
}

async fn handle_socket(
    socket: WebSocket,
    addr: SocketAddr,
    headers: HashMap<String, String>,
    user_agent: Option<String>,
    state: AppState,
) {
    let (sink, mut stream) = socket.split();
    let transport = Arc::new(WsTransport { sink: Mutex::new(sink) });

    let (client_id, class) = state
        .gateway
        .accept(&addr.ip().to_string(), &headers, user_agent, false, transport)
        .await;
    tracing::info!(%client_id, ?class, "client connected");

    while let Some(message) = stream.next().await {
        let Ok(message) = message else { break };
        let text = match message {
            Message::Text(text) => text.to_string(),
            // Best-effort UTF-8 decode; never crash the loop on bad bytes.
            Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).unwrap_or_default(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match state.gateway.ingest(&client_id, &text).await {
            IngestOutcome::Forwarded => {}
            IngestOutcome::RateLimited(wire) | IngestOutcome::InvalidJson(wire) => {
                state.gateway.send_error(&client_id, &wire).await;
            }
        }
    }

    state.gateway.disconnect(&client_id).await;
    tracing::info!(%client_id, "client disconnected");
}

/// Liveness probe for load balancers / orchestrators.
pub async fn health_handler() -> &'static str {
    "ok"
}
