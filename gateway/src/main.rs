//! # Messaging Gateway
//!
//! ## Core Responsibilities:
//! - Terminate local, tunneled, VPN, and direct WebSocket transports behind
//!   one accept loop, classifying and rate-limiting every connection.
//! - Supervise the external tunnel processes (`cloudflared`, `tailscale`)
//!   that front the non-local transports, restarting them on death.
//! - Coordinate role-bounded sub-agents with workspace-confined filesystem
//!   tools, gated behind pre-flight LLM validation.

#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

mod config;
mod frame_handler;
mod logging;
mod tls;
mod ws;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use gateway_core::agents::{AllowAllPolicy, InMemoryLessonStore, NullToolRouter, SubAgentCoordinator, WorkspaceFs};
use gateway_core::core::{DesiredTunnels, HealthMonitor, RateLimiter, TunnelSupervisor, UnifiedGateway, VpnStatusProbe};
use gateway_core::core::codec::FrameCodec;
use gateway_core::platform::PlatformRegistry;
use tower_http::cors::CorsLayer;

use crate::config::Cli;
use crate::frame_handler::Orchestrator;
use crate::ws::AppState;

/// Stand-in for a real provider binding (Non-goal: no concrete LLM
/// integration ships with this crate). Denies every pre-flight check so an
/// unconfigured deployment fails closed instead of silently running
/// unvalidated sub-agent plans.
struct UnconfiguredLlm;

#[async_trait::async_trait]
impl gateway_core::agents::LlmClient for UnconfiguredLlm {
    async fn complete(&self, _messages: &[gateway_core::agents::LlmMessage]) -> String {
        "DENY: no LLM provider configured".to_string()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Phase 0: install the crypto provider TLS needs before anything else
    // touches rustls.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("crypto provider installed exactly once");

    // Phase 1: configuration.
    let cli = Cli::load();

    // Phase 2: logging.
    logging::init();
    tracing::info!(host = %cli.host, port = cli.port, "starting gateway");

    // Phase 3: workspace sanity check, since this is the one place the
    // spec allows raising to the outer program.
    if !cli.workspace.is_dir() {
        std::fs::create_dir_all(&cli.workspace)?;
    }

    // Phase 4: core infra — rate limiter, tunnel supervisor, health monitor,
    // optional frame codec, and the gateway that ties them together.
    let rate_limiter = Arc::new(RateLimiter::new(cli.rate_limits()));
    let tunnels = Arc::new(TunnelSupervisor::new(cli.tunnel_specs()));
    let desired: HashSet<_> = cli.desired_classes().into_iter().collect();
    let vpn_probe = cli.start_tailscale.then(|| VpnStatusProbe {
        argv: vec!["tailscale".to_string(), "status".to_string()],
    });
    let health = Arc::new(HealthMonitor::new(tunnels.clone(), desired, vpn_probe));
    let codec = cli
        .encryption_password
        .as_deref()
        .map(|password| FrameCodec::new(password, &cli.encryption_salt));

    let gateway = Arc::new(UnifiedGateway::new(
        rate_limiter,
        tunnels,
        health,
        DesiredTunnels(cli.desired_classes()),
        codec,
    ));
    gateway.start().await;

    // Platform adapters and the sub-agent coordinator are wired behind the
    // same orchestrator callback the read loop invokes; no concrete
    // platform factories or LLM provider ship with this crate (Non-goals),
    // so both collaborators start unconfigured and fail closed.
    let platforms = PlatformRegistry::new();
    let agents = Arc::new(SubAgentCoordinator::new(
        Arc::new(UnconfiguredLlm),
        Arc::new(InMemoryLessonStore::new()),
        Arc::new(AllowAllPolicy),
        WorkspaceFs::new(cli.workspace.clone()),
        None,
        Arc::new(NullToolRouter),
        None,
    ));
    gateway
        .register_handler(Arc::new(Orchestrator::new(gateway.clone(), platforms.clone(), agents)))
        .await;

    let state = AppState { gateway: gateway.clone() };

    // Phase 5: router. The local endpoint enforces loopback-only Host
    // headers; the combined endpoint serves tunnel-fronted and VPN traffic,
    // distinguished purely by header/peer classification.
    let app = Router::new()
        .route("/health", get(ws::health_handler))
        .route("/local", get(ws::local_ws_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let handle = axum_server::Handle::new();

    // Phase 6: the optional direct HTTPS endpoint on port + 1.
    let direct_task = match (&cli.tls_cert, &cli.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            let tls_config = tls::load_server_config(cert_path, key_path)?;
            let direct_addr: SocketAddr = format!("{}:{}", cli.host, cli.direct_port()).parse()?;
            let direct_app = app.clone();
            let direct_handle = handle.clone();
            Some(tokio::spawn(async move {
                let rustls_config = RustlsConfig::from_config(tls_config);
                if let Err(err) = axum_server::bind_rustls(direct_addr, rustls_config)
                    .handle(direct_handle)
                    .serve(direct_app.into_make_service_with_connect_info::<SocketAddr>())
                    .await
                {
                    tracing::error!(%err, "direct HTTPS endpoint exited");
                }
            }))
        }
        _ => {
            tracing::info!("TLS material not configured; direct HTTPS endpoint disabled");
            None
        }
    };

    // Phase 7: bind and serve the plain-WS listener, racing the shutdown
    // signal.
    tracing::info!(%addr, "accept loop listening");
    let serve_handle = handle.clone();
    let serve_task = tokio::spawn(async move {
        if let Err(err) = axum_server::bind(addr)
            .handle(serve_handle)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
        {
            tracing::error!(%err, "accept loop exited");
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping gateway");

    gateway.stop().await;
    platforms.shutdown_all().await;
    handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
    let _ = serve_task.await;
    if let Some(direct_task) = direct_task {
        let _ = direct_task.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
