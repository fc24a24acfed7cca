//! Periodic liveness probe of the Tunnel Supervisor, with restart-on-death.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::tunnel::TunnelSupervisor;
use crate::model::ConnectionClass;

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Liveness per class, read by callers that want to surface gateway status.
pub type HealthState = Arc<RwLock<HashMap<ConnectionClass, bool>>>;

/// Optional out-of-band CLI command used to probe the VPN daemon directly
/// (e.g. `tailscale status`), independent of whether the managed process
/// object itself looks alive.
#[derive(Debug, Clone)]
pub struct VpnStatusProbe {
    /// Argv for the status command; a non-zero exit flips VPN health false.
    pub argv: Vec<String>,
}

/// Runs the cooperative health-check loop described in the Health Monitor
/// component: every five seconds, restart any class whose tunnel died while
/// still desired, and separately track the VPN daemon's own status command.
pub struct HealthMonitor {
    supervisor: Arc<TunnelSupervisor>,
    desired: HashSet<ConnectionClass>,
    state: HealthState,
    vpn_probe: Option<VpnStatusProbe>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    /// Build a monitor over `supervisor`. `desired` is the persistent
    /// operator intent (e.g. `--start-cloudflare`/`--start-tailscale`), not
    /// derived from whatever happens to be in the supervisor's process map
    /// — a tunnel that fails its initial `start()` or a restart is still
    /// desired, and must keep being retried rather than being silently
    /// abandoned. LOCAL always reports healthy once the accept loop is
    /// running, so the caller should mark it `true` in `state` up front.
    pub fn new(supervisor: Arc<TunnelSupervisor>, desired: HashSet<ConnectionClass>, vpn_probe: Option<VpnStatusProbe>) -> Self {
        Self {
            supervisor,
            desired,
            state: Arc::new(RwLock::new(HashMap::new())),
            vpn_probe,
            cancel: CancellationToken::new(),
        }
    }

    /// Shared health-state handle, cheap to clone.
    pub fn state(&self) -> HealthState {
        self.state.clone()
    }

    /// Cancel the running loop; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the monitor loop until cancelled. Intended to be `tokio::spawn`ed;
    /// never blocks the accept loop and never propagates a panic-worthy
    /// error out of a single tick — failures are recorded and logged.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(PROBE_INTERVAL) => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        // VPN is excluded here: the daemon manages its own reconnection, and
        // is tracked purely through the out-of-band status probe below.
        for class in ConnectionClass::ALL.into_iter().filter(|c| *c != ConnectionClass::Vpn) {
            if !self.desired.contains(&class) {
                continue;
            }
            let alive = self.supervisor.alive(class).await;
            self.state.write().await.insert(class, alive);
            if !alive {
                tracing::warn!(?class, "tunnel process died, restarting");
                if !self.supervisor.restart(class).await {
                    tracing::error!(?class, "tunnel restart failed");
                }
            }
        }

        if let Some(probe) = &self.vpn_probe {
            let healthy = Self::run_probe(&probe.argv).await;
            self.state.write().await.insert(ConnectionClass::Vpn, healthy);
        }
    }

    async fn run_probe(argv: &[String]) -> bool {
        let Some((bin, args)) = argv.split_first() else {
            return false;
        };
        Command::new(bin)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
