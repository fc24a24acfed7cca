//! Starts and supervises external tunnel processes (e.g. `cloudflared`,
//! `tailscale up`), one per connection class that wants one.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::model::ConnectionClass;

/// Argv to probe a tunnel binary's version and the argv to launch the
/// long-running process, per class. Exact binaries/flags are deployment
/// configuration, not part of this crate.
#[derive(Debug, Clone)]
pub struct TunnelSpec {
    /// Command used to probe that the binary is present and runnable.
    pub version_probe: Vec<String>,
    /// Command used to launch the long-running tunnel process.
    pub launch: Vec<String>,
    /// How long to wait after spawn before declaring the process "up".
    pub settle: Duration,
}

struct ManagedProcess {
    child: Child,
    last_started_at: i64,
}

/// Owns zero or more external tunnel subprocesses, one per class.
pub struct TunnelSupervisor {
    specs: HashMap<ConnectionClass, TunnelSpec>,
    processes: Mutex<HashMap<ConnectionClass, ManagedProcess>>,
}

impl TunnelSupervisor {
    /// Build a supervisor from per-class launch specs. Classes with no spec
    /// are never started.
    pub fn new(specs: HashMap<ConnectionClass, TunnelSpec>) -> Self {
        Self {
            specs,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Start the tunnel for `class`. Returns `false` if there's no spec for
    /// the class, the version probe fails, or the spawned process has
    /// already exited after the settling period.
    pub async fn start(&self, class: ConnectionClass) -> bool {
        let Some(spec) = self.specs.get(&class) else {
            return false;
        };

        if !Self::probe_ok(&spec.version_probe).await {
            tracing::warn!(?class, "tunnel version probe failed");
            return false;
        }

        let Some(mut child) = Self::spawn(&spec.launch) else {
            tracing::warn!(?class, "failed to spawn tunnel process");
            return false;
        };

        tokio::time::sleep(spec.settle).await;

        let still_running = matches!(child.try_wait(), Ok(None));
        if !still_running {
            return false;
        }

        let mut processes = self.processes.lock().await;
        processes.insert(
            class,
            ManagedProcess {
                child,
                last_started_at: chrono::Utc::now().timestamp(),
            },
        );
        true
    }

    /// Whether the tunnel for `class` is currently running.
    pub async fn alive(&self, class: ConnectionClass) -> bool {
        let mut processes = self.processes.lock().await;
        match processes.get_mut(&class) {
            Some(managed) => matches!(managed.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Best-effort terminate of a single class's process. Idempotent.
    pub async fn stop(&self, class: ConnectionClass) {
        let mut processes = self.processes.lock().await;
        if let Some(mut managed) = processes.remove(&class) {
            let _ = managed.child.start_kill();
        }
    }

    /// Best-effort terminate of every managed process.
    pub async fn stop_all(&self) {
        let classes: Vec<ConnectionClass> = self.processes.lock().await.keys().copied().collect();
        for class in classes {
            self.stop(class).await;
        }
    }

    /// Stop then start the tunnel for `class`.
    pub async fn restart(&self, class: ConnectionClass) -> bool {
        self.stop(class).await;
        self.start(class).await
    }

    async fn probe_ok(argv: &[String]) -> bool {
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

    fn spawn(argv: &[String]) -> Option<Child> {
        let (bin, args) = argv.split_first()?;
        Command::new(bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .ok()
    }
}

/// Shared handle type used by callers that need to pass a supervisor around
/// without owning it.
pub type SharedTunnelSupervisor = Arc<TunnelSupervisor>;
