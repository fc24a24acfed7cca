//! Startup configuration: CLI flags (each doubling as an env var via
//! `clap`'s `env` feature), an optional `.env` file, and the hard-coded
//! default rate limits and health interval.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use gateway_core::core::tunnel::TunnelSpec;
use gateway_core::model::{ConnectionClass, RateLimits};

/// Gateway process configuration.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Multi-platform messaging gateway")]
pub struct Cli {
    /// Host the local/tunnel-fronted WS listener binds to.
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the local/tunnel-fronted WS listener binds to.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8765)]
    pub port: u16,

    /// Directory all sub-agent filesystem operations are confined to.
    #[arg(long, env = "GATEWAY_WORKSPACE", default_value = "./workspace")]
    pub workspace: PathBuf,

    /// TLS certificate path for the direct HTTPS endpoint (port + 1). If
    /// unset, the direct endpoint is not started.
    #[arg(long, env = "GATEWAY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key path for the direct HTTPS endpoint.
    #[arg(long, env = "GATEWAY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Shared password for the frame codec. If unset, frames are sent
    /// unencrypted.
    #[arg(long, env = "GATEWAY_ENCRYPTION_PASSWORD")]
    pub encryption_password: Option<String>,

    /// Static salt paired with the encryption password.
    #[arg(long, env = "GATEWAY_ENCRYPTION_SALT", default_value = "megabot-static-salt")]
    pub encryption_salt: String,

    /// Start the Cloudflare tunnel at boot.
    #[arg(long, env = "GATEWAY_START_CLOUDFLARE")]
    pub start_cloudflare: bool,

    /// Start the Tailscale VPN tunnel at boot.
    #[arg(long, env = "GATEWAY_START_TAILSCALE")]
    pub start_tailscale: bool,
}

impl Cli {
    /// Parse CLI args, loading a `.env` file first if one is present.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Cli::parse()
    }

    /// The direct HTTPS endpoint's port, always `port + 1` per the wire spec.
    pub fn direct_port(&self) -> u16 {
        self.port + 1
    }

    /// Rate limits applied by the gateway; not currently configurable
    /// beyond the built-in defaults.
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits::default()
    }

    /// Tunnel launch specs for the classes the operator asked to start.
    /// Exact binaries/argv are deployment-local; these defaults assume
    /// `cloudflared` and `tailscale` are on `PATH`.
    pub fn tunnel_specs(&self) -> HashMap<ConnectionClass, TunnelSpec> {
        let mut specs = HashMap::new();
        specs.insert(
            ConnectionClass::Tunneled,
            TunnelSpec {
                version_probe: vec!["cloudflared".into(), "--version".into()],
                launch: vec![
                    "cloudflared".into(),
                    "tunnel".into(),
                    "--url".into(),
                    format!("http://localhost:{}", self.port),
                ],
                settle: std::time::Duration::from_secs(5),
            },
        );
        specs.insert(
            ConnectionClass::Vpn,
            TunnelSpec {
                version_probe: vec!["tailscale".into(), "--version".into()],
                launch: vec!["tailscale".into(), "up".into()],
                settle: std::time::Duration::from_secs(5),
            },
        );
        specs
    }

    /// Which classes should have their tunnel started at boot.
    pub fn desired_classes(&self) -> Vec<ConnectionClass> {
        let mut desired = Vec::new();
        if self.start_cloudflare {
            desired.push(ConnectionClass::Tunneled);
        }
        if self.start_tailscale {
            desired.push(ConnectionClass::Vpn);
        }
        desired
    }
}
