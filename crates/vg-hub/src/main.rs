use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod output;
mod query;
mod server;
mod state;
mod tables;
mod triggers;

use auth::{AuthPolicies, GroupAuthorization, ServiceAuthorization};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "vg-hub", version = "0.3.0", about = "VIGILIA Status Hub")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:6557")]
    bind: String,

    /// Path to a JSON state file (omit for the built-in demo world)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Path to config file
    #[arg(long, default_value = "vg-hub.toml")]
    config: PathBuf,
}

// =============================================================================
// Config
// =============================================================================

#[derive(Deserialize, Default, Clone)]
struct Config {
    #[serde(default)]
    auth: AuthConfig,
    #[serde(default)]
    simulator: SimulatorConfig,
}

#[derive(Deserialize, Clone, Default)]
struct AuthConfig {
    #[serde(default)]
    service_authorization: ServiceAuthorization,
    #[serde(default)]
    group_authorization: GroupAuthorization,
}

#[derive(Deserialize, Clone)]
struct SimulatorConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_simulator_interval")]
    interval_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_simulator_interval(),
        }
    }
}

fn default_simulator_interval() -> u64 {
    2000
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vg_hub=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        let content = std::fs::read_to_string(&args.config).unwrap_or_default();
        toml::from_str(&content).unwrap_or_default()
    } else {
        Config::default()
    };

    let world = match &args.state {
        Some(path) => match state::load_world(path) {
            Ok(world) => world,
            Err(e) => {
                tracing::error!("Failed to load state file {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => state::demo_world(),
    };
    tracing::info!(
        hosts = world.hosts.len(),
        services = world.services.len(),
        service_groups = world.service_groups.len(),
        "world loaded"
    );

    let policies = AuthPolicies {
        service: config.auth.service_authorization,
        group: config.auth.group_authorization,
    };
    let monitor = Arc::new(state::Monitor::new(world, policies));

    if config.simulator.enabled {
        state::spawn_simulator(
            monitor.clone(),
            Duration::from_millis(config.simulator.interval_ms),
        );
        tracing::info!(interval_ms = config.simulator.interval_ms, "simulator running");
    }

    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  🛰  VIGILIA v0.3.0");
    tracing::info!("  Query protocol:  tcp://{}", args.bind);
    tracing::info!("  Tables:          hosts, services, servicegroups");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    server::serve(&args.bind, monitor)
        .await
        .expect("server failed");
}
