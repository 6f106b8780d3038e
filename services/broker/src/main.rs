// broker: Accepts ghost control connections and brokers them to operators.

use broker::config;
use broker::listener::AgentListener;
use broker::registry::Registry;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "overlord broker starting");

    let config_path = std::env::var("OVERLORD_CONFIG")
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_owned());
    let cfg = match config::load_config_from(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        bind = %cfg.bind,
        ssh_port_start = cfg.ssh_port_start,
        ssh_port_end = cfg.ssh_port_end,
        "config loaded"
    );

    let registry = Arc::new(Registry::new(cfg.ssh_port_start..=cfg.ssh_port_end));
    let listener = match AgentListener::bind(&cfg.bind, registry, cfg.tuning.clone()).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("FATAL: failed to bind {}: {}", cfg.bind, e);
            std::process::exit(1);
        }
    };
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "listening for ghosts");
    }
    listener.run().await;
}
