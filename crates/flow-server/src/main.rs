//! `flow-server [CONFIG]`
//!
//! The configuration file is the first argument, else `FLOW_CONFIG_PATH`,
//! else `flow.toml`. A missing file means defaults plus `FLOW_*` overrides.

use flow_server::config::{self, LoggingConfig};
use flow_server::server;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn config_path() -> String {
    let non_blank = |p: &String| !p.trim().is_empty();
    std::env::args()
        .nth(1)
        .filter(non_blank)
        .or_else(|| std::env::var("FLOW_CONFIG_PATH").ok().filter(non_blank))
        .unwrap_or_else(|| "flow.toml".to_string())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let path = config_path();
    let config = match config::load_config(Some(&path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flow-server: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);
    tracing::info!(config = %path, version = env!("CARGO_PKG_VERSION"), "starting flow server");

    match server::run(config, server::shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("flow server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
