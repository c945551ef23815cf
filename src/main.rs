//! Serves a datasource federation over HTTP.
//!
//! The configuration file is taken from the first argument, defaulting to
//! `tributary.toml`; log output is controlled through `RUST_LOG`.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tributary::config::{AppConfig, DEFAULT_CONFIG_PATH};
use tributary::interface::Federation;
use tributary::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match AppConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!(path, error = %e, "cannot read configuration");
            std::process::exit(1);
        }
    };

    let federation = tokio::task::spawn_blocking(move || {
        let federation = Federation::from_config(&config);
        (federation, config.server.bind)
    })
    .await;
    let (federation, bind) = match federation {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "building the federation failed");
            std::process::exit(1);
        }
    };
    for failure in federation.datasources().failures() {
        warn!(%failure, "datasource skipped");
    }

    let app = server::router(Arc::new(federation));
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind, error = %e, "cannot bind");
            std::process::exit(1);
        }
    };
    info!(bind, "listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server stopped");
    }
}
