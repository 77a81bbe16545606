//! Process-level wiring: open the store, bind, serve, stop on a signal.

use crate::config::Config;
use crate::{app, AppState};
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Database(#[from] flow_db::PoolError),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server stopped unexpectedly: {0}")]
    Serve(std::io::Error),
}

/// Opens and migrates the database named by `config`, binds the configured
/// address and serves until `shutdown` resolves.
///
/// # Errors
///
/// Fails if the database cannot be opened or migrated, the address cannot
/// be bound, or the listener itself fails.
pub async fn run(
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let (pool, applied) =
        flow_db::open_database(&config.database.path, config.database.runtime_settings())?;
    tracing::info!(
        path = %config.database.path,
        migrations_applied = applied,
        "event database ready"
    );

    if config.auth.admin_token.is_none() {
        tracing::warn!("no auth.admin_token configured; organizations cannot be created");
    }

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    serve(listener, AppState::new(pool, &config), shutdown).await
}

/// Serves the router on an already bound listener.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if accepting connections fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "flow server listening");
    }
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(ServerError::Serve)
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}

/// Resolves on SIGINT or SIGTERM. A signal that cannot be listened for is
/// logged and never fires.
pub async fn shutdown_signal() {
    tokio::select! {
        () = interrupted() => tracing::info!("SIGINT received, shutting down"),
        () = terminated() => tracing::info!("SIGTERM received, shutting down"),
    }
}
