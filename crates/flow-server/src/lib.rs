//! Flow server library logic.
//!
//! Wires the event store, the subscription registry and the broadcast
//! dispatcher behind an axum router. The registry is created with the
//! [`AppState`] and lives as long as the server.

pub mod api;
pub mod api_events;
pub mod api_orgs;
pub mod api_watch;
pub mod api_ws;
pub mod config;
pub mod liveness;
pub mod middleware;
pub mod registry;
pub mod server;

pub use server::{run, serve, ServerError};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::{Config, WatchConfig};
use flow_db::DbPool;
use liveness::LivenessSettings;
use registry::{Dispatcher, SubscriptionRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Broadcast dispatcher; owns the subscription registry.
    pub dispatcher: Dispatcher,
    /// Bearer token of the administrator principal, if configured.
    pub admin_token: Option<String>,
    pub liveness: LivenessSettings,
    pub watch: WatchConfig,
}

impl AppState {
    /// Builds state from loaded configuration with a fresh, empty registry.
    pub fn new(pool: DbPool, config: &Config) -> Self {
        Self {
            pool,
            dispatcher: Dispatcher::new(SubscriptionRegistry::new()),
            admin_token: config.auth.admin_token.clone(),
            liveness: LivenessSettings::from(&config.liveness),
            watch: config.watch,
        }
    }
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/orgs", post(api_orgs::create_org_handler))
        .route(
            "/events",
            post(api_events::submit_event_handler).get(api_events::list_events_handler),
        )
        .route("/events/watch", get(api_watch::watch_handler))
        .route("/events/{id}", get(api_events::get_event_handler))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api_ws::ws_handler))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
