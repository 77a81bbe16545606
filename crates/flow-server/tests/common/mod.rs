//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use flow_server::config::Config;
use flow_server::liveness::LivenessSettings;
use flow_server::{app, AppState};
use flow_types::OrgId;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A migrated file-backed database plus application state.
///
/// The directory guard keeps the database file alive for the test.
pub struct TestServer {
    pub state: AppState,
    _dir: TempDir,
}

pub fn test_server() -> TestServer {
    test_server_with(|_| {})
}

pub fn test_server_with(tweak: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flow.db");
    let (pool, _) = flow_db::open_database(
        path.to_str().expect("utf-8 path"),
        flow_db::DbRuntimeSettings::default(),
    )
    .expect("database");

    let mut config = Config::default();
    config.auth.admin_token = Some(ADMIN_TOKEN.to_string());
    tweak(&mut config);

    TestServer {
        state: AppState::new(pool, &config),
        _dir: dir,
    }
}

impl TestServer {
    pub fn router(&self) -> Router {
        app(self.state.clone())
    }

    pub fn with_liveness(mut self, liveness: LivenessSettings) -> Self {
        self.state.liveness = liveness;
        self
    }

    /// Creates an organization directly in the store, returning its id and token.
    pub fn create_org(&self, vanity: &[u8]) -> (OrgId, String) {
        let conn = self.state.pool.get().expect("conn");
        let issued = flow_store::create_organization(&conn, "admin", vanity).expect("create org");
        (issued.organization.org_id, issued.token)
    }

    /// Serves the router on an ephemeral port and returns its address.
    pub async fn spawn(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let state = self.state.clone();
        tokio::spawn(async move {
            flow_server::serve(listener, state, std::future::pending())
                .await
                .expect("serve");
        });
        addr
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.expect("oneshot")
    }

    pub async fn get(&self, uri: &str, token: &str) -> (u16, Value) {
        let request = Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (u16, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(self.send(request).await).await
    }
}

pub async fn read_json(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Short timers for liveness tests.
pub fn fast_liveness(heartbeat_ms: u64, idle_ms: u64, probe_ms: u64) -> LivenessSettings {
    LivenessSettings {
        heartbeat_interval: Duration::from_millis(heartbeat_ms),
        idle_timeout: Duration::from_millis(idle_ms),
        probe_timeout: Duration::from_millis(probe_ms),
        outbound_buffer: 16,
    }
}
