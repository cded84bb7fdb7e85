//! Mock order API and Pushgateway served by axum on ephemeral ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

use orderwatch_core::Config;

pub const API_KEY: &str = "test-key";

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Order API ───────────────────────────────────────────────────────

pub struct MockOms {
    pub url: String,
    state: Arc<OmsState>,
}

struct OmsState {
    status: StatusCode,
    body: Value,
    queries: Mutex<Vec<HashMap<String, String>>>,
}

impl MockOms {
    /// Serve `body` from the recent-changes endpoint for requests carrying [`API_KEY`].
    pub async fn start(body: Value) -> Self {
        Self::start_with_status(StatusCode::OK, body).await
    }

    pub async fn start_with_status(status: StatusCode, body: Value) -> Self {
        let state = Arc::new(OmsState {
            status,
            body,
            queries: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/v1/monitor/recent", get(recent))
            .with_state(state.clone());
        Self {
            url: serve(app).await,
            state,
        }
    }

    /// Query strings of every authorized request, in arrival order.
    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.state.queries.lock().unwrap().clone()
    }
}

async fn recent(
    State(state): State<Arc<OmsState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if key != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    state.queries.lock().unwrap().push(query);
    (state.status, Json(state.body.clone())).into_response()
}

// ── Pushgateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Push {
    pub job: String,
    pub content_type: Option<String>,
    pub body: String,
}

pub struct MockPushgateway {
    pub url: String,
    pushes: Arc<Mutex<Vec<Push>>>,
}

impl MockPushgateway {
    pub async fn start() -> Self {
        let pushes = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/metrics/job/{job}", post(push))
            .with_state(pushes.clone());
        Self {
            url: serve(app).await,
            pushes,
        }
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }
}

async fn push(
    State(pushes): State<Arc<Mutex<Vec<Push>>>>,
    axum::extract::Path(job): axum::extract::Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    pushes.lock().unwrap().push(Push { job, content_type, body });
    StatusCode::OK
}

// ── Config ──────────────────────────────────────────────────────────

/// Config pointing at the mocks. The profile name only isolates env lookups.
pub fn config(profile: &str, oms_url: &str, pushgateway_url: &str) -> Config {
    let mut config = Config::for_profile(profile);
    config.oms.base_url = oms_url.to_string();
    config.oms.recent_path = "/api/v1/monitor/recent".to_string();
    config.oms.api_key = Some(API_KEY.to_string());
    config.oms.timeout_secs = 5;
    config.oms.window_minutes = 5;
    config.oms.row_limit = 1000;
    config.metrics.pushgateway_url = pushgateway_url.to_string();
    config.metrics.job = "o2o_oms_monitoring".to_string();
    config.metrics.prefix = "o2o_orders".to_string();
    config.metrics.timeout_secs = 2;
    config.schedule.retries = 1;
    config.schedule.retry_delay_secs = 0;
    config
}
