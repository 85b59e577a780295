//! Axum router for the agent.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::http;
use crate::state::AppState;
use crate::ws;

/// All routes:
/// - `GET /`, `POST /` login
/// - `GET /logs` live log page
/// - `GET /logout`
/// - `GET /ws` event stream
/// - `GET /healthz`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::login_page).post(http::login_submit))
        .route("/logs", get(http::logs_page))
        .route("/logout", get(http::logout))
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(http::healthz))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    info!(
        %method,
        path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}
