//! Binds the listener and serves the router.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::{AgentError, Result};
use crate::router::build_router;
use crate::state::AppState;

/// Bind `0.0.0.0:port`. Split from [`serve`] so callers (and tests) can
/// learn the bound address first.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| AgentError::Bind { addr, source })
}

/// Serve until the process exits. Peer addresses reach the handlers through
/// `ConnectInfo`.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .await
        .map_err(AgentError::Serve)
}
