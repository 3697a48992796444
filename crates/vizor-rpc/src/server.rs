//! HTTP server implementation using Axum.

use crate::handler::{handle_invocations, handle_ping};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use vizor_core::{Configuration, Model};

/// Application state shared across handlers.
pub struct AppState {
    /// Inference facade (owns the backend registry)
    pub model: Model,
    /// Configuration used by health checks
    pub ping_config: Configuration,
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(handle_ping))
        .route("/invocations", post(handle_invocations))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(model: Model, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState {
        model,
        ping_config: Configuration::default(),
    });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
