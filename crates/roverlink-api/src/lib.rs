pub mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub use handlers::ApiState;

fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/clients", get(handlers::handle_clients))
        .route("/telemetry", post(handlers::handle_telemetry))
        .route("/bus/outbox", get(handlers::handle_outbox))
        .route("/paths/{stream}", post(handlers::handle_retarget_path))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state)
}

/// Local JSON API on loopback.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut shutdown = state.shutdown_tx.subscribe();
    let app = Router::new().nest("/api", api_router(state)).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

/// Client-facing HTTP: the WebSocket endpoint, plus the web root when one
/// is configured.
pub async fn serve_web(state: ApiState, port: u16, root: Option<PathBuf>) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let mut app = Router::new()
        .route("/ws", get(handlers::handle_ws))
        .with_state(state);
    if let Some(root) = root {
        tracing::info!(root = %root.display(), "serving web root");
        app = app.fallback_service(ServeDir::new(root));
    }

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "web listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await?;
    Ok(())
}
