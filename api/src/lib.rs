pub mod error;
pub mod rest;
pub mod sse;
pub mod state;

pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;

/// Bind the adapter and serve until the process exits.
pub async fn serve(app: Router, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
