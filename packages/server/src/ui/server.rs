//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::LobbyHandle;

use super::{
    handler::{debug_lobby, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Lobby WebSocket server
///
/// # Example
///
/// ```ignore
/// let (lobby, _tasks) = spawn_lobby(config, auth, Arc::new(SystemClock));
/// Server::new(lobby).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    lobby: LobbyHandle,
}

impl Server {
    pub fn new(lobby: LobbyHandle) -> Self {
        Self { lobby }
    }

    /// Build the router with every endpoint mounted
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            lobby: self.lobby.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/debug/lobby", get(debug_lobby))
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the server until Ctrl+C or SIGTERM
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Lobby server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then stop the lobby
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.lobby.shutdown();
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
