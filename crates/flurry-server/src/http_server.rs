//! HTTP server bootstrap for the broker.
//!
//! Builds the axum application, starts the broker's admission serialiser,
//! and serves until shutdown. CORS preflight gets the permissive treatment;
//! the `/client` handler additionally attaches its contractual
//! `Access-Control-Allow-Headers` on every response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use flurry_broker::BrokerContext;

use crate::error::ServerError;
use crate::handlers;

/// HTTP server for the flurry broker.
pub struct BrokerServer {
    ctx: Arc<BrokerContext>,
}

impl BrokerServer {
    /// Creates a new broker server.
    ///
    /// # Arguments
    /// * `ctx` - Arc-wrapped broker context shared with every handler
    ///
    /// # Returns
    /// A new server instance
    pub fn new(ctx: Arc<BrokerContext>) -> Self {
        Self { ctx }
    }

    /// Runs the HTTP server.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    ///
    /// # Returns
    /// - `Ok(())` - Server ran successfully
    /// - `Err(ServerError)` - Server failed to start or run
    ///
    /// # Behavior
    /// - Spawns the admission serialiser before accepting traffic, so the
    ///   first proxy poll already has a consumer
    /// - Binds to the specified address and logs it
    /// - Runs indefinitely until shutdown
    pub async fn run(self, addr: SocketAddr) -> Result<(), ServerError> {
        self.ctx.spawn();

        let app = router(self.ctx);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind to {addr}: {e}")))?;

        info!(
            "broker listening on {}",
            listener
                .local_addr()
                .map_err(|e| ServerError::Transport(format!("failed to get local addr: {e}")))?
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Transport(format!("server error: {e}")))?;

        Ok(())
    }
}

/// Builds the broker's route table over a shared context.
///
/// # Arguments
/// * `ctx` - Broker context handed to every handler as axum state
///
/// # Returns
/// The assembled axum `Router`
pub fn router(ctx: Arc<BrokerContext>) -> Router {
    Router::new()
        .route("/client", post(handlers::client_handler))
        .route("/proxy", post(handlers::proxy_handler))
        .route("/answer", post(handlers::answer_handler))
        .route("/debug", get(handlers::debug_handler))
        .route("/robots.txt", get(handlers::robots_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flurry_broker::BrokerConfig;

    #[tokio::test]
    async fn test_router_builds_with_fresh_context() {
        let ctx = BrokerContext::new(BrokerConfig::default());
        let _app = router(ctx.clone());
        assert_eq!(ctx.available(), 0);
    }
}
