//! HTTP API for the CuraCore triage service.
//!
//! # Routes
//!
//! - `GET  /health`
//! - `POST /api/v1/chat`: one triage message for a session
//! - `POST /api/v1/sessions/{id}/reset`
//! - `GET  /api/v1/sessions/{id}/summary`: clinician-facing summary
//! - `POST /api/v1/ask`: question answered from the reference corpus
//! - `GET  /api/v1/search?q=&k=`: ranked reference chunks

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use routes::{ChatRequest, ChatResponse};
pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", Self::api_routes())
            .layer(self.cors_layer())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    fn api_routes() -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route("/chat", post(routes::chat_handler))
            .route("/sessions/{id}/reset", post(routes::reset_handler))
            .route("/sessions/{id}/summary", get(routes::summary_handler))
            .route("/ask", post(routes::ask_handler))
            .route("/search", get(routes::search_handler))
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        let origins: Vec<HeaderValue> = self
            .state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        if origins.is_empty() {
            layer.allow_origin(Any)
        } else {
            layer.allow_origin(AllowOrigin::list(origins))
        }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let router = self.router();
        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}
