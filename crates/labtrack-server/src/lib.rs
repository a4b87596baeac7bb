//! Labtrack Server - record store service
//!
//! HTTP front for the canonical record store: generic CRUD over the four
//! collections on a single `/data` endpoint.

pub mod error;
pub mod http;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use tokio::sync::RwLock;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use labtrack_core::{RecordStore, ServerConfig, StoreError};

pub use error::ApiError;

/// Shared application state
pub struct AppState {
    pub store: RwLock<RecordStore>,
}

impl AppState {
    /// In-memory state
    pub fn new() -> Self {
        Self::with_store(RecordStore::in_memory())
    }

    pub fn with_store(store: RecordStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Create state from configuration
    ///
    /// Loads the data file on startup if one is configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self, StoreError> {
        let store = RecordStore::from_config(&config.storage)?;
        let counts = store.counts();
        tracing::info!(
            "Opened {} record store ({:?})",
            store.backend().name(),
            counts
        );
        Ok(Self::with_store(store))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/data",
            get(http::list_records)
                .post(http::create_record)
                .put(http::update_record)
                .delete(http::delete_record)
                .options(http::preflight)
                // Runs before any query parsing: PATCH /data?type=bad is 405
                .fallback(http::method_not_allowed),
        )
        .route("/status", get(http::get_status))
        .fallback(http::fallback)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Labtrack server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
