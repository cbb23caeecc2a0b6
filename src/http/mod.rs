//! JSON HTTP API over [`CalculatorService`].
//!
//! ## Endpoints
//!
//! - `POST /register` - Create an account
//! - `POST /login` - Exchange credentials for a bearer token
//! - `POST /api/v1/operation` - Run a priced operation
//! - `GET /api/v1/records` - Page through the caller's records
//! - `DELETE /api/v1/records/{id}` - Hide one of the caller's records
//! - `GET /api/v1/account` - Show the caller's balance
//! - `GET /health` - Liveness probe

mod auth;
mod error;
mod handlers;

pub use auth::AuthUser;
pub use error::{ApiError, ErrorResponse};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::CalculatorService;

/// Shared application state containing the service.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CalculatorService>,
}

impl AppState {
    pub fn new(service: Arc<CalculatorService>) -> Self {
        Self { service }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::USER_AGENT,
            header::CACHE_CONTROL,
            header::PRAGMA,
        ])
        .expose_headers([header::CONTENT_LENGTH])
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/operation", post(handlers::perform_operation))
        .route("/records", get(handlers::list_records))
        .route("/records/{id}", delete(handlers::delete_record))
        .route("/account", get(handlers::get_account))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .nest("/api/v1", protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Serve the API on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, service: Arc<CalculatorService>) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router(AppState::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
