//! Supra API Server
//!
//! REST surface over the catalog store and the conversational search
//! orchestrator.
//!
//! # Endpoints
//!
//! - `POST/GET /restaurants`, `GET/PUT/DELETE /restaurants/{id}`
//! - `GET /restaurants/search/name|price-range|location`
//! - `POST /restaurants/search-ai`: conversational search (JSON or
//!   multipart with an optional image upload)
//! - `POST /restaurants/search-ai/stream`: raw fragment streaming
//! - `POST/GET /dishes`, `GET/PUT/DELETE /dishes/{id}`, dish searches
//! - `POST/GET /users`, `GET/PUT/DELETE /users/{id}`
//! - `POST/GET /preferences`, `GET/PUT/DELETE /preferences/{id}`,
//!   `GET|DELETE /preferences/user/{userId}`
//! - `GET /api/status`: server status

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use supra_engine::db::Database;
use supra_engine::search::SearchEngine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod dishes;
pub mod error;
pub mod preferences;
pub mod restaurants;
pub mod users;

pub use error::ApiError;

/// Shared state across handlers
#[derive(Clone)]
pub struct ServerState {
    pub db: Arc<Database>,
    pub engine: Arc<SearchEngine>,
    pub default_limit: usize,
}

impl ServerState {
    pub fn new(db: Arc<Database>, engine: Arc<SearchEngine>, default_limit: usize) -> Self {
        Self {
            db,
            engine,
            default_limit,
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/restaurants", post(restaurants::create).get(restaurants::list))
        .route("/restaurants/search-ai", post(restaurants::search_ai))
        .route(
            "/restaurants/search-ai/stream",
            post(restaurants::search_ai_stream),
        )
        .route("/restaurants/search/name", get(restaurants::find_by_name))
        .route(
            "/restaurants/search/price-range",
            get(restaurants::find_by_price_range),
        )
        .route(
            "/restaurants/search/location",
            get(restaurants::find_by_location),
        )
        .route(
            "/restaurants/:id",
            get(restaurants::find_by_id)
                .put(restaurants::update)
                .delete(restaurants::remove),
        )
        .route("/dishes", post(dishes::create).get(dishes::list))
        .route("/dishes/search/name", get(dishes::find_by_name))
        .route("/dishes/search/price", get(dishes::find_by_price_range))
        .route("/dishes/search/tags", get(dishes::find_by_tags))
        .route("/dishes/search/allergens", get(dishes::find_by_allergens))
        .route(
            "/dishes/restaurant/:restaurant_id",
            get(dishes::find_by_restaurant),
        )
        .route(
            "/dishes/:id",
            get(dishes::find_by_id).put(dishes::update).delete(dishes::remove),
        )
        .route("/users", post(users::create).get(users::list))
        .route(
            "/users/:id",
            get(users::find_by_id).put(users::update).delete(users::remove),
        )
        .route("/preferences", post(preferences::create).get(preferences::list))
        .route(
            "/preferences/user/:user_id",
            get(preferences::find_by_user).delete(preferences::remove_by_user),
        )
        .route(
            "/preferences/:id",
            get(preferences::find_by_id)
                .put(preferences::update)
                .delete(preferences::remove),
        )
        .route("/api/status", get(status))
        // Image uploads go up to 20 MiB; leave headroom for the other fields.
        .layer(DefaultBodyLimit::max(21 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until interrupted, then shut down gracefully.
pub async fn serve(state: ServerState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("API server shutting down gracefully");
        })
        .await
        .context("API server error")?;

    Ok(())
}

/// Server status endpoint
async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
