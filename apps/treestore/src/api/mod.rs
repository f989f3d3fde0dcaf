//! # TreeStore HTTP API Module
//!
//! This module implements the HTTP REST API server using axum. Handlers only
//! map requests onto `Session` operations; every consistency rule lives in
//! the core.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /status`
//! - `GET /categories?path=a/b`, `POST /categories`
//! - `GET|PATCH|DELETE /categories/{id}` (`?recursive=true` on delete)
//! - `POST /categories/{id}/copy`
//! - `POST /categories/{id}/properties`, `DELETE /categories/{id}/properties/{pid}`
//! - `GET|POST /tags`, `PATCH|DELETE /tags/{id}` (`?force=true` on delete)
//! - `POST /tags/{id}/properties`, `DELETE /tags/{id}/properties/{pid}`
//! - `POST /entities`, `GET|PATCH|DELETE /entities/{id}`, `PUT /entities/{id}/values`
//! - `GET|POST /relationships`, `DELETE /relationships/{id}`,
//!   `PUT /relationships/{id}/values`
//!
//! Every body is the envelope `{success, error, data}`.

mod handlers;
mod middleware;
mod types;

pub use handlers::{ApiError, status_for};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AddPropertyRequest, ApiResponse, CategoryJson, CategoryListing, CopyCategoryRequest,
    CreateCategoryRequest, CreateEntityRequest, CreateRelationshipRequest, CreateTagRequest,
    DeleteResponse, EntityJson, HealthResponse, PropertyJson, RelationshipJson, SetValuesRequest,
    StatusResponse, TagJson, TagRefJson, UpdateCategoryRequest, UpdateEntityRequest,
    json_to_value, value_to_json,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use treestore_core::{Session, TreeStoreError};

/// Maximum request body size (2 MiB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the session.
///
/// Mutating handlers take the write lock, so recursive traversals never
/// overlap.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer from `cors_origins`.
///
/// - `None`: localhost only
/// - `["*"]`: every origin
/// - otherwise the listed origins; invalid entries are skipped
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([wildcard]) if wildcard == "*" => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => build_localhost_cors(),
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/categories",
            get(handlers::list_categories_handler).post(handlers::create_category_handler),
        )
        .route(
            "/categories/{id}",
            get(handlers::get_category_handler)
                .patch(handlers::update_category_handler)
                .delete(handlers::delete_category_handler),
        )
        .route("/categories/{id}/copy", post(handlers::copy_category_handler))
        .route(
            "/categories/{id}/properties",
            post(handlers::add_category_property_handler),
        )
        .route(
            "/categories/{id}/properties/{pid}",
            delete(handlers::remove_category_property_handler),
        )
        .route(
            "/tags",
            get(handlers::list_tags_handler).post(handlers::create_tag_handler),
        )
        .route(
            "/tags/{id}",
            patch(handlers::rename_tag_handler).delete(handlers::delete_tag_handler),
        )
        .route(
            "/tags/{id}/properties",
            post(handlers::add_tag_property_handler),
        )
        .route(
            "/tags/{id}/properties/{pid}",
            delete(handlers::remove_tag_property_handler),
        )
        .route("/entities", post(handlers::create_entity_handler))
        .route(
            "/entities/{id}",
            get(handlers::get_entity_handler)
                .patch(handlers::update_entity_handler)
                .delete(handlers::delete_entity_handler),
        )
        .route("/entities/{id}/values", put(handlers::set_values_handler))
        .route(
            "/relationships",
            get(handlers::list_relationships_handler).post(handlers::create_relationship_handler),
        )
        .route(
            "/relationships/{id}",
            delete(handlers::delete_relationship_handler),
        )
        .route(
            "/relationships/{id}/values",
            put(handlers::set_relationship_values_handler),
        );

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(config.cors_origins.as_deref()))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(session: Session, config: &ServerConfig) -> Result<(), TreeStoreError> {
    let router = create_router(AppState::new(session), config);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TreeStoreError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("TreeStore HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TreeStoreError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
