//! # Rombel HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store-wide counts
//! - `GET /integrity` - Occupancy and single-active audit
//! - `GET|POST /classes` - List (filterable) or create classes
//! - `GET|PATCH|DELETE /classes/{id}` - Show, update or delete a class
//! - `POST /classes/{id}/occupancy` - Administrative occupancy adjustment
//! - `GET /classes/{id}/roster` - Active students of a class
//! - `GET /classes/{id}/history` - Every record of a class
//! - `GET /classes/{id}/stats` - Per-year statistics
//! - `POST /enrollments` - Assign one student
//! - `POST /enrollments/bulk` - Assign a batch of students
//! - `GET|POST /transfers` - List or perform transfers
//! - `GET|POST /exits` - List or record exits
//! - `GET /students/{id}/history` - A student's timeline
//! - `GET /students/{id}/enrollment` - A student's current placement
//!
//! ## Configuration (Environment Variables)
//!
//! - `ROMBEL_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `rombel::api::*`)
pub use handlers::{
    adjust_occupancy_handler, assign_handler, bulk_assign_handler, class_history_handler,
    class_roster_handler, class_stats_handler, create_class_handler, delete_class_handler,
    exit_handler, get_class_handler, health_handler, integrity_handler, list_classes_handler,
    list_exits_handler, list_transfers_handler, status_handler, student_enrollment_handler,
    student_history_handler, transfer_handler, update_class_handler,
};
pub use types::{
    ActiveEnrollmentResponse, ApiError, BulkAssignRequest, ClassListQuery, ErrorResponse,
    ExitQuery, HealthResponse, OccupancyRequest, StatsQuery, StatusResponse, status_for,
};

use crate::storage::save_snapshot_file;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use rombel_core::{EnrollmentService, RombelError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body (1 MB). A full bulk batch is far below this.
const MAX_BODY_SIZE: usize = 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
///
/// `EnrollmentService` is internally synchronized, so handlers share it
/// without an outer lock.
#[derive(Clone)]
pub struct AppState {
    pub service: EnrollmentService,
    snapshot_file: Option<Arc<PathBuf>>,
    save_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// State for a backend that persists by itself (redb) or not at all.
    #[must_use]
    pub fn new(service: EnrollmentService) -> Self {
        Self {
            service,
            snapshot_file: None,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// State that rewrites `path` after every successful command.
    #[must_use]
    pub fn with_snapshot_file(service: EnrollmentService, path: PathBuf) -> Self {
        Self {
            snapshot_file: Some(Arc::new(path)),
            ..Self::new(service)
        }
    }

    /// Write the snapshot file, if there is one.
    ///
    /// Snapshots are taken and written under one lock so the file always
    /// ends at the latest state.
    pub fn persist(&self) -> Result<(), RombelError> {
        let Some(path) = &self.snapshot_file else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        save_snapshot_file(&self.service, path)
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `ROMBEL_CORS_ORIGINS`:
/// - If "*": allows all origins
/// - If not set: defaults to localhost only
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("ROMBEL_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (ROMBEL_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in ROMBEL_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                restricted_cors(allowed_origins)
            }
        }
        None => {
            tracing::info!("CORS: No ROMBEL_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
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
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/integrity", get(handlers::integrity_handler))
        .route(
            "/classes",
            get(handlers::list_classes_handler).post(handlers::create_class_handler),
        )
        .route(
            "/classes/{id}",
            get(handlers::get_class_handler)
                .patch(handlers::update_class_handler)
                .delete(handlers::delete_class_handler),
        )
        .route(
            "/classes/{id}/occupancy",
            post(handlers::adjust_occupancy_handler),
        )
        .route("/classes/{id}/roster", get(handlers::class_roster_handler))
        .route("/classes/{id}/history", get(handlers::class_history_handler))
        .route("/classes/{id}/stats", get(handlers::class_stats_handler))
        .route("/enrollments", post(handlers::assign_handler))
        .route("/enrollments/bulk", post(handlers::bulk_assign_handler))
        .route(
            "/transfers",
            get(handlers::list_transfers_handler).post(handlers::transfer_handler),
        )
        .route(
            "/exits",
            get(handlers::list_exits_handler).post(handlers::exit_handler),
        )
        .route(
            "/students/{id}/history",
            get(handlers::student_history_handler),
        )
        .route(
            "/students/{id}/enrollment",
            get(handlers::student_enrollment_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), RombelError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RombelError::Storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Rombel HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RombelError::Storage(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
