//! Axum router configuration for all endpoints

use axum::{
  middleware,
  routing::{get, post},
  Router,
};
use std::sync::Arc;

use crate::server::handlers::{diagnoses, status};
use crate::server::middleware::request_context_middleware;
use crate::server::startup::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
  Router::new()
    // Status and version endpoints
    .route("/status", get(status::status))
    .route("/version", get(status::version))
    // Diagnosis endpoints
    .route("/diagnoses/generate", post(diagnoses::generate_diagnosis))
    .route("/diagnoses/validate", post(diagnoses::record_validated_description))
    .route("/photos/{photo_id}/feedback", get(diagnoses::feedback_history))
    .layer(middleware::from_fn(request_context_middleware))
    .with_state(state)
}
