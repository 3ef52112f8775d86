//! Status and version endpoint handlers

use axum::{
  extract::{Extension, State},
  http::StatusCode,
  response::Json,
};
use std::sync::Arc;

use crate::server::middleware::RequestContext;
use crate::server::startup::AppState;
use crate::server::types::{ApiError, BaseResponse, StatusResponse, VersionResponse};

/// GET /status - Health check endpoint
pub async fn status(
  State(state): State<Arc<AppState>>,
  Extension(context): Extension<RequestContext>,
) -> Result<Json<BaseResponse<StatusResponse>>, (StatusCode, Json<BaseResponse<()>>)> {
  let transaction_id = context.request_id;

  let counts = async { Ok::<_, anyhow::Error>((state.ledger.count().await?, state.index.count().await?)) };
  match counts.await {
    Ok((feedback_records, indexed_embeddings)) => {
      let response = StatusResponse {
        status: "healthy".to_string(),
        data_root: state.config.data_root.to_string_lossy().to_string(),
        index_backend: state.index.backend_name().to_string(),
        feedback_records,
        indexed_embeddings,
        version: env!("CARGO_PKG_VERSION").to_string(),
      };
      Ok(Json(BaseResponse::success(response, transaction_id)))
    }
    Err(e) => {
      tracing::error!(request_id = %transaction_id, "Status check failed: {:#}", e);
      let error = ApiError::new("status_unavailable", &format!("Could not read stores: {e}"));
      Err((StatusCode::INTERNAL_SERVER_ERROR, Json(BaseResponse::<()>::error(vec![error], transaction_id))))
    }
  }
}

/// GET /version - Returns current API version
pub async fn version(
  Extension(context): Extension<RequestContext>,
) -> Json<BaseResponse<VersionResponse>> {
  let response = VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() };
  Json(BaseResponse::success(response, context.request_id))
}
