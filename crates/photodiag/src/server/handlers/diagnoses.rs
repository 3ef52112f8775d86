//! Diagnosis endpoint handlers

use axum::{
  extract::{Extension, Json, Path, State},
  http::StatusCode,
  response::Json as ResponseJson,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::server::error::DiagnosisError;
use crate::server::middleware::RequestContext;
use crate::server::services::reconciler::VALIDATION_MESSAGE;
use crate::server::startup::AppState;
use crate::server::types::{
  ApiError, BaseResponse, FeedbackHistoryResponse, GenerateDiagnosisRequest,
  GenerateDiagnosisResponse, RecordValidatedDescriptionRequest, RecordValidatedDescriptionResponse,
};

const GENERATE_FAILED: &str = "Could not generate diagnosis";
const VALIDATE_FAILED: &str = "Could not save validated description";

type ErrorResponse = (StatusCode, ResponseJson<BaseResponse<()>>);

/// HTTP status for each error category
pub fn status_for(error: &DiagnosisError) -> StatusCode {
  match error {
    DiagnosisError::Validation { .. } => StatusCode::BAD_REQUEST,
    DiagnosisError::Upstream { .. } => StatusCode::BAD_GATEWAY,
    DiagnosisError::Configuration { .. } | DiagnosisError::Persistence { .. } => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

fn error_response(operation: &str, error: &DiagnosisError, transaction_id: Uuid) -> ErrorResponse {
  let api_error = ApiError::from_diagnosis_error(operation, error);
  (status_for(error), ResponseJson(BaseResponse::<()>::error(vec![api_error], transaction_id)))
}

/// POST /diagnoses/generate - Suggest a grounded description for a photo
pub async fn generate_diagnosis(
  State(state): State<Arc<AppState>>,
  Extension(context): Extension<RequestContext>,
  Json(request): Json<GenerateDiagnosisRequest>,
) -> Result<ResponseJson<BaseResponse<GenerateDiagnosisResponse>>, ErrorResponse> {
  let transaction_id = context.request_id;
  tracing::info!(
    request_id = %transaction_id,
    photo_id = request.photo_id.as_deref().unwrap_or("-"),
    "Generating diagnosis"
  );

  let result = match state.generator() {
    Ok(generator) => generator.generate(request).await,
    Err(e) => Err(e),
  };

  match result {
    Ok(suggestion) => {
      Ok(ResponseJson(BaseResponse::success(GenerateDiagnosisResponse::from(suggestion), transaction_id)))
    }
    Err(e) => {
      tracing::error!(request_id = %transaction_id, key = e.key(), "{}: {}", GENERATE_FAILED, e);
      Err(error_response(GENERATE_FAILED, &e, transaction_id))
    }
  }
}

/// POST /diagnoses/validate - Record the description an operator accepted
pub async fn record_validated_description(
  State(state): State<Arc<AppState>>,
  Extension(context): Extension<RequestContext>,
  Json(request): Json<RecordValidatedDescriptionRequest>,
) -> Result<ResponseJson<BaseResponse<RecordValidatedDescriptionResponse>>, ErrorResponse> {
  let transaction_id = context.request_id;

  let result = match request.check_required().and_then(|()| state.reconciler()) {
    Ok(reconciler) => reconciler.record(request).await,
    Err(e) => Err(e),
  };

  match result {
    Ok(outcome) => {
      let response = RecordValidatedDescriptionResponse {
        feedback_id: outcome.feedback_id,
        message: VALIDATION_MESSAGE.to_string(),
      };
      Ok(ResponseJson(BaseResponse::success(response, transaction_id)))
    }
    Err(e) => {
      tracing::error!(request_id = %transaction_id, key = e.key(), "{}: {}", VALIDATE_FAILED, e);
      Err(error_response(VALIDATE_FAILED, &e, transaction_id))
    }
  }
}

/// GET /photos/{photo_id}/feedback - Audit trail for one photo
pub async fn feedback_history(
  State(state): State<Arc<AppState>>,
  Extension(context): Extension<RequestContext>,
  Path(photo_id): Path<String>,
) -> Result<ResponseJson<BaseResponse<FeedbackHistoryResponse>>, ErrorResponse> {
  let transaction_id = context.request_id;

  match state.ledger.list_for_photo(&photo_id).await {
    Ok(records) => {
      Ok(ResponseJson(BaseResponse::success(FeedbackHistoryResponse { records }, transaction_id)))
    }
    Err(e) => {
      tracing::error!(request_id = %transaction_id, photo_id = %photo_id, "Failed to read feedback history: {:#}", e);
      let error = ApiError::new("history_unavailable", &format!("Could not read feedback history: {e}"));
      Err((StatusCode::INTERNAL_SERVER_ERROR, ResponseJson(BaseResponse::<()>::error(vec![error], transaction_id))))
    }
  }
}
