//! REST API types with schemars annotations for OpenAPI generation

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::error::DiagnosisError;
use crate::server::models::{DiagnosisSummary, FeedbackRecord, Origin};
use crate::server::services::generator::DiagnosisSuggestion;
use crate::server::services::grounding::Exemplar;

pub use crate::server::services::generator::GenerateDiagnosisRequest;
pub use crate::server::services::reconciler::ValidatedDescription as RecordValidatedDescriptionRequest;

// Base Response Structure
// ======================

/// Base response object for all API endpoints
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BaseResponse<T> {
  /// API versioning information
  pub versioning: VersionInfo,

  /// Transaction ID for logging correlation
  pub transaction_id: Uuid,

  /// Optional error information
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub errors: Vec<ApiError>,

  /// Response data (generic for different endpoint types)
  #[serde(flatten)]
  pub data: T,
}

/// API versioning information
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionInfo {
  /// The latest version of the API
  pub latest: String,

  /// The version of the API requested by the client
  pub requested: String,

  /// The version of the API that was used in producing the response
  pub resolved: String,
}

/// API error information
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
  /// Error key, unique to the error source
  pub key: String,

  /// Human readable error message
  pub message: String,

  /// Additional error context
  #[serde(default)]
  pub context: serde_json::Value,
}

// Status/Version Endpoints
// =======================

/// Response for /version endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionResponse {
  /// Current API version
  pub version: String,
}

/// Response for /status endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
  /// Service health status
  pub status: String,

  /// Data root the server reads and writes
  pub data_root: String,

  /// Similarity index backend in use
  pub index_backend: String,

  /// Records in the feedback ledger
  pub feedback_records: usize,

  /// Vectors in the similarity index
  pub indexed_embeddings: usize,

  /// Server version
  pub version: String,
}

// Diagnosis Endpoints
// ===================

/// Response for /diagnoses/generate endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDiagnosisResponse {
  /// Suggested description for the photo
  pub description_text: String,

  /// Structured defect summary
  pub summary: DiagnosisSummary,

  /// Audit record of this generation, null when it could not be stored
  pub feedback_id: Option<Uuid>,

  /// Validated descriptions the generation was grounded on
  pub exemplars: Vec<ExemplarView>,
}

/// Exemplar as shown to API clients
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExemplarView {
  pub feedback_id: Uuid,
  pub text: String,
  pub similarity_percent: f32,
  pub origin: Origin,
  pub tags: Vec<String>,
}

/// Response for /diagnoses/validate endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordValidatedDescriptionResponse {
  /// Record holding the validated text
  pub feedback_id: Uuid,

  /// Confirmation message
  pub message: String,
}

/// Response for /photos/{photoId}/feedback endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackHistoryResponse {
  /// All ledger records of the photo, oldest first
  pub records: Vec<FeedbackRecord>,
}

// Helper Functions
// ================

fn version_info() -> VersionInfo {
  let version = env!("CARGO_PKG_VERSION");
  VersionInfo {
    latest: version.to_string(),
    requested: version.to_string(),
    resolved: version.to_string(),
  }
}

impl<T> BaseResponse<T> {
  /// Create a successful response
  pub fn success(data: T, transaction_id: Uuid) -> Self {
    Self { versioning: version_info(), transaction_id, errors: Vec::new(), data }
  }

  /// Create an error response
  pub fn error(errors: Vec<ApiError>, transaction_id: Uuid) -> BaseResponse<()> {
    BaseResponse { versioning: version_info(), transaction_id, errors, data: () }
  }
}

impl ApiError {
  /// Create a new API error
  pub fn new(key: &str, message: &str) -> Self {
    Self { key: key.to_string(), message: message.to_string(), context: serde_json::Value::Null }
  }

  /// Wrap a domain error behind an operation-level message
  pub fn from_diagnosis_error(operation: &str, error: &DiagnosisError) -> Self {
    let context = match error {
      DiagnosisError::Upstream { service, retryable, .. } => {
        serde_json::json!({ "service": service, "retryable": retryable })
      }
      DiagnosisError::Persistence { store, .. } => serde_json::json!({ "store": store }),
      _ => serde_json::Value::Null,
    };

    Self { key: error.key().to_string(), message: format!("{operation}: {error}"), context }
  }
}

impl From<&Exemplar> for ExemplarView {
  fn from(exemplar: &Exemplar) -> Self {
    Self {
      feedback_id: exemplar.feedback_id,
      text: exemplar.text.clone(),
      similarity_percent: exemplar.similarity_percent(),
      origin: exemplar.origin,
      tags: exemplar.tags.clone(),
    }
  }
}

impl From<DiagnosisSuggestion> for GenerateDiagnosisResponse {
  fn from(suggestion: DiagnosisSuggestion) -> Self {
    Self {
      exemplars: suggestion.exemplars.iter().map(ExemplarView::from).collect(),
      description_text: suggestion.description,
      summary: suggestion.summary,
      feedback_id: suggestion.feedback_id,
    }
  }
}
