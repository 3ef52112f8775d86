//! Error taxonomy shared by the diagnosis and validation pipelines

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
  #[error("AI service is not configured: {message}")]
  Configuration { message: String },

  #[error("{service} request failed: {message}")]
  Upstream { service: String, message: String, retryable: bool },

  #[error("Invalid request: {message}")]
  Validation { message: String },

  #[error("Failed to write {store}: {message}")]
  Persistence { store: String, message: String },
}

impl DiagnosisError {
  pub fn configuration(message: impl Into<String>) -> Self {
    Self::Configuration { message: message.into() }
  }

  pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Upstream { service: service.into(), message: message.into(), retryable: false }
  }

  /// Timeouts, rate limits and 5xx answers are worth retrying by the caller
  pub fn upstream_retryable(service: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Upstream { service: service.into(), message: message.into(), retryable: true }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation { message: message.into() }
  }

  pub fn persistence(store: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Persistence { store: store.into(), message: message.into() }
  }

  /// Stable key used in API error bodies
  pub fn key(&self) -> &'static str {
    match self {
      Self::Configuration { .. } => "configuration_error",
      Self::Upstream { .. } => "upstream_error",
      Self::Validation { .. } => "validation_error",
      Self::Persistence { .. } => "persistence_error",
    }
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Upstream { retryable: true, .. })
  }
}
