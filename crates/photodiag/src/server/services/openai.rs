//! Minimal client for the OpenAI-compatible REST API
//!
//! Shared by the embedder and the vision model. Maps transport and HTTP
//! failures onto `DiagnosisError::Upstream`, flagging the retryable ones.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::server::error::DiagnosisError;

/// Longest slice of an error body echoed back in messages
const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Clone)]
pub struct OpenAiClient {
  http: Client,
  base_url: String,
  api_key: String,
  timeout: Duration,
}

impl OpenAiClient {
  pub fn new(
    http: Client,
    base_url: impl Into<String>,
    api_key: impl Into<String>,
    timeout: Duration,
  ) -> Self {
    Self { http, base_url: base_url.into(), api_key: api_key.into(), timeout }
  }

  /// POST `body` to `{base_url}/{path}` and decode the JSON answer
  pub async fn post_json<B, T>(&self, service: &str, path: &str, body: &B) -> Result<T, DiagnosisError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'));

    let response = self
      .http
      .post(&url)
      .bearer_auth(&self.api_key)
      .timeout(self.timeout)
      .json(body)
      .send()
      .await
      .map_err(|e| self.transport_error(service, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(status_error(service, status, &body));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| DiagnosisError::upstream(service, format!("unreadable response body: {e}")))
  }

  fn transport_error(&self, service: &str, error: reqwest::Error) -> DiagnosisError {
    if error.is_timeout() {
      DiagnosisError::upstream_retryable(
        service,
        format!("timed out after {}s", self.timeout.as_secs()),
      )
    } else if error.is_connect() {
      DiagnosisError::upstream_retryable(service, format!("connection failed: {error}"))
    } else {
      DiagnosisError::upstream(service, error.to_string())
    }
  }
}

fn status_error(service: &str, status: StatusCode, body: &str) -> DiagnosisError {
  let message = format!("{status}: {}", error_detail(body));
  if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
    DiagnosisError::upstream_retryable(service, message)
  } else {
    DiagnosisError::upstream(service, message)
  }
}

/// Prefer the API's `error.message`, else a bounded slice of the raw body
fn error_detail(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|value| value.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
    .unwrap_or_else(|| body.trim().chars().take(ERROR_SNIPPET_CHARS).collect())
}
