//! HTTP client for the diagnosis REST API
//!
//! Thin wrapper that lets the CLI talk to a local or remote server.

use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::server::types::{
  ApiError, BaseResponse, FeedbackHistoryResponse, GenerateDiagnosisRequest,
  GenerateDiagnosisResponse, RecordValidatedDescriptionRequest, RecordValidatedDescriptionResponse,
  StatusResponse,
};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Configuration for the diagnosis HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL of the server (e.g., "http://127.0.0.1:3000")
  pub base_url: String,
  /// Request timeout in seconds; generation chains several remote calls
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { base_url: DEFAULT_SERVER_URL.to_string(), timeout_secs: 90 }
  }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
  #[serde(default)]
  errors: Vec<ApiError>,
}

/// HTTP client for the diagnosis REST API
pub struct PhotodiagClient {
  client: Client,
  config: ClientConfig,
}

impl PhotodiagClient {
  pub fn with_config(config: ClientConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
  }

  /// Request a grounded diagnosis for one photo
  pub async fn generate(&self, request: &GenerateDiagnosisRequest) -> Result<GenerateDiagnosisResponse> {
    let response = timeout(
      Duration::from_secs(self.config.timeout_secs),
      self.client.post(self.url("diagnoses/generate")).json(request).send(),
    )
    .await??;

    read_data(response, "Failed to generate diagnosis").await
  }

  /// Record the description an operator accepted
  pub async fn validate(
    &self,
    request: &RecordValidatedDescriptionRequest,
  ) -> Result<RecordValidatedDescriptionResponse> {
    let response = timeout(
      Duration::from_secs(self.config.timeout_secs),
      self.client.post(self.url("diagnoses/validate")).json(request).send(),
    )
    .await??;

    read_data(response, "Failed to save validated description").await
  }

  /// Ledger records of one photo, oldest first
  pub async fn history(&self, photo_id: &str) -> Result<FeedbackHistoryResponse> {
    let mut url = reqwest::Url::parse(&self.url("photos"))?;
    url
      .path_segments_mut()
      .map_err(|_| anyhow!("Server URL cannot be a base: {}", self.config.base_url))?
      .push(photo_id)
      .push("feedback");

    let response =
      timeout(Duration::from_secs(self.config.timeout_secs), self.client.get(url).send()).await??;

    read_data(response, "Failed to get feedback history").await
  }

  pub async fn status(&self) -> Result<StatusResponse> {
    let response =
      timeout(Duration::from_secs(self.config.timeout_secs), self.client.get(self.url("status")).send())
        .await??;

    read_data(response, "Failed to get server status").await
  }
}

async fn read_data<T: DeserializeOwned>(response: Response, failure: &str) -> Result<T> {
  if !response.status().is_success() {
    let status = response.status();
    let error_text = response.text().await?;
    return Err(anyhow!("{} ({}): {}", failure, status, error_detail(&error_text)));
  }

  let result: BaseResponse<T> = response.json().await?;
  Ok(result.data)
}

/// Error messages from an envelope body, or the raw body when it is not one
fn error_detail(body: &str) -> String {
  match serde_json::from_str::<ErrorEnvelope>(body) {
    Ok(envelope) if !envelope.errors.is_empty() => {
      envelope.errors.iter().map(|error| error.message.as_str()).collect::<Vec<_>>().join("; ")
    }
    _ => body.trim().to_string(),
  }
}

/// Client for `server_url`, falling back to the default local server
pub fn get_client(server_url: Option<&str>) -> Result<PhotodiagClient> {
  let base_url = server_url.unwrap_or(DEFAULT_SERVER_URL).to_string();
  PhotodiagClient::with_config(ClientConfig { base_url, ..ClientConfig::default() })
}
