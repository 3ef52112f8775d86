//! Vision model access: prompt transport, photo download and output parsing

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::openai::OpenAiClient;
use crate::server::error::DiagnosisError;
use crate::server::models::feedback::{clamp_confidence, normalize_tags, DEFAULT_CONFIDENCE};
use crate::server::models::photo::{data_url, DEFAULT_MIME_TYPE};
use crate::server::models::{DiagnosisSummary, Severity};

const SERVICE: &str = "chat completions";

pub const MAX_DESCRIPTION_CHARS: usize = 280;
pub const MAX_RECOMMENDATION_CHARS: usize = 200;

/// Everything sent to the model for one generation
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisPrompt {
  pub instructions: String,
  pub user_text: String,
  /// `data:` URL of the photo; `None` means a text-only prompt
  pub image_url: Option<String>,
  pub temperature: f32,
  pub max_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionModel: Send + Sync {
  fn model_name(&self) -> String;

  /// Raw text content of the model's answer
  async fn complete(&self, prompt: &DiagnosisPrompt) -> Result<String, DiagnosisError>;
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
  content: Option<String>,
}

pub struct OpenAiVisionModel {
  client: OpenAiClient,
  model: String,
}

impl OpenAiVisionModel {
  pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
    Self { client, model: model.into() }
  }

  fn request_body(&self, prompt: &DiagnosisPrompt) -> Value {
    let mut content = vec![json!({ "type": "text", "text": prompt.user_text })];
    if let Some(image_url) = &prompt.image_url {
      content.push(json!({ "type": "image_url", "image_url": { "url": image_url } }));
    }

    json!({
      "model": self.model,
      "temperature": prompt.temperature,
      "max_tokens": prompt.max_tokens,
      "response_format": {
        "type": "json_schema",
        "json_schema": { "name": "photo_diagnosis", "strict": true, "schema": diagnosis_schema() }
      },
      "messages": [
        { "role": "system", "content": prompt.instructions },
        { "role": "user", "content": content }
      ]
    })
  }
}

#[async_trait]
impl VisionModel for OpenAiVisionModel {
  fn model_name(&self) -> String {
    self.model.clone()
  }

  async fn complete(&self, prompt: &DiagnosisPrompt) -> Result<String, DiagnosisError> {
    let body = self.request_body(prompt);
    let response: ChatResponse = self.client.post_json(SERVICE, "chat/completions", &body).await?;

    response
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .map(|content| content.trim().to_string())
      .filter(|content| !content.is_empty())
      .ok_or_else(|| DiagnosisError::upstream(SERVICE, "model returned empty content"))
  }
}

/// JSON schema the model must answer with
fn diagnosis_schema() -> Value {
  json!({
    "type": "object",
    "properties": {
      "description": { "type": "string" },
      "defectTags": { "type": "array", "items": { "type": "string" } },
      "severity": { "type": "string", "enum": ["Low", "Medium", "High", "Critical"] },
      "recommendations": { "type": "string" },
      "confidence": { "type": "number" }
    },
    "required": ["description", "defectTags", "severity", "recommendations", "confidence"],
    "additionalProperties": false
  })
}

/// Downloads remote photos so they can be inlined into the prompt
#[derive(Clone)]
pub struct PhotoFetcher {
  http: Client,
  timeout: Duration,
}

impl PhotoFetcher {
  pub fn new(http: Client, timeout: Duration) -> Self {
    Self { http, timeout }
  }

  /// `data:` URL for the photo, or `None` when it could not be downloaded
  pub async fn fetch_data_url(&self, url: &Url) -> Option<String> {
    match self.fetch(url).await {
      Ok(data_url) => Some(data_url),
      Err(e) => {
        tracing::warn!("Photo download failed, continuing without image: {}", e);
        None
      }
    }
  }

  async fn fetch(&self, url: &Url) -> Result<String> {
    let response = self
      .http
      .get(url.clone())
      .timeout(self.timeout)
      .send()
      .await
      .map_err(|e| anyhow!("GET {url} failed: {e}"))?;

    if !response.status().is_success() {
      return Err(anyhow!("GET {url} returned {}", response.status()));
    }

    let mime_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.split(';').next())
      .map(str::trim)
      .filter(|value| !value.is_empty())
      .unwrap_or(DEFAULT_MIME_TYPE)
      .to_string();

    let bytes = response.bytes().await.map_err(|e| anyhow!("Reading {url} failed: {e}"))?;
    if bytes.is_empty() {
      return Err(anyhow!("GET {url} returned an empty body"));
    }

    Ok(data_url(&mime_type, &STANDARD.encode(&bytes)))
  }
}

/// Parsed model answer. `degraded` marks the fallback built from raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDiagnosis {
  pub description: String,
  pub summary: DiagnosisSummary,
  pub degraded: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiagnosis {
  description: String,
  #[serde(default, alias = "defects", alias = "tags")]
  defect_tags: Vec<String>,
  #[serde(default)]
  severity: Option<String>,
  #[serde(default)]
  recommendations: Option<String>,
  #[serde(default)]
  confidence: Option<f64>,
}

impl ModelDiagnosis {
  /// Parse the model's text; anything that does not fit the schema becomes
  /// the degraded default instead of an error
  pub fn from_model_output(raw: &str) -> Self {
    match Self::parse(raw) {
      Ok(diagnosis) => diagnosis,
      Err(e) => {
        tracing::warn!("Model output did not match the diagnosis schema: {}", e);
        Self::degraded(raw)
      }
    }
  }

  fn parse(raw: &str) -> Result<Self> {
    let parsed: RawDiagnosis = serde_json::from_str(strip_code_fence(raw))?;

    let description = truncate_chars(parsed.description.trim(), MAX_DESCRIPTION_CHARS);
    if description.is_empty() {
      return Err(anyhow!("description is empty"));
    }

    let severity = match parsed.severity.as_deref().map(str::parse::<Severity>) {
      Some(Ok(severity)) => severity,
      Some(Err(e)) => {
        tracing::debug!("Falling back to Medium severity: {}", e);
        Severity::Medium
      }
      None => Severity::Medium,
    };

    let recommendations = parsed
      .recommendations
      .map(|text| truncate_chars(text.trim(), MAX_RECOMMENDATION_CHARS))
      .unwrap_or_default();

    let confidence =
      parsed.confidence.map(|value| clamp_confidence(value as f32)).unwrap_or(DEFAULT_CONFIDENCE);

    Ok(Self {
      description,
      summary: DiagnosisSummary {
        defect_tags: normalize_tags(parsed.defect_tags),
        severity,
        recommendations,
        confidence,
      },
      degraded: false,
    })
  }

  fn degraded(raw: &str) -> Self {
    Self {
      description: truncate_chars(raw.trim(), MAX_DESCRIPTION_CHARS),
      summary: DiagnosisSummary {
        defect_tags: Vec::new(),
        severity: Severity::Medium,
        recommendations: String::new(),
        confidence: DEFAULT_CONFIDENCE,
      },
      degraded: true,
    }
  }
}

fn strip_code_fence(raw: &str) -> &str {
  let trimmed = raw.trim();
  trimmed
    .strip_prefix("```json")
    .or_else(|| trimmed.strip_prefix("```"))
    .and_then(|inner| inner.strip_suffix("```"))
    .map(str::trim)
    .unwrap_or(trimmed)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
  text.chars().take(max_chars).collect()
}
