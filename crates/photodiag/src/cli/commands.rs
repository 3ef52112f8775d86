use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use colored::*;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cli::client::get_client;
use crate::cli::display::{display_history, display_status, display_suggestion};
use crate::server::models::{DiagnosticContext, Severity, SummaryUpdate};
use crate::server::types::{GenerateDiagnosisRequest, RecordValidatedDescriptionRequest};

/// Inspection context shared by `generate` and `validate`
#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
  /// Room or area, e.g. "Kitchen"
  #[arg(long)]
  pub environment: Option<String>,
  /// Building system, e.g. "Structure"
  #[arg(long)]
  pub system: Option<String>,
  /// Inspected element, e.g. "Beam"
  #[arg(long)]
  pub element: Option<String>,
  /// Inspection status of the element
  #[arg(long)]
  pub status: Option<String>,
  #[arg(long)]
  pub property_id: Option<String>,
  #[arg(long)]
  pub property_name: Option<String>,
  /// Operator performing the inspection
  #[arg(long = "operator")]
  pub operator_name: Option<String>,
  /// Analysis mode; "detailed" asks for a more thorough description
  #[arg(long)]
  pub mode: Option<String>,
  /// Draft text already typed by the operator
  #[arg(long)]
  pub draft: Option<String>,
}

impl From<ContextArgs> for DiagnosticContext {
  fn from(args: ContextArgs) -> Self {
    Self {
      environment: args.environment,
      system: args.system,
      element: args.element,
      status: args.status,
      property_id: args.property_id,
      property_name: args.property_name,
      operator_name: args.operator_name,
      mode: args.mode,
      current_draft_text: args.draft,
    }
  }
}

/// Record scope identifiers
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
  #[arg(long)]
  pub group_id: Option<String>,
  #[arg(long)]
  pub inspection_id: Option<String>,
  #[arg(long)]
  pub user_id: Option<String>,
}

/// Photo source for `generate`; a local file is sent inline
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PhotoArgs {
  /// Local JPEG file
  #[arg(long)]
  pub photo: Option<PathBuf>,
  /// Remote photo URL
  #[arg(long)]
  pub photo_url: Option<String>,
}

/// Structured summary fields for `validate`
#[derive(Args, Debug, Clone, Default)]
pub struct SummaryArgs {
  /// Comma separated defect tags
  #[arg(long, value_delimiter = ',')]
  pub tags: Option<Vec<String>>,
  #[arg(long)]
  pub severity: Option<Severity>,
  #[arg(long)]
  pub recommendations: Option<String>,
  #[arg(long)]
  pub confidence: Option<f32>,
}

impl SummaryArgs {
  fn into_update(self) -> Option<SummaryUpdate> {
    let update = SummaryUpdate {
      defect_tags: self.tags,
      severity: self.severity,
      recommendations: self.recommendations,
      confidence: self.confidence,
    };
    (update != SummaryUpdate::default()).then_some(update)
  }
}

async fn encode_photo(path: &Path) -> Result<String> {
  let bytes =
    tokio::fs::read(path).await.with_context(|| format!("Failed to read photo {}", path.display()))?;
  if bytes.is_empty() {
    return Err(anyhow!("Photo {} is empty", path.display()));
  }
  Ok(STANDARD.encode(bytes))
}

pub fn build_generate_request(
  photo_id: Option<String>,
  photo_url: Option<String>,
  image_base64: Option<String>,
  scope: ScopeArgs,
  context: ContextArgs,
) -> GenerateDiagnosisRequest {
  GenerateDiagnosisRequest {
    photo_id,
    photo_url,
    image_base64,
    group_id: scope.group_id,
    inspection_id: scope.inspection_id,
    user_id: scope.user_id,
    context: context.into(),
  }
}

/// Ask the server for a grounded description of one photo
pub async fn generate(
  server: Option<&str>,
  photo_id: Option<String>,
  photo: PhotoArgs,
  scope: ScopeArgs,
  context: ContextArgs,
) -> Result<()> {
  let image_base64 = match &photo.photo {
    Some(path) => Some(encode_photo(path).await?),
    None => None,
  };

  let request = build_generate_request(photo_id, photo.photo_url, image_base64, scope, context);
  let response = get_client(server)?.generate(&request).await?;

  display_suggestion(&response);
  Ok(())
}

pub fn build_validate_request(
  photo_id: String,
  text: String,
  prior: Option<Uuid>,
  edited: bool,
  scope: ScopeArgs,
  summary: SummaryArgs,
  context: ContextArgs,
) -> RecordValidatedDescriptionRequest {
  RecordValidatedDescriptionRequest {
    photo_id: Some(photo_id),
    group_id: scope.group_id,
    inspection_id: scope.inspection_id,
    user_id: scope.user_id,
    final_text: Some(text),
    prior_feedback_id: prior,
    was_edited: Some(edited),
    summary: summary.into_update(),
    context: context.into(),
  }
}

/// Record the final description an operator accepted
#[allow(clippy::too_many_arguments)]
pub async fn validate(
  server: Option<&str>,
  photo_id: String,
  text: String,
  prior: Option<Uuid>,
  edited: bool,
  scope: ScopeArgs,
  summary: SummaryArgs,
  context: ContextArgs,
) -> Result<()> {
  let request = build_validate_request(photo_id, text, prior, edited, scope, summary, context);
  let response = get_client(server)?.validate(&request).await?;

  println!("{} {}", "✓".green(), response.message);
  println!("  Feedback id: {}", response.feedback_id.to_string().yellow());
  Ok(())
}

/// Show every ledger record of a photo
pub async fn history(server: Option<&str>, photo_id: &str) -> Result<()> {
  let response = get_client(server)?.history(photo_id).await?;
  display_history(photo_id, &response.records);
  Ok(())
}

pub async fn status(server: Option<&str>) -> Result<()> {
  let response = get_client(server)?.status().await?;
  display_status(&response);
  Ok(())
}
