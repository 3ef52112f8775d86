//! Diagnosis generator: grounded single-shot generation for one photo
//!
//! Embeds the context, retrieves validated exemplars, calls the vision model
//! and records the result as an unvalidated AI audit record. Nothing is
//! persisted unless the model call succeeded.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::embeddings::Embedder;
use super::grounding::{render_exemplars, Exemplar, RetrievalGrounding};
use super::ledger::FeedbackLedger;
use super::vision::{DiagnosisPrompt, ModelDiagnosis, PhotoFetcher, VisionModel};
use crate::server::error::DiagnosisError;
use crate::server::models::photo::{data_url, DEFAULT_MIME_TYPE};
use crate::server::models::{
  DiagnosisSummary, DiagnosticContext, ExemplarUse, FeedbackMetadata, FeedbackRecord,
  PhotoReference, RecordScope,
};

pub const DETAILED_TEMPERATURE: f32 = 0.35;
pub const DEFAULT_TEMPERATURE: f32 = 0.25;
pub const MAX_OUTPUT_TOKENS: u32 = 350;

const INSTRUCTIONS: &str = "You are a building inspection engineer writing entries for an \
inspection report. Describe the pathology visible in the photo in one short technical \
description of at most 280 characters. Answer only with JSON containing: description (string), \
defectTags (array of short defect labels), severity (one of Low, Medium, High, Critical), \
recommendations (string of at most 200 characters) and confidence (number between 0 and 1). \
If no defect is visible, say so in the description and use severity Low. When validated \
examples are provided, follow their vocabulary and level of detail.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDiagnosisRequest {
  #[serde(default)]
  pub photo_id: Option<String>,
  /// Remote photo location
  #[serde(default)]
  pub photo_url: Option<String>,
  /// Inline JPEG bytes, base64 encoded; preferred over `photoUrl`
  #[serde(default)]
  pub image_base64: Option<String>,
  #[serde(default)]
  pub group_id: Option<String>,
  #[serde(default)]
  pub inspection_id: Option<String>,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(flatten)]
  pub context: DiagnosticContext,
}

impl GenerateDiagnosisRequest {
  fn scope(&self) -> RecordScope {
    RecordScope {
      photo_id: self.photo_id.clone(),
      group_id: self.group_id.clone(),
      inspection_id: self.inspection_id.clone(),
      user_id: self.user_id.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisSuggestion {
  pub description: String,
  pub summary: DiagnosisSummary,
  /// Audit record id; `None` when the audit write failed
  pub feedback_id: Option<Uuid>,
  pub exemplars: Vec<Exemplar>,
}

pub struct DiagnosisGenerator {
  embedder: Arc<dyn Embedder>,
  model: Arc<dyn VisionModel>,
  photos: PhotoFetcher,
  grounding: RetrievalGrounding,
  ledger: Arc<dyn FeedbackLedger>,
}

impl DiagnosisGenerator {
  pub fn new(
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn VisionModel>,
    photos: PhotoFetcher,
    grounding: RetrievalGrounding,
    ledger: Arc<dyn FeedbackLedger>,
  ) -> Self {
    Self { embedder, model, photos, grounding, ledger }
  }

  pub async fn generate(
    &self,
    request: GenerateDiagnosisRequest,
  ) -> Result<DiagnosisSuggestion, DiagnosisError> {
    let photo =
      PhotoReference::from_parts(request.photo_url.as_deref(), request.image_base64.as_deref())?;
    let context = &request.context;
    let context_summary = context.summary();

    let query_vector = self.embedder.embed(&context.retrieval_text()).await?;
    let exemplars = self.grounding.exemplars_for(&query_vector).await;

    let image_url = match &photo {
      PhotoReference::Inline { base64 } => Some(data_url(DEFAULT_MIME_TYPE, base64)),
      PhotoReference::Remote(url) => self.photos.fetch_data_url(url).await,
      PhotoReference::Unreadable { reason } => {
        tracing::warn!("Inline photo unusable, continuing without image: {}", reason);
        None
      }
    };

    let prompt = build_prompt(context, &context_summary, &exemplars, image_url);
    let raw_output = self.model.complete(&prompt).await?;
    let diagnosis = ModelDiagnosis::from_model_output(&raw_output);

    let metadata = FeedbackMetadata {
      severity: Some(diagnosis.summary.severity),
      recommendations: Some(diagnosis.summary.recommendations.clone()),
      context_summary: Some(context_summary),
      context_fields: context.fields(),
      exemplars_used: exemplars
        .iter()
        .map(|exemplar| ExemplarUse { id: exemplar.feedback_id, similarity: exemplar.similarity })
        .collect(),
      model: Some(self.model.model_name()),
      temperature: Some(prompt.temperature),
      ..Default::default()
    };
    let audit = FeedbackRecord::ai_draft(
      request.scope(),
      diagnosis.description.clone(),
      &diagnosis.summary,
      metadata,
    );

    let feedback_id = match self.ledger.insert(audit).await {
      Ok(record) => Some(record.id),
      Err(e) => {
        tracing::error!("Failed to record AI audit entry: {:#}", e);
        None
      }
    };

    tracing::info!(
      photo_id = request.photo_id.as_deref().unwrap_or("-"),
      exemplars = exemplars.len(),
      degraded = diagnosis.degraded,
      "Generated diagnosis"
    );

    Ok(DiagnosisSuggestion {
      description: diagnosis.description,
      summary: diagnosis.summary,
      feedback_id,
      exemplars,
    })
  }
}

/// Assemble the grounded prompt for one generation
pub fn build_prompt(
  context: &DiagnosticContext,
  context_summary: &str,
  exemplars: &[Exemplar],
  image_url: Option<String>,
) -> DiagnosisPrompt {
  let mut sections = vec![format!("Context: {context_summary}")];

  if exemplars.is_empty() {
    sections.push("No validated examples are available for this context.".to_string());
  } else {
    sections.push(format!(
      "Validated descriptions from similar inspections:\n\n{}",
      render_exemplars(exemplars)
    ));
  }

  if let Some(draft) = context.draft_text() {
    sections.push(format!("Current draft written by the inspector: {draft}"));
  }

  sections.push(if image_url.is_some() {
    "Describe the pathology in the attached photo.".to_string()
  } else {
    "The photo could not be loaded; base the description on the context above.".to_string()
  });

  let temperature = if context.is_detailed() { DETAILED_TEMPERATURE } else { DEFAULT_TEMPERATURE };

  DiagnosisPrompt {
    instructions: INSTRUCTIONS.to_string(),
    user_text: sections.join("\n\n"),
    image_url,
    temperature,
    max_tokens: MAX_OUTPUT_TOKENS,
  }
}
