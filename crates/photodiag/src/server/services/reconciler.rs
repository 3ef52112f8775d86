//! Validation reconciler: folds a human-finalized description into the
//! ledger and the similarity index.
//!
//! Save transitions:
//! - insert: no prior record, a fresh validated user record is appended
//! - promote: prior record accepted unedited, it is validated in place
//! - fork: prior record was edited, it is flagged superseded and a validated
//!   user child pointing at it is appended
//!
//! Ledger failures abort the save. Indexing runs after the ledger write and
//! only logs on failure.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::embeddings::Embedder;
use super::ledger::FeedbackLedger;
use super::similarity_index::{EmbeddingRecord, SimilarityIndex};
use crate::server::error::DiagnosisError;
use crate::server::models::feedback::{clamp_confidence, normalize_tags};
use crate::server::models::{
  DiagnosticContext, FeedbackMetadata, FeedbackRecord, Origin, RecordScope, SummaryUpdate,
};

pub const VALIDATION_MESSAGE: &str = "Validated description recorded successfully.";

const LEDGER: &str = "feedback ledger";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedDescription {
  #[serde(default)]
  pub photo_id: Option<String>,
  #[serde(default)]
  pub group_id: Option<String>,
  #[serde(default)]
  pub inspection_id: Option<String>,
  #[serde(default)]
  pub user_id: Option<String>,
  /// Text the operator accepted or wrote
  #[serde(default)]
  pub final_text: Option<String>,
  /// Audit record of the AI draft this text started from
  #[serde(default)]
  pub prior_feedback_id: Option<Uuid>,
  /// Whether the operator changed the draft; absent means unedited
  #[serde(default)]
  pub was_edited: Option<bool>,
  #[serde(default)]
  pub summary: Option<SummaryUpdate>,
  #[serde(flatten)]
  pub context: DiagnosticContext,
}

impl ValidatedDescription {
  /// Reject requests missing `photoId` or `finalText`, before any store is touched
  pub fn check_required(&self) -> Result<(), DiagnosisError> {
    required(self.photo_id.as_deref(), "photoId")?;
    required(self.final_text.as_deref(), "finalText")?;
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTransition {
  Insert,
  Promote(Uuid),
  Fork(Uuid),
}

impl SaveTransition {
  pub fn plan(prior_feedback_id: Option<Uuid>, was_edited: Option<bool>) -> Self {
    let was_edited = was_edited.unwrap_or(false);
    match prior_feedback_id {
      None => Self::Insert,
      Some(prior) if was_edited => Self::Fork(prior),
      Some(prior) => Self::Promote(prior),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Insert => "insert",
      Self::Promote(_) => "promote",
      Self::Fork(_) => "fork",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
  pub feedback_id: Uuid,
  pub transition: SaveTransition,
  /// False when the record was saved but its embedding was not refreshed
  pub indexed: bool,
}

pub struct ValidationReconciler {
  ledger: Arc<dyn FeedbackLedger>,
  index: Arc<dyn SimilarityIndex>,
  embedder: Arc<dyn Embedder>,
}

impl ValidationReconciler {
  pub fn new(
    ledger: Arc<dyn FeedbackLedger>,
    index: Arc<dyn SimilarityIndex>,
    embedder: Arc<dyn Embedder>,
  ) -> Self {
    Self { ledger, index, embedder }
  }

  pub async fn record(
    &self,
    request: ValidatedDescription,
  ) -> Result<ValidationOutcome, DiagnosisError> {
    let photo_id = required(request.photo_id.as_deref(), "photoId")?.to_string();
    let final_text = required(request.final_text.as_deref(), "finalText")?.to_string();
    let summary = request.summary.clone().unwrap_or_default();
    let transition = SaveTransition::plan(request.prior_feedback_id, request.was_edited);

    let scope = RecordScope {
      photo_id: Some(photo_id.clone()),
      group_id: request.group_id.clone(),
      inspection_id: request.inspection_id.clone(),
      user_id: request.user_id.clone(),
    };

    let record = match transition {
      SaveTransition::Insert => {
        let metadata = enrich_metadata(FeedbackMetadata::default(), &summary, &request.context);
        let tags = summary.defect_tags.clone().unwrap_or_default();
        let record = FeedbackRecord::user_validated(scope, final_text, tags, None, metadata);
        self.ledger.insert(record).await.map_err(persistence_error)?
      }
      SaveTransition::Promote(prior_id) => {
        let prior = self.load_prior(prior_id, &photo_id).await?;
        let record = promote(prior, scope, final_text, &summary, &request.context);
        self.ledger.update(record).await.map_err(persistence_error)?
      }
      SaveTransition::Fork(prior_id) => {
        let prior = self.load_prior(prior_id, &photo_id).await?;
        let metadata = enrich_metadata(FeedbackMetadata::default(), &summary, &request.context);
        let tags = summary.defect_tags.clone().unwrap_or_else(|| prior.tags.clone());
        let successor = FeedbackRecord::user_validated(scope, final_text, tags, Some(&prior), metadata);
        self.ledger.supersede(prior.id, successor).await.map_err(persistence_error)?
      }
    };

    let indexed = self.refresh_embedding(&record, &request.context).await;

    tracing::info!(
      feedback_id = %record.id,
      photo_id = %photo_id,
      transition = transition.label(),
      indexed,
      "Recorded validated description"
    );

    Ok(ValidationOutcome { feedback_id: record.id, transition, indexed })
  }

  async fn load_prior(&self, prior_id: Uuid, photo_id: &str) -> Result<FeedbackRecord, DiagnosisError> {
    let prior = self
      .ledger
      .get(prior_id)
      .await
      .map_err(|e| DiagnosisError::persistence(LEDGER, format!("{e:#}")))?
      .ok_or_else(|| DiagnosisError::validation(format!("priorFeedbackId {prior_id} does not exist")))?;

    match prior.photo_id.as_deref() {
      Some(prior_photo) if prior_photo != photo_id => Err(DiagnosisError::validation(format!(
        "priorFeedbackId {prior_id} belongs to photo {prior_photo}, not {photo_id}"
      ))),
      _ => Ok(prior),
    }
  }

  /// Embed the validated text and upsert it; failures are logged only
  async fn refresh_embedding(&self, record: &FeedbackRecord, context: &DiagnosticContext) -> bool {
    let (embedding_text, context_text) = indexing_texts(record, context);

    let vector = match self.embedder.embed(&embedding_text).await {
      Ok(vector) => vector,
      Err(e) => {
        tracing::warn!(feedback_id = %record.id, "Saved record but embedding failed: {}", e);
        return false;
      }
    };

    let embedding = EmbeddingRecord { feedback_id: record.id, vector, context_text };
    match self.index.upsert(embedding).await {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(feedback_id = %record.id, "Saved record but index upsert failed: {:#}", e);
        false
      }
    }
  }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, DiagnosisError> {
  value
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .ok_or_else(|| DiagnosisError::validation(format!("{field} is required")))
}

fn persistence_error(error: anyhow::Error) -> DiagnosisError {
  DiagnosisError::persistence(LEDGER, format!("{error:#}"))
}

/// Validate `prior` in place, keeping its identity and origin
fn promote(
  mut prior: FeedbackRecord,
  scope: RecordScope,
  final_text: String,
  summary: &SummaryUpdate,
  context: &DiagnosticContext,
) -> FeedbackRecord {
  prior.description = final_text;
  prior.validated = true;

  if let Some(tags) = &summary.defect_tags {
    prior.tags = normalize_tags(tags.clone());
  }

  prior.confidence = match prior.origin {
    Origin::Ai => summary.confidence.map(clamp_confidence).or(prior.confidence),
    Origin::User => None,
  };

  prior.photo_id = prior.photo_id.or(scope.photo_id);
  prior.group_id = scope.group_id.or(prior.group_id);
  prior.inspection_id = scope.inspection_id.or(prior.inspection_id);
  prior.user_id = scope.user_id.or(prior.user_id);
  prior.metadata = enrich_metadata(prior.metadata, summary, context);
  prior
}

fn enrich_metadata(
  mut metadata: FeedbackMetadata,
  summary: &SummaryUpdate,
  context: &DiagnosticContext,
) -> FeedbackMetadata {
  if let Some(severity) = summary.severity {
    metadata.severity = Some(severity);
  }
  if let Some(recommendations) = &summary.recommendations {
    metadata.recommendations = Some(recommendations.trim().to_string());
  }

  let fields = context.fields();
  if !fields.is_empty() {
    metadata.context_summary = Some(context.summary());
    metadata.context_fields.extend(fields);
  }
  metadata
}

/// Text to embed and the context text stored next to the vector
pub fn indexing_texts(record: &FeedbackRecord, context: &DiagnosticContext) -> (String, String) {
  let parts = context.validation_parts(record.metadata.severity);
  let header = (!parts.is_empty()).then(|| parts.join(" | "));

  let mut context_lines: Vec<String> = header.into_iter().collect();
  context_lines.push(record.description.clone());
  let context_text = context_lines.join("\n");

  let mut embedding_lines = context_lines;
  if let Some(recommendations) =
    record.metadata.recommendations.as_deref().map(str::trim).filter(|text| !text.is_empty())
  {
    embedding_lines.push(format!("Recommendations: {recommendations}"));
  }

  (embedding_lines.join("\n"), context_text)
}
