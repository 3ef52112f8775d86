//! Retrieval grounding: nearest validated descriptions for a new generation

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use super::ledger::FeedbackLedger;
use super::similarity_index::SimilarityIndex;
use crate::server::config::{DEFAULT_EXEMPLAR_LIMIT, DEFAULT_SIMILARITY_FLOOR};
use crate::server::models::Origin;

/// A retrieved prior description used to ground a generation
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
  pub feedback_id: Uuid,
  pub text: String,
  pub similarity: f32,
  pub origin: Origin,
  pub context_text: String,
  pub tags: Vec<String>,
}

impl Exemplar {
  /// Similarity as a percentage rounded to one decimal place
  pub fn similarity_percent(&self) -> f32 {
    (self.similarity * 1000.0).round() / 10.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
  pub limit: usize,
  pub min_similarity: f32,
}

impl Default for RetrievalSettings {
  fn default() -> Self {
    Self { limit: DEFAULT_EXEMPLAR_LIMIT, min_similarity: DEFAULT_SIMILARITY_FLOOR }
  }
}

pub struct RetrievalGrounding {
  index: Arc<dyn SimilarityIndex>,
  ledger: Arc<dyn FeedbackLedger>,
  settings: RetrievalSettings,
}

impl RetrievalGrounding {
  pub fn new(
    index: Arc<dyn SimilarityIndex>,
    ledger: Arc<dyn FeedbackLedger>,
    settings: RetrievalSettings,
  ) -> Self {
    Self { index, ledger, settings }
  }

  /// Nearest exemplars joined with their ledger records.
  ///
  /// Hits whose record is missing or was superseded by a user edit are
  /// dropped, so the index is over-fetched to keep up to `limit` results.
  pub async fn query(&self, vector: &[f32]) -> Result<Vec<Exemplar>> {
    let RetrievalSettings { limit, min_similarity } = self.settings;
    if limit == 0 {
      return Ok(Vec::new());
    }

    let matches = self.index.nearest(vector, limit.saturating_mul(2), min_similarity).await?;

    let mut exemplars = Vec::with_capacity(limit);
    for hit in matches {
      let Some(record) = self.ledger.get(hit.feedback_id).await? else {
        tracing::warn!(feedback_id = %hit.feedback_id, "Indexed embedding has no ledger record");
        continue;
      };
      if record.is_superseded() {
        continue;
      }

      exemplars.push(Exemplar {
        feedback_id: record.id,
        text: record.description,
        similarity: hit.similarity,
        origin: record.origin,
        context_text: hit.context_text,
        tags: record.tags,
      });
      if exemplars.len() == limit {
        break;
      }
    }

    Ok(exemplars)
  }

  /// Like `query`, but a storage failure degrades to ungrounded generation
  pub async fn exemplars_for(&self, vector: &[f32]) -> Vec<Exemplar> {
    match self.query(vector).await {
      Ok(exemplars) => exemplars,
      Err(e) => {
        tracing::error!("Exemplar retrieval failed, continuing without grounding: {:#}", e);
        Vec::new()
      }
    }
  }
}

/// Render exemplars as numbered prompt blocks
pub fn render_exemplars(exemplars: &[Exemplar]) -> String {
  exemplars
    .iter()
    .enumerate()
    .map(|(i, exemplar)| {
      let defects = if exemplar.tags.is_empty() {
        "not provided".to_string()
      } else {
        exemplar.tags.join(", ")
      };
      format!(
        "EXAMPLE {} (similarity {:.1}%):\n{}\nDefects: {}",
        i + 1,
        exemplar.similarity * 100.0,
        exemplar.text,
        defects
      )
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}
