//! Similarity index abstraction over persisted feedback embeddings
//!
//! Implementations store exactly one `EmbeddingRecord` per feedback id and
//! answer nearest-neighbor queries by cosine similarity. The file-backed
//! index below does an exact scan; the LanceDB index lives behind the
//! `lancedb` feature.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::embeddings::{cosine_similarity, SIMILARITY_EPSILON};
use super::storage::{count_json_dir, read_json, read_json_dir, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
  pub feedback_id: Uuid,
  pub vector: Vec<f32>,
  pub context_text: String,
}

/// Nearest-neighbor hit, before it is joined with its ledger record
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
  pub feedback_id: Uuid,
  pub similarity: f32,
  pub context_text: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
  /// Insert or overwrite the embedding keyed by `record.feedback_id`
  async fn upsert(&self, record: EmbeddingRecord) -> Result<()>;

  /// At most `limit` matches with similarity >= `min_similarity`, best first
  async fn nearest(
    &self,
    query: &[f32],
    limit: usize,
    min_similarity: f32,
  ) -> Result<Vec<IndexMatch>>;

  async fn get(&self, feedback_id: Uuid) -> Result<Option<EmbeddingRecord>>;

  async fn count(&self) -> Result<usize>;

  fn backend_name(&self) -> &'static str;
}

/// Apply the threshold, order by similarity (ties by id) and cut to `limit`
pub fn rank_matches(candidates: Vec<IndexMatch>, limit: usize, min_similarity: f32) -> Vec<IndexMatch> {
  let floor = min_similarity - SIMILARITY_EPSILON;
  let mut ranked: Vec<IndexMatch> =
    candidates.into_iter().filter(|candidate| candidate.similarity >= floor).collect();

  ranked.sort_by(|a, b| {
    b.similarity
      .partial_cmp(&a.similarity)
      .unwrap_or(Ordering::Equal)
      .then_with(|| a.feedback_id.cmp(&b.feedback_id))
  });
  ranked.truncate(limit);
  ranked
}

/// Exact-scan index keeping one JSON document per feedback id
pub struct FileSimilarityIndex {
  dir: PathBuf,
  write_lock: Mutex<()>,
}

impl FileSimilarityIndex {
  pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
    let dir = dir.into();
    tokio::fs::create_dir_all(&dir).await?;
    Ok(Self { dir, write_lock: Mutex::new(()) })
  }

  fn record_path(&self, feedback_id: Uuid) -> PathBuf {
    self.dir.join(format!("{feedback_id}.json"))
  }
}

#[async_trait]
impl SimilarityIndex for FileSimilarityIndex {
  async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    write_json_atomic(&self.record_path(record.feedback_id), &record).await?;
    tracing::debug!(feedback_id = %record.feedback_id, "Stored embedding");
    Ok(())
  }

  async fn nearest(
    &self,
    query: &[f32],
    limit: usize,
    min_similarity: f32,
  ) -> Result<Vec<IndexMatch>> {
    if limit == 0 {
      return Ok(Vec::new());
    }

    let records: Vec<EmbeddingRecord> = read_json_dir(&self.dir).await?;
    let candidates = records
      .into_iter()
      .map(|record| IndexMatch {
        similarity: cosine_similarity(query, &record.vector),
        feedback_id: record.feedback_id,
        context_text: record.context_text,
      })
      .collect();

    Ok(rank_matches(candidates, limit, min_similarity))
  }

  async fn get(&self, feedback_id: Uuid) -> Result<Option<EmbeddingRecord>> {
    read_json(&self.record_path(feedback_id)).await
  }

  async fn count(&self) -> Result<usize> {
    count_json_dir(&self.dir).await
  }

  fn backend_name(&self) -> &'static str {
    "file"
  }
}
