//! Vector search and point lookups against the embeddings table

use anyhow::{anyhow, Result};
use arrow::array::{Array, Float32Array};
use arrow::record_batch::RecordBatch;
use futures::stream::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use uuid::Uuid;

use super::records::{
  batch_to_records, parse_feedback_id, string_column, CONTEXT_TEXT_COLUMN, DISTANCE_COLUMN,
  EMBEDDING_COLUMN, FEEDBACK_ID_COLUMN,
};
use crate::server::services::embeddings::snap_unit;
use crate::server::services::similarity_index::{EmbeddingRecord, IndexMatch};

/// Cosine-distance search returning unfiltered candidates
pub async fn search_candidates(
  table: &Table,
  query_embedding: &[f32],
  limit: usize,
) -> Result<Vec<IndexMatch>> {
  let batches: Vec<RecordBatch> = table
    .vector_search(query_embedding)?
    .column(EMBEDDING_COLUMN)
    .distance_type(DistanceType::Cosine)
    .limit(limit)
    .execute()
    .await
    .map_err(|e| anyhow!("Vector search failed: {}", e))?
    .try_collect()
    .await
    .map_err(|e| anyhow!("Error reading search results: {}", e))?;

  let mut candidates = Vec::new();
  for batch in &batches {
    candidates.extend(process_result_batch(batch)?);
  }

  if candidates.is_empty() {
    tracing::debug!("No similar embeddings found");
  }
  Ok(candidates)
}

/// Fetch the stored record for one feedback id
pub async fn find_record(table: &Table, feedback_id: Uuid) -> Result<Option<EmbeddingRecord>> {
  let batches: Vec<RecordBatch> = table
    .query()
    .only_if(feedback_filter(feedback_id))
    .limit(1)
    .execute()
    .await
    .map_err(|e| anyhow!("Lookup of {} failed: {}", feedback_id, e))?
    .try_collect()
    .await
    .map_err(|e| anyhow!("Error reading lookup results: {}", e))?;

  for batch in &batches {
    if let Some(record) = batch_to_records(batch)?.into_iter().next() {
      return Ok(Some(record));
    }
  }
  Ok(None)
}

/// SQL predicate selecting one feedback id
pub fn feedback_filter(feedback_id: Uuid) -> String {
  format!("{FEEDBACK_ID_COLUMN} = '{feedback_id}'")
}

fn process_result_batch(batch: &RecordBatch) -> Result<Vec<IndexMatch>> {
  let ids = string_column(batch, FEEDBACK_ID_COLUMN)?;
  let texts = string_column(batch, CONTEXT_TEXT_COLUMN)?;
  let distances = batch
    .column_by_name(DISTANCE_COLUMN)
    .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
    .ok_or_else(|| anyhow!("Missing '{}' column", DISTANCE_COLUMN))?;

  (0..batch.num_rows())
    .filter(|&row| !distances.is_null(row))
    .map(|row| {
      Ok(IndexMatch {
        feedback_id: parse_feedback_id(ids.value(row))?,
        similarity: distance_to_similarity(distances.value(row)),
        context_text: texts.value(row).to_string(),
      })
    })
    .collect()
}

/// Cosine distance is `1 - cosine similarity`
fn distance_to_similarity(distance: f32) -> f32 {
  snap_unit((1.0 - distance).clamp(-1.0, 1.0))
}
