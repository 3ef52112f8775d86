//! Arrow RecordBatch conversion for embedding records

use anyhow::{anyhow, Result};
use arrow::array::{
  Array, ArrayRef, FixedSizeListArray, FixedSizeListBuilder, Float32Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use uuid::Uuid;

use crate::server::services::similarity_index::EmbeddingRecord;

pub const FEEDBACK_ID_COLUMN: &str = "feedback_id";
pub const CONTEXT_TEXT_COLUMN: &str = "context_text";
pub const EMBEDDING_COLUMN: &str = "embedding";
pub const DISTANCE_COLUMN: &str = "_distance";

/// Schema for a table whose vectors have `dimension` components
pub fn embedding_schema(dimension: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new(FEEDBACK_ID_COLUMN, DataType::Utf8, false),
    Field::new(CONTEXT_TEXT_COLUMN, DataType::Utf8, false),
    Field::new(
      EMBEDDING_COLUMN,
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
      false,
    ),
  ]))
}

/// Convert one record into a single-row batch
pub fn record_to_batch(record: &EmbeddingRecord) -> Result<RecordBatch> {
  let dimension = record.vector.len();
  if dimension == 0 {
    return Err(anyhow!("Cannot store an empty embedding for {}", record.feedback_id));
  }

  let ids = StringArray::from(vec![record.feedback_id.to_string()]);
  let texts = StringArray::from(vec![record.context_text.clone()]);

  let mut builder = FixedSizeListBuilder::new(Float32Array::builder(dimension), dimension as i32);
  for &value in &record.vector {
    builder.values().append_value(value);
  }
  builder.append(true);

  let columns: Vec<ArrayRef> = vec![Arc::new(ids), Arc::new(texts), Arc::new(builder.finish())];
  RecordBatch::try_new(embedding_schema(dimension), columns)
    .map_err(|e| anyhow!("Failed to create RecordBatch: {}", e))
}

/// Convert every row of a query batch back into records
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<EmbeddingRecord>> {
  let ids = string_column(batch, FEEDBACK_ID_COLUMN)?;
  let texts = string_column(batch, CONTEXT_TEXT_COLUMN)?;
  let vectors = batch
    .column_by_name(EMBEDDING_COLUMN)
    .ok_or_else(|| anyhow!("Missing '{}' column", EMBEDDING_COLUMN))?
    .as_any()
    .downcast_ref::<FixedSizeListArray>()
    .ok_or_else(|| anyhow!("Failed to cast '{}' column to FixedSizeListArray", EMBEDDING_COLUMN))?;

  (0..batch.num_rows())
    .map(|row| {
      let values = vectors.value(row);
      let floats = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow!("Embedding values are not Float32"))?;
      Ok(EmbeddingRecord {
        feedback_id: parse_feedback_id(ids.value(row))?,
        vector: floats.values().to_vec(),
        context_text: texts.value(row).to_string(),
      })
    })
    .collect()
}

/// Extract a string column from the batch
pub fn string_column<'a>(batch: &'a RecordBatch, column_name: &str) -> Result<&'a StringArray> {
  batch
    .column_by_name(column_name)
    .ok_or_else(|| anyhow!("Missing '{}' column", column_name))?
    .as_any()
    .downcast_ref::<StringArray>()
    .ok_or_else(|| anyhow!("Failed to cast '{}' column to StringArray", column_name))
}

pub fn parse_feedback_id(raw: &str) -> Result<Uuid> {
  Uuid::parse_str(raw).map_err(|e| anyhow!("Invalid feedback id '{}' in index: {}", raw, e))
}
