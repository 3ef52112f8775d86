//! Table management operations for LanceDB

use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatchIterator;
use lancedb::{Connection, Table};

use super::records::record_to_batch;
use super::search::feedback_filter;
use crate::server::services::similarity_index::EmbeddingRecord;

/// Table manager for LanceDB operations
pub struct TableManager {
  connection: Connection,
  table_name: String,
}

impl TableManager {
  pub fn new(connection: Connection, table_name: impl Into<String>) -> Self {
    Self { connection, table_name: table_name.into() }
  }

  /// Check if the target table exists
  pub async fn table_exists(&self) -> Result<bool> {
    let tables = self
      .connection
      .table_names()
      .execute()
      .await
      .map_err(|e| anyhow!("Failed to list tables: {}", e))?;
    Ok(tables.contains(&self.table_name))
  }

  /// Get the table instance, or `None` before the first write
  pub async fn open_table(&self) -> Result<Option<Table>> {
    if !self.table_exists().await? {
      return Ok(None);
    }

    let table = self
      .connection
      .open_table(&self.table_name)
      .execute()
      .await
      .map_err(|e| anyhow!("Failed to open table '{}': {}", self.table_name, e))?;
    Ok(Some(table))
  }

  /// Replace any row for the record's feedback id with the new record
  pub async fn upsert_record(&self, record: &EmbeddingRecord) -> Result<()> {
    let batch = record_to_batch(record)?;
    let schema = batch.schema();
    let batch_iter = RecordBatchIterator::new(vec![Ok(batch)], schema);

    match self.open_table().await? {
      Some(table) => {
        table
          .delete(&feedback_filter(record.feedback_id))
          .await
          .map_err(|e| anyhow!("Failed to delete previous embedding: {}", e))?;
        table
          .add(batch_iter)
          .execute()
          .await
          .map_err(|e| anyhow!("Failed to store embedding: {}", e))?;
      }
      None => {
        self
          .connection
          .create_table(&self.table_name, batch_iter)
          .execute()
          .await
          .map_err(|e| anyhow!("Failed to create table with first record: {}", e))?;
        tracing::info!(
          "Created table '{}' with {} dimensions",
          self.table_name,
          record.vector.len()
        );
      }
    }

    tracing::debug!(feedback_id = %record.feedback_id, "Stored embedding in LanceDB");
    Ok(())
  }

  pub async fn count_rows(&self) -> Result<usize> {
    match self.open_table().await? {
      Some(table) => Ok(table.count_rows(None).await?),
      None => Ok(0),
    }
  }
}
