//! LanceDB-backed similarity index
//!
//! Stores one row per feedback id in a single table and answers nearest
//! neighbor queries with LanceDB's cosine-distance vector search.

pub mod connection;
pub mod records;
pub mod search;
pub mod table_manager;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::server::services::similarity_index::{
  rank_matches, EmbeddingRecord, IndexMatch, SimilarityIndex,
};
use connection::create_connection;
use search::{find_record, search_candidates};
use table_manager::TableManager;

pub const EMBEDDINGS_TABLE: &str = "feedback_embeddings";

pub struct LanceDbSimilarityIndex {
  table_manager: TableManager,
  write_lock: Mutex<()>,
}

impl LanceDbSimilarityIndex {
  pub async fn open(data_dir: &Path) -> Result<Self> {
    let connection = create_connection(data_dir).await?;
    Ok(Self { table_manager: TableManager::new(connection, EMBEDDINGS_TABLE), write_lock: Mutex::new(()) })
  }
}

#[async_trait]
impl SimilarityIndex for LanceDbSimilarityIndex {
  async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    self.table_manager.upsert_record(&record).await
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

    match self.table_manager.open_table().await? {
      Some(table) => {
        let candidates = search_candidates(&table, query, limit).await?;
        Ok(rank_matches(candidates, limit, min_similarity))
      }
      None => Ok(Vec::new()),
    }
  }

  async fn get(&self, feedback_id: Uuid) -> Result<Option<EmbeddingRecord>> {
    match self.table_manager.open_table().await? {
      Some(table) => find_record(&table, feedback_id).await,
      None => Ok(None),
    }
  }

  async fn count(&self) -> Result<usize> {
    self.table_manager.count_rows().await
  }

  fn backend_name(&self) -> &'static str {
    "lancedb"
  }
}
