//! Feedback ledger: append-mostly store of diagnostic text records
//!
//! Records are never deleted. The only in-place mutations are promotion of a
//! record to validated and flagging a record as superseded by a user edit.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::storage::{count_json_dir, read_json, read_json_dir, remove_if_exists, write_json_atomic};
use crate::server::models::FeedbackRecord;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackLedger: Send + Sync {
  /// Append a new record; fails if the id is already taken
  async fn insert(&self, record: FeedbackRecord) -> Result<FeedbackRecord>;

  async fn get(&self, id: Uuid) -> Result<Option<FeedbackRecord>>;

  /// Replace an existing record, refreshing `updated_at`. A stored
  /// supersession flag is never cleared by a stale copy.
  async fn update(&self, record: FeedbackRecord) -> Result<FeedbackRecord>;

  /// Flag `prior_id` as superseded and append `successor` as a single unit.
  /// Either both writes land or neither does. A prior without a photo is
  /// claimed for the successor's photo.
  async fn supersede(&self, prior_id: Uuid, successor: FeedbackRecord) -> Result<FeedbackRecord>;

  /// All records for a photo, oldest first
  async fn list_for_photo(&self, photo_id: &str) -> Result<Vec<FeedbackRecord>>;

  async fn count(&self) -> Result<usize>;
}

/// Ledger keeping one JSON document per record under a directory
pub struct FileFeedbackLedger {
  dir: PathBuf,
  write_lock: Mutex<()>,
}

impl FileFeedbackLedger {
  pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
    let dir = dir.into();
    tokio::fs::create_dir_all(&dir).await?;
    Ok(Self { dir, write_lock: Mutex::new(()) })
  }

  fn record_path(&self, id: Uuid) -> PathBuf {
    self.dir.join(format!("{id}.json"))
  }

  async fn load(&self, id: Uuid) -> Result<FeedbackRecord> {
    read_json(&self.record_path(id)).await?.ok_or_else(|| anyhow!("Feedback record {id} not found"))
  }
}

#[async_trait]
impl FeedbackLedger for FileFeedbackLedger {
  async fn insert(&self, record: FeedbackRecord) -> Result<FeedbackRecord> {
    let _guard = self.write_lock.lock().await;
    let path = self.record_path(record.id);
    if path.exists() {
      return Err(anyhow!("Feedback record {} already exists", record.id));
    }

    write_json_atomic(&path, &record).await?;
    tracing::debug!(feedback_id = %record.id, origin = %record.origin, "Inserted feedback record");
    Ok(record)
  }

  async fn get(&self, id: Uuid) -> Result<Option<FeedbackRecord>> {
    read_json(&self.record_path(id)).await
  }

  async fn update(&self, mut record: FeedbackRecord) -> Result<FeedbackRecord> {
    let _guard = self.write_lock.lock().await;
    let stored = self.load(record.id).await?;

    if stored.is_superseded() {
      record.metadata.superseded_by_user = true;
    }
    record.updated_at = Utc::now();
    write_json_atomic(&self.record_path(record.id), &record).await?;
    tracing::debug!(feedback_id = %record.id, "Updated feedback record");
    Ok(record)
  }

  async fn supersede(&self, prior_id: Uuid, successor: FeedbackRecord) -> Result<FeedbackRecord> {
    let _guard = self.write_lock.lock().await;
    let mut prior = self.load(prior_id).await?;

    match (prior.photo_id.as_deref(), successor.photo_id.as_deref()) {
      (Some(prior_photo), Some(photo)) if prior_photo != photo => {
        return Err(anyhow!("Feedback record {prior_id} belongs to photo {prior_photo}, not {photo}"));
      }
      (None, Some(_)) => prior.photo_id = successor.photo_id.clone(),
      _ => {}
    }

    let successor_path = self.record_path(successor.id);
    if successor_path.exists() {
      return Err(anyhow!("Feedback record {} already exists", successor.id));
    }
    write_json_atomic(&successor_path, &successor).await?;

    prior.metadata.superseded_by_user = true;
    prior.updated_at = Utc::now();
    if let Err(e) = write_json_atomic(&self.record_path(prior_id), &prior).await {
      if let Err(rollback) = remove_if_exists(&successor_path).await {
        tracing::error!(feedback_id = %successor.id, "Failed to roll back successor: {}", rollback);
      }
      return Err(e.context(format!("Failed to mark {prior_id} as superseded")));
    }

    tracing::debug!(
      feedback_id = %successor.id,
      parent_feedback_id = %prior_id,
      "Superseded feedback record"
    );
    Ok(successor)
  }

  async fn list_for_photo(&self, photo_id: &str) -> Result<Vec<FeedbackRecord>> {
    let mut records: Vec<FeedbackRecord> = read_json_dir(&self.dir).await?;
    records.retain(|record| record.photo_id.as_deref() == Some(photo_id));
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(records)
  }

  async fn count(&self) -> Result<usize> {
    count_json_dir(&self.dir).await
  }
}
