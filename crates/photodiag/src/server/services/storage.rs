//! JSON document helpers for the file-backed stores

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Write `value` next to `path` and rename it into place, so readers never
/// observe a half-written document
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let parent = path.parent().ok_or_else(|| anyhow!("No parent directory for {}", path.display()))?;
  fs::create_dir_all(parent)
    .await
    .with_context(|| format!("Failed to create directory {}", parent.display()))?;

  let content = serde_json::to_vec_pretty(value)?;
  let temp_path = temp_path_for(path);
  fs::write(&temp_path, content)
    .await
    .with_context(|| format!("Failed to write {}", temp_path.display()))?;
  fs::rename(&temp_path, path)
    .await
    .with_context(|| format!("Failed to move {} into place", path.display()))?;
  Ok(())
}

/// Read one document; a missing file is `None`
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  match fs::read(path).await {
    Ok(content) => {
      let value = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
      Ok(Some(value))
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(anyhow!("Failed to read {}: {}", path.display(), e)),
  }
}

/// Read every `*.json` document in `dir`. Unparseable documents are skipped
/// with a warning rather than failing the whole scan.
pub async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
  let mut documents = Vec::new();
  let mut entries = match fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(documents),
    Err(e) => return Err(anyhow!("Failed to list {}: {}", dir.display(), e)),
  };

  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
      continue;
    }

    match read_json::<T>(&path).await {
      Ok(Some(document)) => documents.push(document),
      Ok(None) => {}
      Err(e) => tracing::warn!("Skipping unreadable document {}: {}", path.display(), e),
    }
  }

  Ok(documents)
}

/// Count `*.json` documents without parsing them
pub async fn count_json_dir(dir: &Path) -> Result<usize> {
  let mut count = 0;
  let mut entries = match fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
    Err(e) => return Err(anyhow!("Failed to list {}: {}", dir.display(), e)),
  };

  while let Some(entry) = entries.next_entry().await? {
    if entry.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
      count += 1;
    }
  }
  Ok(count)
}

pub async fn remove_if_exists(path: &Path) -> Result<()> {
  match fs::remove_file(path).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(anyhow!("Failed to remove {}: {}", path.display(), e)),
  }
}

fn temp_path_for(path: &Path) -> PathBuf {
  path.with_extension("json.tmp")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;
  use tempfile::TempDir;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Doc {
    name: String,
  }

  #[tokio::test]
  async fn test_write_then_read() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("a.json");

    write_json_atomic(&path, &Doc { name: "a".to_string() }).await.unwrap();

    let doc: Option<Doc> = read_json(&path).await.unwrap();
    assert_eq!(doc, Some(Doc { name: "a".to_string() }));
    assert!(!temp_path_for(&path).exists());
  }

  #[tokio::test]
  async fn test_read_missing_is_none() {
    let temp = TempDir::new().unwrap();
    let doc: Option<Doc> = read_json(&temp.path().join("missing.json")).await.unwrap();
    assert!(doc.is_none());
  }

  #[tokio::test]
  async fn test_dir_scan_skips_foreign_and_broken_files() {
    let temp = TempDir::new().unwrap();
    write_json_atomic(&temp.path().join("a.json"), &Doc { name: "a".to_string() }).await.unwrap();
    std::fs::write(temp.path().join("b.json"), "{broken").unwrap();
    std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

    let docs: Vec<Doc> = read_json_dir(temp.path()).await.unwrap();
    assert_eq!(docs, vec![Doc { name: "a".to_string() }]);
    assert_eq!(count_json_dir(temp.path()).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_missing_dir_is_empty() {
    let temp = TempDir::new().unwrap();
    let docs: Vec<Doc> = read_json_dir(&temp.path().join("none")).await.unwrap();
    assert!(docs.is_empty());
    assert_eq!(count_json_dir(&temp.path().join("none")).await.unwrap(), 0);
  }
}
