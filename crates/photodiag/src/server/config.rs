//! Service configuration and credential resolution
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config.yaml` under the data root, then `PHOTODIAG_*` environment
//! overrides. The OpenAI credential is resolved per request so a rotated
//! settings file takes effect without a restart.

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::error::DiagnosisError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_EXEMPLAR_LIMIT: usize = 4;
pub const DEFAULT_SIMILARITY_FLOOR: f32 = 0.65;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

const CONFIG_FILE: &str = "config.yaml";
const SETTINGS_FILE: &str = "settings.json";
const SETTINGS_API_KEY: &str = "openai_api_key";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Fields that may wrap the key when it is stored as an object
const NESTED_KEY_FIELDS: [&str; 3] = ["value", "apiKey", "key"];

/// Which similarity index implementation backs retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
  #[default]
  File,
  Lancedb,
}

impl std::str::FromStr for IndexBackend {
  type Err = anyhow::Error;

  fn from_str(value: &str) -> Result<Self> {
    match value.trim().to_lowercase().as_str() {
      "file" => Ok(Self::File),
      "lancedb" => Ok(Self::Lancedb),
      other => Err(anyhow!("Unknown index backend '{other}' (expected 'file' or 'lancedb')")),
    }
  }
}

impl std::fmt::Display for IndexBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::File => write!(f, "file"),
      Self::Lancedb => write!(f, "lancedb"),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Directory holding the ledger, the index and optional config files
  #[serde(skip)]
  pub data_root: PathBuf,

  pub openai_base_url: String,
  pub chat_model: String,
  pub embedding_model: String,

  /// Bound for embedding and chat calls
  pub request_timeout_secs: u64,

  /// Bound for downloading the photo before inlining it
  pub photo_timeout_secs: u64,

  pub exemplar_limit: usize,
  pub similarity_floor: f32,
  pub index_backend: IndexBackend,

  /// Raw credential, normalized on use. Accepts the same shapes as the
  /// settings store.
  #[serde(rename = "apiKey", skip_serializing)]
  pub api_key: Option<Value>,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      data_root: PathBuf::from(".photodiag"),
      openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
      chat_model: DEFAULT_CHAT_MODEL.to_string(),
      embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
      request_timeout_secs: DEFAULT_TIMEOUT_SECS,
      photo_timeout_secs: DEFAULT_TIMEOUT_SECS,
      exemplar_limit: DEFAULT_EXEMPLAR_LIMIT,
      similarity_floor: DEFAULT_SIMILARITY_FLOOR,
      index_backend: IndexBackend::File,
      api_key: None,
    }
  }
}

impl ServiceConfig {
  /// Load configuration for the data root selected by the environment
  pub fn load() -> Result<Self> {
    let data_root = get_data_root()?;
    Self::load_from(&data_root)
  }

  pub fn load_from(data_root: &Path) -> Result<Self> {
    let mut config = read_config_file(&data_root.join(CONFIG_FILE))?.unwrap_or_default();
    config.data_root = data_root.to_path_buf();
    config.apply_env_overrides()?;
    Ok(config)
  }

  /// Defaults rooted at `data_root`, ignoring config files and environment
  pub fn for_data_root(data_root: impl Into<PathBuf>) -> Self {
    Self { data_root: data_root.into(), ..Self::default() }
  }

  fn apply_env_overrides(&mut self) -> Result<()> {
    if let Some(base_url) = env_value("PHOTODIAG_OPENAI_BASE_URL") {
      self.openai_base_url = base_url;
    }
    if let Some(model) = env_value("PHOTODIAG_CHAT_MODEL") {
      self.chat_model = model;
    }
    if let Some(model) = env_value("PHOTODIAG_EMBEDDING_MODEL") {
      self.embedding_model = model;
    }
    if let Some(timeout) = env_value("PHOTODIAG_TIMEOUT_SECS") {
      let secs: u64 =
        timeout.parse().with_context(|| format!("PHOTODIAG_TIMEOUT_SECS is not a number: {timeout}"))?;
      self.request_timeout_secs = secs;
      self.photo_timeout_secs = secs;
    }
    if let Some(backend) = env_value("PHOTODIAG_INDEX_BACKEND") {
      self.index_backend = backend.parse()?;
    }
    Ok(())
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn photo_timeout(&self) -> Duration {
    Duration::from_secs(self.photo_timeout_secs)
  }

  pub fn feedback_dir(&self) -> PathBuf {
    self.data_root.join("feedback")
  }

  pub fn embeddings_dir(&self) -> PathBuf {
    self.data_root.join("embeddings")
  }

  pub fn lancedb_dir(&self) -> PathBuf {
    self.data_root.join("lancedb")
  }

  pub fn settings_path(&self) -> PathBuf {
    self.data_root.join(SETTINGS_FILE)
  }

  /// Resolve the OpenAI credential: environment, then config file, then the
  /// settings store.
  pub fn resolve_api_key(&self) -> Result<String, DiagnosisError> {
    let from_env = env::var(API_KEY_ENV).ok().map(Value::String);
    let from_settings = read_setting(&self.settings_path(), SETTINGS_API_KEY);

    resolve_api_key([from_env, self.api_key.clone(), from_settings]).ok_or_else(|| {
      DiagnosisError::configuration(format!(
        "no OpenAI API key found in {API_KEY_ENV}, {CONFIG_FILE} or {SETTINGS_FILE}"
      ))
    })
  }
}

/// First candidate that normalizes to a usable key wins
pub fn resolve_api_key(candidates: impl IntoIterator<Item = Option<Value>>) -> Option<String> {
  candidates.into_iter().flatten().find_map(|candidate| normalize_api_key(&candidate))
}

/// Normalize a stored credential into a bare key.
///
/// Accepts a plain string, a JSON-encoded string (also double-encoded), or an
/// object nesting the key under `value`, `apiKey` or `key`. Anything else,
/// including blank strings, yields `None`.
pub fn normalize_api_key(value: &Value) -> Option<String> {
  match value {
    Value::String(raw) => normalize_key_text(raw),
    Value::Object(fields) => NESTED_KEY_FIELDS
      .iter()
      .filter_map(|field| fields.get(*field))
      .find_map(normalize_api_key),
    _ => None,
  }
}

fn normalize_key_text(raw: &str) -> Option<String> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match serde_json::from_str::<Value>(trimmed) {
    Ok(parsed) => normalize_api_key(&parsed),
    Err(_) => {
      let unquoted = strip_matching_quotes(trimmed).trim();
      (!unquoted.is_empty()).then(|| unquoted.to_string())
    }
  }
}

fn strip_matching_quotes(text: &str) -> &str {
  for quote in ['"', '\''] {
    if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
      return &text[1..text.len() - 1];
    }
  }
  text
}

/// Get the data root directory, honoring `PHOTODIAG_ROOT`
pub fn get_data_root() -> Result<PathBuf> {
  if let Some(custom_root) = env_value("PHOTODIAG_ROOT") {
    return Ok(PathBuf::from(custom_root));
  }

  let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
  Ok(home.join(".photodiag"))
}

fn env_value(name: &str) -> Option<String> {
  env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<Option<ServiceConfig>> {
  if !path.exists() {
    return Ok(None);
  }

  let content =
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  let config = serde_yaml::from_str(&content)
    .with_context(|| format!("Failed to parse {}", path.display()))?;
  Ok(Some(config))
}

fn read_setting(path: &Path, key: &str) -> Option<Value> {
  let content = fs::read_to_string(path).ok()?;
  match serde_json::from_str::<Value>(&content) {
    Ok(settings) => settings.get(key).cloned(),
    Err(e) => {
      tracing::warn!("Ignoring unreadable settings store {}: {}", path.display(), e);
      None
    }
  }
}
