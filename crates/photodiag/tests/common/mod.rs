//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use photodiag::server::error::DiagnosisError;
use photodiag::server::models::DiagnosticContext;
use photodiag::server::services::embeddings::Embedder;
use photodiag::server::services::generator::{DiagnosisGenerator, GenerateDiagnosisRequest};
use photodiag::server::services::grounding::{RetrievalGrounding, RetrievalSettings};
use photodiag::server::services::ledger::{FeedbackLedger, FileFeedbackLedger};
use photodiag::server::services::reconciler::{ValidatedDescription, ValidationReconciler};
use photodiag::server::services::similarity_index::{FileSimilarityIndex, SimilarityIndex};
use photodiag::server::services::vision::{DiagnosisPrompt, PhotoFetcher, VisionModel};

/// Words that carry meaning for the keyword embedder
const VOCABULARY: &[&str] = &[
  "kitchen", "bathroom", "facade", "structure", "plumbing", "electrical", "beam", "wall", "pipe",
  "crack", "moisture", "corrosion", "leak", "spalling",
];

const NOISE_DIMS: usize = 4;
const NOISE_WEIGHT: f32 = 0.05;

/// One-pixel JPEG header bytes, base64 encoded
pub const TINY_JPEG_BASE64: &str = "/9j/4AAQSkZJRgABAQ==";

/// Deterministic bag-of-keywords embedder.
///
/// Each vocabulary word owns a dimension; every other word lands in a few
/// low-weight buckets so unrelated text is never exactly orthogonal.
#[derive(Default)]
pub struct KeywordEmbedder {
  pub calls: Mutex<Vec<String>>,
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
  let mut vector = vec![0.0; VOCABULARY.len() + NOISE_DIMS];
  for word in text.split(|c: char| !c.is_alphanumeric()).filter(|word| !word.is_empty()) {
    let word = word.to_lowercase();
    match VOCABULARY.iter().position(|keyword| *keyword == word) {
      Some(dim) => vector[dim] = 1.0,
      None => {
        let bucket = word.bytes().map(usize::from).sum::<usize>() % NOISE_DIMS;
        vector[VOCABULARY.len() + bucket] += NOISE_WEIGHT;
      }
    }
  }
  vector
}

#[async_trait]
impl Embedder for KeywordEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, DiagnosisError> {
    self.calls.lock().unwrap().push(text.to_string());
    Ok(keyword_vector(text))
  }
}

/// Embedder that is always down
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>, DiagnosisError> {
    Err(DiagnosisError::upstream_retryable("embeddings", "timed out after 20s"))
  }
}

/// Vision model answering with a fixed reply and recording its prompts
pub struct ScriptedModel {
  reply: Result<String, DiagnosisError>,
  pub prompts: Mutex<Vec<DiagnosisPrompt>>,
}

impl ScriptedModel {
  pub fn replying(reply: &str) -> Self {
    Self { reply: Ok(reply.to_string()), prompts: Mutex::new(Vec::new()) }
  }

  pub fn failing(error: DiagnosisError) -> Self {
    Self { reply: Err(error), prompts: Mutex::new(Vec::new()) }
  }

  pub fn last_prompt(&self) -> Option<DiagnosisPrompt> {
    self.prompts.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl VisionModel for ScriptedModel {
  fn model_name(&self) -> String {
    "scripted-vision".to_string()
  }

  async fn complete(&self, prompt: &DiagnosisPrompt) -> Result<String, DiagnosisError> {
    self.prompts.lock().unwrap().push(prompt.clone());
    self.reply.clone()
  }
}

/// File-backed stores rooted in a temporary directory
pub struct Stores {
  pub temp: TempDir,
  pub ledger: Arc<dyn FeedbackLedger>,
  pub index: Arc<dyn SimilarityIndex>,
}

impl Stores {
  pub async fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let ledger: Arc<dyn FeedbackLedger> =
      Arc::new(FileFeedbackLedger::open(temp.path().join("feedback")).await.unwrap());
    let index: Arc<dyn SimilarityIndex> =
      Arc::new(FileSimilarityIndex::open(temp.path().join("embeddings")).await.unwrap());
    Self { temp, ledger, index }
  }

  pub fn reconciler(&self, embedder: Arc<dyn Embedder>) -> ValidationReconciler {
    ValidationReconciler::new(self.ledger.clone(), self.index.clone(), embedder)
  }

  pub fn generator(&self, embedder: Arc<dyn Embedder>, model: Arc<dyn VisionModel>) -> DiagnosisGenerator {
    let grounding =
      RetrievalGrounding::new(self.index.clone(), self.ledger.clone(), RetrievalSettings::default());
    DiagnosisGenerator::new(
      embedder,
      model,
      PhotoFetcher::new(reqwest::Client::new(), Duration::from_secs(2)),
      grounding,
      self.ledger.clone(),
    )
  }
}

pub fn kitchen_beam() -> DiagnosticContext {
  DiagnosticContext {
    environment: Some("Kitchen".to_string()),
    system: Some("Structure".to_string()),
    element: Some("Beam".to_string()),
    ..Default::default()
  }
}

pub fn validated(photo_id: &str, text: &str, context: DiagnosticContext) -> ValidatedDescription {
  ValidatedDescription {
    photo_id: Some(photo_id.to_string()),
    final_text: Some(text.to_string()),
    context,
    ..Default::default()
  }
}

pub fn generate_request(photo_id: &str, context: DiagnosticContext) -> GenerateDiagnosisRequest {
  GenerateDiagnosisRequest {
    photo_id: Some(photo_id.to_string()),
    image_base64: Some(TINY_JPEG_BASE64.to_string()),
    context,
    ..Default::default()
  }
}
