//! Text embeddings through the remote embedding model
//!
//! The `Embedder` trait is the seam the generator and the reconciler depend
//! on; `OpenAiEmbedder` is the production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::openai::OpenAiClient;
use crate::server::error::DiagnosisError;

const SERVICE: &str = "embeddings";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Map text to a fixed-length vector. Identical text yields identical vectors.
  async fn embed(&self, text: &str) -> Result<Vec<f32>, DiagnosisError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  input: &'a str,
  model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
  client: OpenAiClient,
  model: String,
}

impl OpenAiEmbedder {
  pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
    Self { client, model: model.into() }
  }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, DiagnosisError> {
    let request = EmbeddingRequest { input: text, model: &self.model };
    let response: EmbeddingResponse =
      self.client.post_json(SERVICE, "embeddings", &request).await?;

    let embedding = response
      .data
      .into_iter()
      .next()
      .map(|data| data.embedding)
      .filter(|embedding| !embedding.is_empty())
      .ok_or_else(|| DiagnosisError::upstream(SERVICE, "response contained no embedding"))?;

    tracing::debug!("Embedded {} chars into {} dimensions", text.len(), embedding.len());
    Ok(embedding)
  }
}

/// Cosine similarity in [-1, 1]; mismatched or zero-magnitude vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    tracing::warn!("Embedding dimension mismatch: {} vs {}", a.len(), b.len());
    return 0.0;
  }

  if a.is_empty() {
    return 0.0;
  }

  // f64 accumulation keeps long vectors from drifting below 1.0 against themselves
  let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
  let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
  let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }

  snap_unit((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32)
}

/// Rounding slack allowed when comparing similarities against a floor
pub const SIMILARITY_EPSILON: f32 = 1e-6;

/// Treat values within rounding of 1.0 as an exact match
pub fn snap_unit(similarity: f32) -> f32 {
  if (1.0 - similarity).abs() <= SIMILARITY_EPSILON {
    1.0
  } else {
    similarity
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::{Matcher, Server};
  use reqwest::Client;
  use serde_json::json;
  use std::time::Duration;

  fn embedder_for(server: &Server) -> OpenAiEmbedder {
    let client = OpenAiClient::new(Client::new(), server.url(), "sk-test", Duration::from_secs(5));
    OpenAiEmbedder::new(client, "text-embedding-3-large")
  }

  #[test]
  fn test_cosine_similarity_identical_vectors() {
    let a = vec![1.0, 2.0, 3.0];
    assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn test_cosine_similarity_self_is_exactly_one() {
    let short = vec![0.1, 0.2, 0.3];
    let odd = vec![0.123, -0.456, 0.789, 0.0101, 0.33];
    let long: Vec<f32> = (0..3072).map(|i| ((i as f32) * 0.37).sin() * 0.021).collect();
    for v in [short, odd, long] {
      assert_eq!(cosine_similarity(&v, &v), 1.0);
    }
  }

  #[test]
  fn test_cosine_similarity_orthogonal_and_opposite() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
  }

  #[test]
  fn test_cosine_similarity_degenerate_inputs() {
    assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
  }

  #[tokio::test]
  async fn test_embed_posts_model_and_input() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/embeddings")
      .match_body(Matcher::PartialJson(json!({
        "model": "text-embedding-3-large",
        "input": "Environment: Garage"
      })))
      .with_status(200)
      .with_body(r#"{"data": [{"embedding": [0.1, 0.2, 0.3]}]}"#)
      .create_async()
      .await;

    let embedding = embedder_for(&server).embed("Environment: Garage").await.unwrap();
    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
  }

  #[tokio::test]
  async fn test_embed_rejects_empty_response() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/embeddings")
      .with_status(200)
      .with_body(r#"{"data": []}"#)
      .create_async()
      .await;

    let error = embedder_for(&server).embed("text").await.unwrap_err();
    assert_eq!(error.key(), "upstream_error");
  }
}
