//! REST server startup and shared application state

use anyhow::{anyhow, Result};
use axum::{serve, Router};
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::server::config::{IndexBackend, ServiceConfig};
use crate::server::error::DiagnosisError;
use crate::server::routing::create_router;
use crate::server::services::embeddings::{Embedder, OpenAiEmbedder};
use crate::server::services::generator::DiagnosisGenerator;
use crate::server::services::grounding::{RetrievalGrounding, RetrievalSettings};
use crate::server::services::ledger::{FeedbackLedger, FileFeedbackLedger};
use crate::server::services::openai::OpenAiClient;
use crate::server::services::reconciler::ValidationReconciler;
use crate::server::services::similarity_index::{FileSimilarityIndex, SimilarityIndex};
use crate::server::services::vision::{OpenAiVisionModel, PhotoFetcher};

/// State shared by all handlers
pub struct AppState {
  pub config: ServiceConfig,
  pub ledger: Arc<dyn FeedbackLedger>,
  pub index: Arc<dyn SimilarityIndex>,
  http: Client,
}

impl AppState {
  pub fn new(
    config: ServiceConfig,
    ledger: Arc<dyn FeedbackLedger>,
    index: Arc<dyn SimilarityIndex>,
  ) -> Result<Self> {
    let http = Client::builder().build()?;
    Ok(Self { config, ledger, index, http })
  }

  /// Open the stores under the configured data root
  pub async fn open(config: ServiceConfig) -> Result<Self> {
    let ledger: Arc<dyn FeedbackLedger> =
      Arc::new(FileFeedbackLedger::open(config.feedback_dir()).await?);
    let index = open_index(&config).await?;
    tracing::info!(
      data_root = %config.data_root.display(),
      backend = index.backend_name(),
      "Opened feedback stores"
    );
    Self::new(config, ledger, index)
  }

  /// Credentials are resolved on every call so a rotated key is picked up
  fn openai_client(&self) -> Result<OpenAiClient, DiagnosisError> {
    let api_key = self.config.resolve_api_key()?;
    Ok(OpenAiClient::new(
      self.http.clone(),
      self.config.openai_base_url.clone(),
      api_key,
      self.config.request_timeout(),
    ))
  }

  fn embedder(&self, client: OpenAiClient) -> Arc<dyn Embedder> {
    Arc::new(OpenAiEmbedder::new(client, self.config.embedding_model.clone()))
  }

  fn retrieval_settings(&self) -> RetrievalSettings {
    RetrievalSettings {
      limit: self.config.exemplar_limit,
      min_similarity: self.config.similarity_floor,
    }
  }

  pub fn generator(&self) -> Result<DiagnosisGenerator, DiagnosisError> {
    let client = self.openai_client()?;
    let grounding =
      RetrievalGrounding::new(self.index.clone(), self.ledger.clone(), self.retrieval_settings());

    Ok(DiagnosisGenerator::new(
      self.embedder(client.clone()),
      Arc::new(OpenAiVisionModel::new(client, self.config.chat_model.clone())),
      PhotoFetcher::new(self.http.clone(), self.config.photo_timeout()),
      grounding,
      self.ledger.clone(),
    ))
  }

  pub fn reconciler(&self) -> Result<ValidationReconciler, DiagnosisError> {
    let client = self.openai_client()?;
    Ok(ValidationReconciler::new(self.ledger.clone(), self.index.clone(), self.embedder(client)))
  }
}

async fn open_index(config: &ServiceConfig) -> Result<Arc<dyn SimilarityIndex>> {
  match config.index_backend {
    IndexBackend::File => Ok(Arc::new(FileSimilarityIndex::open(config.embeddings_dir()).await?)),
    IndexBackend::Lancedb => open_lancedb_index(config).await,
  }
}

#[cfg(feature = "lancedb")]
async fn open_lancedb_index(config: &ServiceConfig) -> Result<Arc<dyn SimilarityIndex>> {
  use crate::server::services::lancedb::LanceDbSimilarityIndex;
  Ok(Arc::new(LanceDbSimilarityIndex::open(&config.lancedb_dir()).await?))
}

#[cfg(not(feature = "lancedb"))]
async fn open_lancedb_index(_config: &ServiceConfig) -> Result<Arc<dyn SimilarityIndex>> {
  Err(anyhow!("Index backend 'lancedb' requires building with the `lancedb` feature"))
}

/// Router with tracing and CORS layers applied
pub fn create_app(state: Arc<AppState>) -> Router {
  create_router(state).layer(
    ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()), // TODO: Restrict CORS origins for production deployments
  )
}

/// Start the REST server
#[cfg(not(tarpaulin_include))]
pub async fn start_server(addr: SocketAddr) -> Result<()> {
  let config = ServiceConfig::load()?;
  let state = Arc::new(AppState::open(config).await?);
  let app = create_app(state);

  let listener = TcpListener::bind(addr).await?;
  tracing::info!("Server listening on {addr}");

  match serve(listener, app).await {
    Ok(_) => {
      tracing::info!("Server shutdown gracefully");
      Ok(())
    }
    Err(e) => {
      tracing::error!("Server error: {}", e);
      Err(anyhow!("Server error: {}", e))
    }
  }
}
