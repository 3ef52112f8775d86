//! Grounded generation end to end with scripted models

mod common;

use std::sync::Arc;

use common::{
  generate_request, kitchen_beam, validated, FailingEmbedder, KeywordEmbedder, ScriptedModel, Stores,
};
use photodiag::server::error::DiagnosisError;
use photodiag::server::models::{Origin, Severity};
use photodiag::server::services::generator::{GenerateDiagnosisRequest, DETAILED_TEMPERATURE};

const MODEL_REPLY: &str = r#"{"description":"Hairline crack on the beam soffit","defectTags":["crack"],"severity":"High","recommendations":"Monitor crack width","confidence":0.8}"#;

#[tokio::test]
async fn test_empty_index_generates_ungrounded_description() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let suggestion = generator.generate(generate_request("p1", kitchen_beam())).await.unwrap();

  assert!(suggestion.exemplars.is_empty());
  assert_eq!(suggestion.description, "Hairline crack on the beam soffit");
  assert_eq!(suggestion.summary.severity, Severity::High);
  assert_eq!(suggestion.summary.defect_tags, vec!["crack".to_string()]);

  let prompt = model.last_prompt().unwrap();
  assert!(prompt.user_text.contains("No validated examples"));
  assert!(prompt.user_text.contains("Environment: Kitchen | System: Structure | Element: Beam"));
  assert!(prompt.image_url.unwrap().starts_with("data:image/jpeg;base64,"));

  let audit = stores.ledger.get(suggestion.feedback_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(audit.origin, Origin::Ai);
  assert!(!audit.validated);
  assert_eq!(audit.confidence, Some(0.8));
  assert_eq!(audit.metadata.model.as_deref(), Some("scripted-vision"));
  assert!(audit.metadata.exemplars_used.is_empty());
  assert_eq!(stores.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_validated_descriptions_ground_next_generation() {
  let stores = Stores::new().await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));
  let first = reconciler
    .record(validated("p1", "Hairline crack along the beam", kitchen_beam()))
    .await
    .unwrap();
  let second = reconciler
    .record(validated("p2", "Crack with moisture staining on the beam", kitchen_beam()))
    .await
    .unwrap();

  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());
  let suggestion = generator.generate(generate_request("p3", kitchen_beam())).await.unwrap();

  let ids: Vec<_> = suggestion.exemplars.iter().map(|exemplar| exemplar.feedback_id).collect();
  assert_eq!(ids, vec![first.feedback_id, second.feedback_id]);
  assert!(suggestion.exemplars[0].similarity >= suggestion.exemplars[1].similarity);

  let prompt = model.last_prompt().unwrap();
  let first_pos = prompt.user_text.find("EXAMPLE 1 (similarity").unwrap();
  let second_pos = prompt.user_text.find("EXAMPLE 2 (similarity").unwrap();
  assert!(first_pos < second_pos);
  assert!(prompt.user_text.contains("Hairline crack along the beam"));

  let audit = stores.ledger.get(suggestion.feedback_id.unwrap()).await.unwrap().unwrap();
  let used: Vec<_> = audit.metadata.exemplars_used.iter().map(|usage| usage.id).collect();
  assert_eq!(used, ids);
}

#[tokio::test]
async fn test_non_conforming_output_degrades_to_defaults() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying("The beam shows a fine crack near midspan."));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model);

  let suggestion = generator.generate(generate_request("p1", kitchen_beam())).await.unwrap();

  assert_eq!(suggestion.description, "The beam shows a fine crack near midspan.");
  assert_eq!(suggestion.summary.severity, Severity::Medium);
  assert_eq!(suggestion.summary.confidence, 0.5);
  assert!(suggestion.summary.defect_tags.is_empty());
  assert!(suggestion.feedback_id.is_some());
}

#[tokio::test]
async fn test_model_failure_persists_nothing() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::failing(DiagnosisError::upstream_retryable(
    "chat completion",
    "timed out after 20s",
  )));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model);

  let error = generator.generate(generate_request("p1", kitchen_beam())).await.unwrap_err();

  assert!(error.is_retryable());
  assert_eq!(stores.ledger.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_embedding_failure_aborts_before_model_call() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(FailingEmbedder), model.clone());

  let error = generator.generate(generate_request("p1", kitchen_beam())).await.unwrap_err();

  assert!(matches!(error, DiagnosisError::Upstream { .. }));
  assert!(model.last_prompt().is_none());
  assert_eq!(stores.ledger.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_photo_is_rejected() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let request = GenerateDiagnosisRequest { photo_id: Some("p1".to_string()), ..Default::default() };
  let error = generator.generate(request).await.unwrap_err();

  assert!(matches!(error, DiagnosisError::Validation { .. }));
  assert!(model.last_prompt().is_none());
}

#[tokio::test]
async fn test_remote_photo_is_inlined() {
  let mut server = mockito::Server::new_async().await;
  server
    .mock("GET", "/photos/p1.png")
    .with_status(200)
    .with_header("content-type", "image/png")
    .with_body([0x89, b'P', b'N', b'G'])
    .create_async()
    .await;

  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let request = GenerateDiagnosisRequest {
    photo_id: Some("p1".to_string()),
    photo_url: Some(format!("{}/photos/p1.png", server.url())),
    context: kitchen_beam(),
    ..Default::default()
  };
  generator.generate(request).await.unwrap();

  let image_url = model.last_prompt().unwrap().image_url.unwrap();
  assert_eq!(image_url, "data:image/png;base64,iVBORw==");
}

#[tokio::test]
async fn test_unreachable_photo_falls_back_to_text_prompt() {
  let mut server = mockito::Server::new_async().await;
  server.mock("GET", "/photos/missing.jpg").with_status(404).create_async().await;

  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let mut context = kitchen_beam();
  context.mode = Some("Detailed".to_string());
  let request = GenerateDiagnosisRequest {
    photo_url: Some(format!("{}/photos/missing.jpg", server.url())),
    context,
    ..Default::default()
  };
  let suggestion = generator.generate(request).await.unwrap();

  let prompt = model.last_prompt().unwrap();
  assert!(prompt.image_url.is_none());
  assert!(prompt.user_text.contains("could not be loaded"));
  assert_eq!(prompt.temperature, DETAILED_TEMPERATURE);
  assert!(!suggestion.description.is_empty());
}

#[tokio::test]
async fn test_line_wrapped_inline_photo_is_used() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let request = GenerateDiagnosisRequest {
    image_base64: Some("/9j/4AAQ\nSkZJRgABAQ==\n".to_string()),
    ..generate_request("p1", kitchen_beam())
  };
  generator.generate(request).await.unwrap();

  let prompt = model.last_prompt().unwrap();
  assert_eq!(prompt.image_url.as_deref(), Some("data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ=="));
}

#[tokio::test]
async fn test_undecodable_inline_photo_falls_back_to_text_prompt() {
  let stores = Stores::new().await;
  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());

  let request = GenerateDiagnosisRequest {
    image_base64: Some("not*base64".to_string()),
    ..generate_request("p1", kitchen_beam())
  };
  let suggestion = generator.generate(request).await.unwrap();

  let prompt = model.last_prompt().unwrap();
  assert!(prompt.image_url.is_none());
  assert!(prompt.user_text.contains("could not be loaded"));
  assert!(suggestion.feedback_id.is_some());
}
