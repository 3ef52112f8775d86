//! Save transitions of validated descriptions against file-backed stores

mod common;

use std::sync::Arc;
use uuid::Uuid;

use common::{
  generate_request, kitchen_beam, validated, FailingEmbedder, KeywordEmbedder, ScriptedModel, Stores,
};
use photodiag::server::error::DiagnosisError;
use photodiag::server::models::{FeedbackRecord, Origin, Severity, SummaryUpdate};
use photodiag::server::services::generator::GenerateDiagnosisRequest;
use photodiag::server::services::reconciler::{SaveTransition, ValidatedDescription};

const MODEL_REPLY: &str = r#"{"description":"Hairline crack on the beam soffit","defectTags":["crack"],"severity":"High","recommendations":"Monitor crack width","confidence":0.8}"#;

/// Generate once for `photo_id` and return the stored AI audit record
async fn ai_draft(stores: &Stores, photo_id: &str) -> FeedbackRecord {
  let generator =
    stores.generator(Arc::new(KeywordEmbedder::default()), Arc::new(ScriptedModel::replying(MODEL_REPLY)));
  let suggestion = generator.generate(generate_request(photo_id, kitchen_beam())).await.unwrap();
  let feedback_id = suggestion.feedback_id.unwrap();
  stores.ledger.get(feedback_id).await.unwrap().unwrap()
}

fn accept(prior: &FeedbackRecord, text: &str, was_edited: Option<bool>) -> ValidatedDescription {
  ValidatedDescription {
    prior_feedback_id: Some(prior.id),
    was_edited,
    ..validated(prior.photo_id.as_deref().unwrap(), text, kitchen_beam())
  }
}

fn assert_confidence_invariant(records: &[FeedbackRecord]) {
  for record in records {
    match record.origin {
      Origin::User => assert_eq!(record.confidence, None, "user record {} has confidence", record.id),
      Origin::Ai => {
        let confidence = record.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
      }
    }
  }
}

#[tokio::test]
async fn test_insert_without_prior_creates_validated_user_record() {
  let stores = Stores::new().await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let mut request = validated("p1", "Exposed rebar with corrosion", kitchen_beam());
  request.summary = Some(SummaryUpdate {
    defect_tags: Some(vec!["corrosion".to_string()]),
    severity: Some(Severity::Critical),
    ..Default::default()
  });
  let outcome = reconciler.record(request).await.unwrap();

  assert_eq!(outcome.transition, SaveTransition::Insert);
  assert!(outcome.indexed);

  let record = stores.ledger.get(outcome.feedback_id).await.unwrap().unwrap();
  assert_eq!(record.origin, Origin::User);
  assert!(record.validated);
  assert_eq!(record.parent_feedback_id, None);
  assert_eq!(record.tags, vec!["corrosion".to_string()]);
  assert_eq!(record.metadata.severity, Some(Severity::Critical));

  let embedding = stores.index.get(outcome.feedback_id).await.unwrap().unwrap();
  assert!(embedding.context_text.ends_with("Exposed rebar with corrosion"));
  assert!(embedding.context_text.contains("Severity: Critical"));
}

#[tokio::test]
async fn test_promote_is_idempotent() {
  let stores = Stores::new().await;
  let prior = ai_draft(&stores, "p1").await;
  assert!(!prior.validated);
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let first = reconciler.record(accept(&prior, &prior.description, Some(false))).await.unwrap();
  let second = reconciler.record(accept(&prior, &prior.description, Some(false))).await.unwrap();

  assert_eq!(first.feedback_id, prior.id);
  assert_eq!(second.feedback_id, prior.id);
  assert_eq!(first.transition, SaveTransition::Promote(prior.id));
  assert_eq!(stores.ledger.count().await.unwrap(), 1);
  assert_eq!(stores.index.count().await.unwrap(), 1);

  let promoted = stores.ledger.get(prior.id).await.unwrap().unwrap();
  assert!(promoted.validated);
  assert_eq!(promoted.origin, Origin::Ai);
  assert_eq!(promoted.description, prior.description);
  assert!(!promoted.is_superseded());
}

#[tokio::test]
async fn test_missing_edit_flag_promotes() {
  let stores = Stores::new().await;
  let prior = ai_draft(&stores, "p1").await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let outcome = reconciler.record(accept(&prior, "Hairline crack, beam soffit", None)).await.unwrap();

  assert_eq!(outcome.transition, SaveTransition::Promote(prior.id));
  let promoted = stores.ledger.get(prior.id).await.unwrap().unwrap();
  assert_eq!(promoted.description, "Hairline crack, beam soffit");
}

#[tokio::test]
async fn test_edit_forks_and_supersedes_prior() {
  let stores = Stores::new().await;
  let prior = ai_draft(&stores, "p1").await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let outcome = reconciler
    .record(accept(&prior, "Diagonal shear crack near the beam support", Some(true)))
    .await
    .unwrap();

  assert_eq!(outcome.transition, SaveTransition::Fork(prior.id));
  assert_ne!(outcome.feedback_id, prior.id);

  let stored_prior = stores.ledger.get(prior.id).await.unwrap().unwrap();
  assert!(stored_prior.is_superseded());
  assert_eq!(stored_prior.description, prior.description);
  assert!(!stored_prior.validated);

  let child = stores.ledger.get(outcome.feedback_id).await.unwrap().unwrap();
  assert_eq!(child.origin, Origin::User);
  assert!(child.validated);
  assert_eq!(child.parent_feedback_id, Some(prior.id));
  assert!(child.created_at > stored_prior.created_at);
  assert_eq!(child.tags, prior.tags);

  assert!(stores.index.get(child.id).await.unwrap().is_some());
  assert!(stores.index.get(prior.id).await.unwrap().is_none());

  let history = stores.ledger.list_for_photo("p1").await.unwrap();
  let ids: Vec<Uuid> = history.iter().map(|record| record.id).collect();
  assert_eq!(ids, vec![prior.id, child.id]);
  assert_confidence_invariant(&history);
}

#[tokio::test]
async fn test_fork_of_photoless_draft_joins_photo_history() {
  let stores = Stores::new().await;
  let generator =
    stores.generator(Arc::new(KeywordEmbedder::default()), Arc::new(ScriptedModel::replying(MODEL_REPLY)));
  let request = GenerateDiagnosisRequest { photo_id: None, ..generate_request("p1", kitchen_beam()) };
  let draft_id = generator.generate(request).await.unwrap().feedback_id.unwrap();
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let outcome = reconciler
    .record(ValidatedDescription {
      prior_feedback_id: Some(draft_id),
      was_edited: Some(true),
      ..validated("p1", "Diagonal shear crack near the beam support", kitchen_beam())
    })
    .await
    .unwrap();

  let prior = stores.ledger.get(draft_id).await.unwrap().unwrap();
  let child = stores.ledger.get(outcome.feedback_id).await.unwrap().unwrap();
  assert_eq!(prior.photo_id, child.photo_id);
  assert!(prior.is_superseded());

  let ids: Vec<Uuid> =
    stores.ledger.list_for_photo("p1").await.unwrap().iter().map(|record| record.id).collect();
  assert_eq!(ids, vec![draft_id, child.id]);
}

#[tokio::test]
async fn test_superseded_draft_is_not_used_as_exemplar() {
  let stores = Stores::new().await;
  let prior = ai_draft(&stores, "p1").await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  // Promote first so the draft is indexed, then edit it
  reconciler.record(accept(&prior, &prior.description, Some(false))).await.unwrap();
  let fork = reconciler
    .record(accept(&prior, "Diagonal crack near the beam support", Some(true)))
    .await
    .unwrap();

  let model = Arc::new(ScriptedModel::replying(MODEL_REPLY));
  let generator = stores.generator(Arc::new(KeywordEmbedder::default()), model.clone());
  let suggestion = generator.generate(generate_request("p2", kitchen_beam())).await.unwrap();

  let ids: Vec<Uuid> = suggestion.exemplars.iter().map(|exemplar| exemplar.feedback_id).collect();
  assert_eq!(ids, vec![fork.feedback_id]);
}

#[tokio::test]
async fn test_confidence_follows_origin() {
  let stores = Stores::new().await;
  let promoted = ai_draft(&stores, "p1").await;
  let forked = ai_draft(&stores, "p2").await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let mut request = accept(&promoted, &promoted.description, Some(false));
  request.summary = Some(SummaryUpdate { confidence: Some(1.7), ..Default::default() });
  reconciler.record(request).await.unwrap();

  let mut request = accept(&forked, "Edited text about the beam crack", Some(true));
  request.summary = Some(SummaryUpdate { confidence: Some(0.9), ..Default::default() });
  reconciler.record(request).await.unwrap();

  reconciler.record(validated("p3", "Fresh description", kitchen_beam())).await.unwrap();

  let mut records = Vec::new();
  for photo_id in ["p1", "p2", "p3"] {
    records.extend(stores.ledger.list_for_photo(photo_id).await.unwrap());
  }
  assert_eq!(records.len(), 4);
  assert_confidence_invariant(&records);
  assert_eq!(stores.ledger.get(promoted.id).await.unwrap().unwrap().confidence, Some(1.0));
}

#[tokio::test]
async fn test_empty_final_text_touches_nothing() {
  let stores = Stores::new().await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  for text in ["", "   "] {
    let error = reconciler.record(validated("p1", text, kitchen_beam())).await.unwrap_err();
    assert!(matches!(error, DiagnosisError::Validation { .. }));
  }
  let error = reconciler
    .record(ValidatedDescription { final_text: Some("text".to_string()), ..Default::default() })
    .await
    .unwrap_err();
  assert!(matches!(error, DiagnosisError::Validation { .. }));

  assert_eq!(stores.ledger.count().await.unwrap(), 0);
  assert_eq!(stores.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_prior_must_exist_and_match_photo() {
  let stores = Stores::new().await;
  let prior = ai_draft(&stores, "p1").await;
  let reconciler = stores.reconciler(Arc::new(KeywordEmbedder::default()));

  let mut request = accept(&prior, "text", Some(true));
  request.prior_feedback_id = Some(Uuid::new_v4());
  assert!(matches!(reconciler.record(request).await, Err(DiagnosisError::Validation { .. })));

  let mut request = accept(&prior, "text", Some(false));
  request.photo_id = Some("p9".to_string());
  assert!(matches!(reconciler.record(request).await, Err(DiagnosisError::Validation { .. })));

  assert_eq!(stores.ledger.count().await.unwrap(), 1);
  assert!(!stores.ledger.get(prior.id).await.unwrap().unwrap().validated);
}

#[tokio::test]
async fn test_embedding_outage_still_saves_record() {
  let stores = Stores::new().await;
  let reconciler = stores.reconciler(Arc::new(FailingEmbedder));

  let outcome = reconciler.record(validated("p1", "Crack along the beam", kitchen_beam())).await.unwrap();

  assert!(!outcome.indexed);
  assert!(stores.ledger.get(outcome.feedback_id).await.unwrap().is_some());
  assert_eq!(stores.index.count().await.unwrap(), 0);
}
