//! Feedback ledger records and the summary values carried on them

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Confidence reported when the model gave none or gave garbage
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Who produced a record's description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
  Ai,
  User,
}

impl fmt::Display for Origin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Ai => write!(f, "ai"),
      Self::User => write!(f, "user"),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
  #[serde(alias = "low", alias = "LOW")]
  Low,
  #[default]
  #[serde(alias = "medium", alias = "MEDIUM")]
  Medium,
  #[serde(alias = "high", alias = "HIGH")]
  High,
  #[serde(alias = "critical", alias = "CRITICAL")]
  Critical,
}

impl FromStr for Severity {
  type Err = String;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.trim().to_lowercase().as_str() {
      "low" => Ok(Self::Low),
      "medium" => Ok(Self::Medium),
      "high" => Ok(Self::High),
      "critical" => Ok(Self::Critical),
      other => Err(format!("unknown severity '{other}'")),
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::Low => "Low",
      Self::Medium => "Medium",
      Self::High => "High",
      Self::Critical => "Critical",
    };
    write!(f, "{label}")
  }
}

/// Structured part of a generated diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSummary {
  pub defect_tags: Vec<String>,
  pub severity: Severity,
  pub recommendations: String,
  pub confidence: f32,
}

/// Summary fields a caller may send back when validating a description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryUpdate {
  #[serde(default)]
  pub defect_tags: Option<Vec<String>>,
  #[serde(default)]
  pub severity: Option<Severity>,
  #[serde(default)]
  pub recommendations: Option<String>,
  #[serde(default)]
  pub confidence: Option<f32>,
}

/// Exemplar reference kept on an audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExemplarUse {
  pub id: Uuid,
  pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedbackMetadata {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub severity: Option<Severity>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub recommendations: Option<String>,
  /// Set on an AI record once a human replaced its text with an edited child
  pub superseded_by_user: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context_summary: Option<String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub context_fields: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub exemplars_used: Vec<ExemplarUse>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
}

/// Identifiers tying a record to the photo it describes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordScope {
  pub photo_id: Option<String>,
  pub group_id: Option<String>,
  pub inspection_id: Option<String>,
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
  pub id: Uuid,
  pub photo_id: Option<String>,
  pub group_id: Option<String>,
  pub inspection_id: Option<String>,
  pub user_id: Option<String>,
  pub description: String,
  pub origin: Origin,
  pub validated: bool,
  /// Present only on records whose origin is `ai`
  pub confidence: Option<f32>,
  pub tags: Vec<String>,
  pub parent_feedback_id: Option<Uuid>,
  pub metadata: FeedbackMetadata,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
  /// Unvalidated audit record of a model generation
  pub fn ai_draft(
    scope: RecordScope,
    description: String,
    summary: &DiagnosisSummary,
    metadata: FeedbackMetadata,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      photo_id: scope.photo_id,
      group_id: scope.group_id,
      inspection_id: scope.inspection_id,
      user_id: scope.user_id,
      description,
      origin: Origin::Ai,
      validated: false,
      confidence: Some(clamp_confidence(summary.confidence)),
      tags: normalize_tags(summary.defect_tags.clone()),
      parent_feedback_id: None,
      metadata,
      created_at: now,
      updated_at: now,
    }
  }

  /// Human-validated record, optionally descending from `parent`
  pub fn user_validated(
    scope: RecordScope,
    description: String,
    tags: Vec<String>,
    parent: Option<&FeedbackRecord>,
    metadata: FeedbackMetadata,
  ) -> Self {
    let mut created_at = Utc::now();
    if let Some(parent) = parent {
      // Children must sort strictly after their parent
      if created_at <= parent.created_at {
        created_at = parent.created_at + Duration::microseconds(1);
      }
    }

    Self {
      id: Uuid::new_v4(),
      photo_id: scope.photo_id,
      group_id: scope.group_id,
      inspection_id: scope.inspection_id,
      user_id: scope.user_id,
      description,
      origin: Origin::User,
      validated: true,
      confidence: None,
      tags: normalize_tags(tags),
      parent_feedback_id: parent.map(|parent| parent.id),
      metadata,
      created_at,
      updated_at: created_at,
    }
  }

  pub fn is_superseded(&self) -> bool {
    self.metadata.superseded_by_user
  }
}

/// Clamp into [0, 1]; non-finite values fall back to the default
pub fn clamp_confidence(value: f32) -> f32 {
  if value.is_finite() {
    value.clamp(0.0, 1.0)
  } else {
    DEFAULT_CONFIDENCE
  }
}

/// Trim labels, drop blanks and case-insensitive duplicates, keep first-seen order
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
  let mut seen = HashSet::new();
  tags
    .into_iter()
    .map(|tag| tag.trim().to_string())
    .filter(|tag| !tag.is_empty() && seen.insert(tag.to_lowercase()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn summary(confidence: f32) -> DiagnosisSummary {
    DiagnosisSummary {
      defect_tags: vec!["crack".to_string(), " Crack ".to_string(), "".to_string()],
      severity: Severity::High,
      recommendations: "Seal the crack".to_string(),
      confidence,
    }
  }

  #[test]
  fn test_ai_draft_carries_clamped_confidence() {
    let record = FeedbackRecord::ai_draft(
      RecordScope::default(),
      "Diagonal crack".to_string(),
      &summary(1.7),
      FeedbackMetadata::default(),
    );
    assert_eq!(record.origin, Origin::Ai);
    assert!(!record.validated);
    assert_eq!(record.confidence, Some(1.0));
    assert_eq!(record.tags, vec!["crack".to_string()]);
  }

  #[test]
  fn test_user_record_has_no_confidence_and_follows_parent() {
    let parent = FeedbackRecord::ai_draft(
      RecordScope { photo_id: Some("p1".to_string()), ..Default::default() },
      "draft".to_string(),
      &summary(0.4),
      FeedbackMetadata::default(),
    );
    let child = FeedbackRecord::user_validated(
      RecordScope { photo_id: Some("p1".to_string()), ..Default::default() },
      "final".to_string(),
      vec![],
      Some(&parent),
      FeedbackMetadata::default(),
    );

    assert_eq!(child.origin, Origin::User);
    assert!(child.validated);
    assert_eq!(child.confidence, None);
    assert_eq!(child.parent_feedback_id, Some(parent.id));
    assert!(child.created_at > parent.created_at);
  }

  #[test]
  fn test_clamp_confidence() {
    assert_eq!(clamp_confidence(-0.2), 0.0);
    assert_eq!(clamp_confidence(0.42), 0.42);
    assert_eq!(clamp_confidence(f32::NAN), DEFAULT_CONFIDENCE);
  }

  #[test]
  fn test_severity_parsing() {
    assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
    assert_eq!(" Medium ".parse::<Severity>(), Ok(Severity::Medium));
    assert!("severe".parse::<Severity>().is_err());

    let parsed: Severity = serde_json::from_str("\"high\"").unwrap();
    assert_eq!(parsed, Severity::High);
    assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"Low\"");
  }

  #[test]
  fn test_metadata_defaults_when_missing() {
    let metadata: FeedbackMetadata = serde_json::from_str("{}").unwrap();
    assert!(!metadata.superseded_by_user);
    assert!(metadata.exemplars_used.is_empty());
  }
}
