//! Per-request diagnostic context and its text renderings

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::feedback::Severity;

/// Summary used when the caller supplied no context at all
pub const NO_CONTEXT: &str = "No context";

/// Analysis mode that asks for a longer, warmer generation
pub const DETAILED_MODE: &str = "detailed";

/// Structured context accompanying a photo. Never persisted on its own; it is
/// flattened into prompt text, embedding text and record metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticContext {
  #[serde(default)]
  pub environment: Option<String>,
  #[serde(default)]
  pub system: Option<String>,
  #[serde(default)]
  pub element: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub property_id: Option<String>,
  #[serde(default)]
  pub property_name: Option<String>,
  #[serde(default)]
  pub operator_name: Option<String>,
  #[serde(default)]
  pub mode: Option<String>,
  /// Draft text the operator already typed, if any
  #[serde(default)]
  pub current_draft_text: Option<String>,
}

impl DiagnosticContext {
  /// Labeled summary in fixed order, `" | "` separated
  pub fn summary(&self) -> String {
    let mut parts = self.location_parts();
    push_labeled(&mut parts, "Operator", self.operator_name.as_deref());
    push_labeled(&mut parts, "Analysis mode", self.mode.as_deref());

    if parts.is_empty() {
      NO_CONTEXT.to_string()
    } else {
      parts.join(" | ")
    }
  }

  /// Text embedded to look up exemplars for a new generation
  pub fn retrieval_text(&self) -> String {
    match self.draft_text() {
      Some(draft) => format!("{}\nCurrent description: {draft}", self.summary()),
      None => self.summary(),
    }
  }

  /// Context parts describing a validated record, ending with its severity
  pub fn validation_parts(&self, severity: Option<Severity>) -> Vec<String> {
    let mut parts = self.location_parts();
    if let Some(severity) = severity {
      parts.push(format!("Severity: {severity}"));
    }
    parts
  }

  pub fn draft_text(&self) -> Option<&str> {
    non_empty(self.current_draft_text.as_deref())
  }

  pub fn is_detailed(&self) -> bool {
    non_empty(self.mode.as_deref()).is_some_and(|mode| mode.eq_ignore_ascii_case(DETAILED_MODE))
  }

  /// Non-empty fields keyed by their wire names, draft text excluded
  pub fn fields(&self) -> BTreeMap<String, String> {
    [
      ("environment", &self.environment),
      ("system", &self.system),
      ("element", &self.element),
      ("status", &self.status),
      ("propertyId", &self.property_id),
      ("propertyName", &self.property_name),
      ("operatorName", &self.operator_name),
      ("mode", &self.mode),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
      non_empty(value.as_deref()).map(|value| (name.to_string(), value.to_string()))
    })
    .collect()
  }

  fn property(&self) -> Option<&str> {
    non_empty(self.property_name.as_deref()).or_else(|| non_empty(self.property_id.as_deref()))
  }

  fn location_parts(&self) -> Vec<String> {
    let mut parts = Vec::new();
    push_labeled(&mut parts, "Environment", self.environment.as_deref());
    push_labeled(&mut parts, "System", self.system.as_deref());
    push_labeled(&mut parts, "Element", self.element.as_deref());
    push_labeled(&mut parts, "Status", self.status.as_deref());
    push_labeled(&mut parts, "Property", self.property());
    parts
  }
}

fn push_labeled(parts: &mut Vec<String>, label: &str, value: Option<&str>) {
  if let Some(value) = non_empty(value) {
    parts.push(format!("{label}: {value}"));
  }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
  value.map(str::trim).filter(|value| !value.is_empty())
}
