//! Structured error types for the plan risk engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
  /// One resource-change entry is structurally invalid. The classifier turns
  /// these into diagnostics; they only escape when the caller classifies a
  /// single entry directly.
  #[error("malformed plan: {field}: {reason}")]
  MalformedPlan { field: String, reason: String },

  #[error("empty input; expected plan JSON (from `terraform show -json <planfile>`)")]
  EmptyInput,

  #[error("no usable resource changes: all {skipped} entries were malformed")]
  NoUsableChanges { skipped: usize },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl AnalysisError {
  pub fn malformed(field: &str, reason: &str) -> Self {
    Self::MalformedPlan {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// A rule failed internally while evaluating one resource.
///
/// Isolated to that rule × resource pair: the engine records it as a
/// diagnostic and keeps going.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct RuleFault {
  pub reason: String,
}

impl RuleFault {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }
}
