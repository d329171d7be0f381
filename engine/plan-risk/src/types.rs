//! Core types for the plan risk engine (JSON contracts in and out).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ActionKind;

// ---------------------------------------------------------------------------
// Inbound types: the `terraform show -json <planfile>` contract
// ---------------------------------------------------------------------------

/// Top-level plan document. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlan {
  #[serde(default)]
  pub format_version: Option<String>,
  #[serde(default)]
  pub terraform_version: Option<String>,
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub resource_changes: Vec<RawEntry>,
  #[serde(default)]
  pub prior_state: Option<RawState>,
}

/// One element of `resource_changes`.
///
/// Entries that do not even have the shape of a resource change (wrong JSON
/// type, wrongly typed fields) are kept as `Invalid` so the classifier can
/// skip them with a diagnostic instead of rejecting the whole plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
  Change(RawResourceChange),
  Invalid(Value),
}

impl From<RawResourceChange> for RawEntry {
  fn from(change: RawResourceChange) -> Self {
    Self::Change(change)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResourceChange {
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub module_address: Option<String>,
  #[serde(default)]
  pub mode: Option<String>,
  #[serde(default, rename = "type")]
  pub resource_type: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub provider_name: Option<String>,
  #[serde(default)]
  pub change: Option<RawChange>,
  /// Not part of Terraform's output; lets a plan loader attach dependencies.
  #[serde(default)]
  pub depends_on: Vec<String>,
}

/// Before/after state and action list. The marker fields can be a bool or a
/// nested map mirroring the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChange {
  #[serde(default)]
  pub actions: Option<Vec<String>>,
  #[serde(default)]
  pub before: Value,
  #[serde(default)]
  pub after: Value,
  #[serde(default)]
  pub after_unknown: Value,
  #[serde(default)]
  pub before_sensitive: Value,
  #[serde(default)]
  pub after_sensitive: Value,
  #[serde(default)]
  pub replace_paths: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawState {
  #[serde(default)]
  pub values: Option<RawStateValues>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStateValues {
  #[serde(default)]
  pub root_module: Option<RawModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawModule {
  #[serde(default)]
  pub resources: Vec<RawStateResource>,
  #[serde(default)]
  pub child_modules: Vec<RawModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStateResource {
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub depends_on: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tier enum (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  #[default]
  None,
  Low,
  Medium,
  High,
  Critical,
}

impl Tier {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "none" => Some(Self::None),
      "low" => Some(Self::Low),
      "medium" | "med" => Some(Self::Medium),
      "high" => Some(Self::High),
      "critical" | "crit" => Some(Self::Critical),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

impl std::fmt::Display for Tier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Rule output
// ---------------------------------------------------------------------------

/// One unit of risk evidence from a single rule against a single change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
  pub rule: String,
  pub weight: u32,
  pub reason: String,
  /// Address of the change this signal applies to.
  pub address: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub recommendations: Vec<String>,
  /// Attribute diffs backing the reason (`key: before -> after`).
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub details: Vec<String>,
}

impl Signal {
  pub fn with_tags(mut self, tags: &[&str]) -> Self {
    self.tags = tags.iter().map(|t| t.to_string()).collect();
    self
  }

  pub fn with_recommendations(mut self, recs: &[&str]) -> Self {
    self.recommendations = recs.iter().map(|r| r.to_string()).collect();
    self
  }

  pub fn with_details(mut self, details: Vec<String>) -> Self {
    self.details = details;
    self
  }

  pub fn has_any_tag(&self, tags: &[String]) -> bool {
    self.tags.iter().any(|t| tags.contains(t))
  }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Aggregated risk outcome for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
  pub address: String,
  pub resource_type: String,
  pub action: ActionKind,
  pub tier: Tier,
  pub score: u32,
  /// In rule evaluation order.
  pub signals: Vec<Signal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
  pub create: usize,
  pub update: usize,
  pub delete: usize,
  pub replace: usize,
  pub read: usize,
  pub no_op: usize,
}

impl ActionCounts {
  pub fn record(&mut self, action: ActionKind) {
    match action {
      ActionKind::Create => self.create += 1,
      ActionKind::Update => self.update += 1,
      ActionKind::Delete => self.delete += 1,
      ActionKind::Replace => self.replace += 1,
      ActionKind::Read => self.read += 1,
      ActionKind::NoOp => self.no_op += 1,
    }
  }

  /// Changes that alter infrastructure (excludes reads and no-ops).
  pub fn changes(&self) -> usize {
    self.create + self.update + self.delete + self.replace
  }
}

/// Aggregated risk outcome for the whole plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanVerdict {
  pub overall: Tier,
  pub counts: ActionCounts,
  /// Descending score, then address.
  pub resources: Vec<Verdict>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceExplanation {
  pub address: String,
  pub tier: Tier,
  pub score: u32,
  pub headline: String,
  /// Most severe first.
  pub bullets: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub recommendations: Vec<String>,
  /// Attribute diffs from every signal, de-duplicated.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopResource {
  pub address: String,
  pub tier: Tier,
  pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
  pub sentence: String,
  pub top: Vec<TopResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanMeta {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format_version: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub terraform_version: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  MalformedPlan,
  RuleFault,
  InputLimit,
  InvalidMetadata,
}

/// A recorded, non-fatal problem surfaced next to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub message: String,
  /// Position of the offending entry in `resource_changes`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub index: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rule: Option<String>,
}

impl Diagnostic {
  pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      index: None,
      address: None,
      rule: None,
    }
  }

  pub fn at_index(mut self, index: usize) -> Self {
    self.index = Some(index);
    self
  }

  pub fn with_address(mut self, address: impl Into<String>) -> Self {
    self.address = Some(address.into());
    self
  }

  pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
    self.rule = Some(rule.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
  pub report_id: String,
  pub plan: PlanMeta,
  pub verdict: PlanVerdict,
  pub explanations: Vec<ResourceExplanation>,
  pub summary: Summary,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tier_ordering_is_monotonic() {
    assert!(Tier::None < Tier::Low);
    assert!(Tier::Low < Tier::Medium);
    assert!(Tier::Medium < Tier::High);
    assert!(Tier::High < Tier::Critical);
  }

  #[test]
  fn tier_parses_loosely() {
    assert_eq!(Tier::from_str_loose("HIGH"), Some(Tier::High));
    assert_eq!(Tier::from_str_loose("crit"), Some(Tier::Critical));
    assert_eq!(Tier::from_str_loose("severe"), None);
  }

  #[test]
  fn non_object_entry_is_kept_as_invalid() {
    let plan: RawPlan = serde_json::from_str(
      r#"{"resource_changes": [42, {"address": "aws_s3_bucket.a", "type": "aws_s3_bucket"}]}"#,
    )
    .unwrap();
    assert!(matches!(plan.resource_changes[0], RawEntry::Invalid(_)));
    assert!(matches!(plan.resource_changes[1], RawEntry::Change(_)));
  }
}
