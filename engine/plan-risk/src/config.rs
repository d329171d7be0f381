//! Engine configuration with sane defaults.

use serde::Deserialize;

use crate::types::Tier;

/// Score thresholds used to turn a numeric score into a [`Tier`].
///
/// A score of zero is always `Tier::None`; the remaining tiers start at the
/// given inclusive lower bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Scoring {
  /// Per-resource scores are clamped to this value.
  pub max_score: u32,
  pub low: u32,
  pub medium: u32,
  pub high: u32,
  pub critical: u32,
}

impl Default for Scoring {
  fn default() -> Self {
    Self {
      max_score: 100,
      low: 1,
      medium: 25,
      high: 50,
      critical: 80,
    }
  }
}

impl Scoring {
  /// Map a (clamped) score to its tier.
  pub fn tier_for(&self, score: u32) -> Tier {
    if score == 0 {
      Tier::None
    } else if score >= self.critical {
      Tier::Critical
    } else if score >= self.high {
      Tier::High
    } else if score >= self.medium {
      Tier::Medium
    } else if score >= self.low {
      Tier::Low
    } else {
      Tier::None
    }
  }

  pub fn clamp(&self, raw: u64) -> u32 {
    raw.min(u64::from(self.max_score)) as u32
  }
}

/// Tunable limits, filters and thresholds for one analysis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub scoring: Scoring,
  /// Number of highest-scoring resources named in the plan summary.
  pub top_n: usize,
  /// Worker threads for rule evaluation. 0 = available parallelism, 1 = sequential.
  pub jobs: usize,
  /// Max top-level attributes kept per before/after object.
  pub max_attributes: usize,
  /// Max attribute diff lines attached to one signal.
  pub max_diffs: usize,
  /// Max resource explanations in a report, highest score first.
  pub max_explanations: usize,
  /// Max policy statements inspected per policy document.
  pub max_policy_statements: usize,
  /// Max module nesting walked when reading prior-state dependencies.
  pub max_dependency_depth: usize,
  /// When non-empty, only resources of these types are evaluated.
  pub only_types: Vec<String>,
  /// Signals carrying any of these tags are dropped before scoring.
  pub exclude_tags: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      scoring: Scoring::default(),
      top_n: 5,
      jobs: 0,
      max_attributes: 512,
      max_diffs: 10,
      max_explanations: 20,
      max_policy_statements: 256,
      max_dependency_depth: 16,
      only_types: Vec::new(),
      exclude_tags: Vec::new(),
    }
  }
}
