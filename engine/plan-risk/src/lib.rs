//! Plan risk engine: deterministic, rule-based change classification and
//! risk scoring for infrastructure-as-code plans.
//!
//! Takes the JSON form of a Terraform plan, classifies every resource change
//! (create / update / delete / replace, with unknown and sensitive values
//! kept apart), runs an ordered registry of independent risk rules, and
//! folds the resulting signals into per-resource and plan-wide tiers with
//! plain-language explanations.
//!
//! No cloud calls, no file or network I/O; pure computation over the plan.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod explain;
pub mod fingerprint;
pub mod model;
pub mod rules;
pub mod score;
pub mod types;

#[cfg(test)]
mod testkit;

pub use classify::parse_plan;
pub use config::{Config, Scoring};
pub use engine::Engine;
pub use error::{AnalysisError, RuleFault};
pub use model::{ActionKind, AttrValue, Classification, ResourceChange};
pub use rules::{Rule, RuleContext, RuleSet};
pub use types::{Diagnostic, DiagnosticKind, RawPlan, Report, Signal, Tier, Verdict};

/// Analyze a plan with the default configuration and rule catalog.
pub fn analyze(plan: &RawPlan) -> Result<Report, AnalysisError> {
  Engine::with_defaults().analyze(plan, &Classification::new())
}
