//! Core engine: classify -> evaluate -> aggregate -> explain.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::classify;
use crate::config::Config;
use crate::error::AnalysisError;
use crate::evaluate;
use crate::explain;
use crate::fingerprint;
use crate::model::{Classification, DependencyIndex, ResourceChange};
use crate::rules::{RuleContext, RuleSet};
use crate::score;
use crate::types::*;

/// The plan risk engine. Stateless between runs; holds configuration and the
/// rule registry.
#[derive(Debug, Clone)]
pub struct Engine {
  config: Config,
  rules: RuleSet,
}

impl Engine {
  pub fn new(config: Config, rules: RuleSet) -> Self {
    Self { config, rules }
  }

  /// Default configuration and the builtin rule catalog.
  pub fn with_defaults() -> Self {
    Self::new(Config::default(), RuleSet::builtin())
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn rules(&self) -> &RuleSet {
    &self.rules
  }

  pub fn rules_mut(&mut self) -> &mut RuleSet {
    &mut self.rules
  }

  /// Parse plan JSON and analyze it.
  pub fn analyze_str(&self, input: &str, classification: &Classification) -> Result<Report, AnalysisError> {
    let plan = classify::parse_plan(input)?;
    self.analyze(&plan, classification)
  }

  /// Analyze a parsed plan.
  ///
  /// Malformed entries and rule faults become diagnostics on the report. Only
  /// a plan whose every entry is malformed is an error.
  pub fn analyze(&self, plan: &RawPlan, classification: &Classification) -> Result<Report, AnalysisError> {
    let mut diagnostics = Vec::new();
    let meta = plan_meta(plan, &mut diagnostics);

    let classified = classify::classify(plan, &self.config);
    diagnostics.extend(classified.diagnostics);
    if classified.changes.is_empty() && classified.skipped > 0 {
      return Err(AnalysisError::NoUsableChanges {
        skipped: classified.skipped,
      });
    }

    // Dependents are looked up across the whole run, filtered or not.
    let dependencies = DependencyIndex::build(&classified.changes);
    let total = classified.changes.len();
    let selected: Vec<ResourceChange> = classified
      .changes
      .into_iter()
      .filter(|c| self.config.only_types.is_empty() || self.config.only_types.contains(&c.resource_type))
      .collect();
    debug!(
      selected = selected.len(),
      total,
      rules = self.rules.len(),
      "evaluating resources"
    );

    let ctx = RuleContext::new(&dependencies, classification, &self.config);
    let evaluations = evaluate::evaluate_all(&selected, &self.rules, ctx);

    let mut verdicts = Vec::with_capacity(selected.len());
    for (change, evaluation) in selected.iter().zip(evaluations) {
      diagnostics.extend(evaluation.faults);
      verdicts.push(score::resource_verdict(change, evaluation.signals, &self.config.scoring));
    }

    let verdict = score::plan_verdict(verdicts, classified.counts);
    let explanations = verdict
      .resources
      .iter()
      .take(self.config.max_explanations)
      .map(explain::explain_verdict)
      .collect();
    let summary = explain::summarize(&verdict, self.config.top_n);
    let report_id = fingerprint::report_id(&verdict);

    info!(
      report_id = %report_id,
      overall = %verdict.overall,
      resources = verdict.resources.len(),
      diagnostics = diagnostics.len(),
      "plan analyzed"
    );

    Ok(Report {
      report_id,
      plan: meta,
      verdict,
      explanations,
      summary,
      diagnostics,
    })
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::with_defaults()
  }
}

fn plan_meta(plan: &RawPlan, diagnostics: &mut Vec<Diagnostic>) -> PlanMeta {
  let timestamp = match plan.timestamp.as_deref() {
    None | Some("") => None,
    Some(raw) => match DateTime::parse_from_rfc3339(raw) {
      Ok(ts) => Some(ts.with_timezone(&Utc)),
      Err(e) => {
        let diag = Diagnostic::new(
          DiagnosticKind::InvalidMetadata,
          format!("timestamp \"{}\" is not RFC3339: {}", raw, e),
        );
        warn!("{}", diag.message);
        diagnostics.push(diag);
        None
      }
    },
  };
  PlanMeta {
    format_version: plan.format_version.clone(),
    terraform_version: plan.terraform_version.clone(),
    timestamp,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::ActionKind;
  use serde_json::json;

  fn plan(value: serde_json::Value) -> RawPlan {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn empty_change_list_is_none() {
    let report = Engine::with_defaults()
      .analyze(&plan(json!({"resource_changes": []})), &Classification::new())
      .unwrap();
    assert_eq!(report.verdict.overall, Tier::None);
    assert!(report.verdict.resources.is_empty());
    assert!(report.diagnostics.is_empty());
  }

  #[test]
  fn all_malformed_is_an_error() {
    let err = Engine::with_defaults()
      .analyze(&plan(json!({"resource_changes": [1, {"change": {}}]})), &Classification::new())
      .unwrap_err();
    assert!(matches!(err, AnalysisError::NoUsableChanges { skipped: 2 }));
  }

  #[test]
  fn invalid_timestamp_is_a_diagnostic() {
    let report = Engine::with_defaults()
      .analyze(
        &plan(json!({"timestamp": "yesterday", "resource_changes": []})),
        &Classification::new(),
      )
      .unwrap();
    assert_eq!(report.plan.timestamp, None);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::InvalidMetadata);
  }

  #[test]
  fn valid_timestamp_is_normalized_to_utc() {
    let report = Engine::with_defaults()
      .analyze(
        &plan(json!({"timestamp": "2024-05-01T12:00:00+02:00", "resource_changes": []})),
        &Classification::new(),
      )
      .unwrap();
    assert_eq!(report.plan.timestamp.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
  }

  #[test]
  fn only_types_limits_verdicts_but_not_counts() {
    let config = Config {
      only_types: vec!["aws_db_instance".into()],
      ..Config::default()
    };
    let engine = Engine::new(config, RuleSet::builtin());
    let report = engine
      .analyze(
        &plan(json!({"resource_changes": [
          {"address": "aws_db_instance.main", "change": {"actions": ["delete"], "before": {"engine": "postgres"}}},
          {"address": "aws_instance.web", "change": {"actions": ["delete"], "before": {}}}
        ]})),
        &Classification::new(),
      )
      .unwrap();
    assert_eq!(report.verdict.counts.delete, 2);
    assert_eq!(report.verdict.resources.len(), 1);
    assert_eq!(report.verdict.resources[0].action, ActionKind::Delete);
  }

  #[test]
  fn classification_raises_tier() {
    let p = plan(json!({"resource_changes": [
      {"address": "module.prod.aws_instance.api", "change": {"actions": ["delete"], "before": {}}}
    ]}));
    let engine = Engine::with_defaults();
    let plain = engine.analyze(&p, &Classification::new()).unwrap();
    assert_eq!(plain.verdict.overall, Tier::Medium);
    let critical = engine
      .analyze(&p, &Classification::new().with_critical("module.prod"))
      .unwrap();
    assert_eq!(critical.verdict.overall, Tier::Critical);
    assert_ne!(plain.report_id, critical.report_id);
  }

  #[test]
  fn explanations_are_capped_in_rank_order() {
    let changes: Vec<_> = (0..4)
      .map(|i| {
        json!({"address": format!("aws_instance.n{}", i), "change": {"actions": ["delete"], "before": {}}})
      })
      .chain(std::iter::once(
        json!({"address": "aws_db_instance.main", "change": {"actions": ["delete"], "before": {}}}),
      ))
      .collect();
    let config = Config {
      max_explanations: 2,
      ..Config::default()
    };
    let report = Engine::new(config, RuleSet::builtin())
      .analyze(&plan(json!({ "resource_changes": changes })), &Classification::new())
      .unwrap();
    assert_eq!(report.verdict.resources.len(), 5);
    let explained: Vec<_> = report.explanations.iter().map(|e| e.address.as_str()).collect();
    assert_eq!(explained, vec!["aws_db_instance.main", "aws_instance.n0"]);
  }

  #[test]
  fn excluding_routine_tags_keeps_critical_verdict() {
    let p = plan(json!({"resource_changes": [
      {"address": "module.prod.aws_instance.api", "change": {"actions": ["delete"], "before": {}}}
    ]}));
    let config = Config {
      exclude_tags: vec!["ops".into(), "downtime".into()],
      ..Config::default()
    };
    let report = Engine::new(config, RuleSet::builtin())
      .analyze(&p, &Classification::new().with_critical("module.prod"))
      .unwrap();
    assert_eq!(report.verdict.overall, Tier::Critical);
    let rules: Vec<_> = report.verdict.resources[0].signals.iter().map(|s| s.rule.as_str()).collect();
    assert_eq!(rules, vec!["production-critical"]);
  }
}
