//! Rule evaluation across resources, optionally on a rayon pool.
//!
//! Each rule × resource pair is isolated: an `Err(RuleFault)` or a panic
//! drops that pair's signals and becomes a diagnostic.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::model::ResourceChange;
use crate::rules::{Rule, RuleContext, RuleSet};
use crate::types::{Diagnostic, DiagnosticKind, Signal};

/// Signals and faults for one resource, signals in rule order.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
  pub signals: Vec<Signal>,
  pub faults: Vec<Diagnostic>,
}

/// Number of workers for `jobs` (0 = available parallelism).
pub fn worker_count(jobs: usize) -> usize {
  if jobs == 0 {
    std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(4)
  } else {
    jobs
  }
}

/// Evaluate every change. Output is index-aligned with `changes`.
pub fn evaluate_all(changes: &[ResourceChange], rules: &RuleSet, ctx: RuleContext<'_>) -> Vec<Evaluation> {
  let workers = worker_count(ctx.config.jobs);
  if workers <= 1 || changes.len() <= 1 {
    debug!(resources = changes.len(), "evaluating rules sequentially");
    return changes.iter().map(|c| evaluate_one(c, rules, ctx)).collect();
  }

  match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
    Ok(pool) => {
      debug!(resources = changes.len(), workers, "evaluating rules in parallel");
      pool.install(|| changes.par_iter().map(|c| evaluate_one(c, rules, ctx)).collect())
    }
    Err(e) => {
      warn!(error = %e, "could not start worker pool; evaluating sequentially");
      changes.iter().map(|c| evaluate_one(c, rules, ctx)).collect()
    }
  }
}

/// Run every applicable rule against one change.
pub fn evaluate_one(change: &ResourceChange, rules: &RuleSet, ctx: RuleContext<'_>) -> Evaluation {
  let mut out = Evaluation::default();
  if !change.action.is_evaluated() {
    return out;
  }

  for (rule, weight) in rules.iter() {
    if !rule.applies_to().contains(&change.action) {
      continue;
    }
    let rule_ctx = ctx.for_rule(rule.id(), weight);
    match run_isolated(rule, change, &rule_ctx) {
      Ok(signals) => out.signals.extend(
        signals
          .into_iter()
          .filter(|s| !s.has_any_tag(&ctx.config.exclude_tags)),
      ),
      Err(reason) => {
        let diag = Diagnostic::new(
          DiagnosticKind::RuleFault,
          format!("rule {} failed on {}: {}", rule.id(), change.address, reason),
        )
        .at_index(change.index)
        .with_address(change.address.clone())
        .with_rule(rule.id());
        warn!(rule = rule.id(), address = %change.address, "{}", reason);
        out.faults.push(diag);
      }
    }
  }
  out
}

fn run_isolated(rule: &dyn Rule, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, String> {
  match panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(change, ctx))) {
    Ok(Ok(signals)) => Ok(signals),
    Ok(Err(fault)) => Err(fault.reason),
    Err(payload) => {
      let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
      Err(format!("panicked: {}", msg))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::error::RuleFault;
  use crate::model::{ActionKind, Classification, DependencyIndex};
  use crate::testkit::change;

  struct Tagged(&'static str, &'static str);

  impl Rule for Tagged {
    fn id(&self) -> &'static str {
      self.0
    }
    fn applies_to(&self) -> &'static [ActionKind] {
      &[ActionKind::Update, ActionKind::Delete]
    }
    fn default_weight(&self) -> u32 {
      10
    }
    fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
      Ok(vec![ctx.signal(change, self.0).with_tags(&[self.1])])
    }
  }

  struct Failing;

  impl Rule for Failing {
    fn id(&self) -> &'static str {
      "failing"
    }
    fn applies_to(&self) -> &'static [ActionKind] {
      &[ActionKind::Update]
    }
    fn default_weight(&self) -> u32 {
      10
    }
    fn evaluate(&self, change: &ResourceChange, _: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
      if change.address.ends_with("boom") {
        panic!("exploded");
      }
      Err(RuleFault::new("cannot decide"))
    }
  }

  fn rules() -> RuleSet {
    let mut set = RuleSet::empty();
    set
      .register(Tagged("first", "ops"))
      .register(Failing)
      .register(Tagged("second", "security"));
    set
  }

  fn with_config<T>(config: &Config, f: impl FnOnce(RuleContext<'_>) -> T) -> T {
    let deps = DependencyIndex::default();
    let class = Classification::new();
    f(RuleContext::new(&deps, &class, config))
  }

  #[test]
  fn faults_are_isolated_per_rule() {
    let config = Config::default();
    let c = change("aws_instance.a", ActionKind::Update);
    let e = with_config(&config, |ctx| evaluate_one(&c, &rules(), ctx));
    let ids: Vec<_> = e.signals.iter().map(|s| s.rule.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);
    assert_eq!(e.faults.len(), 1);
    assert_eq!(e.faults[0].rule.as_deref(), Some("failing"));
    assert!(e.faults[0].message.contains("cannot decide"));
  }

  #[test]
  fn panics_become_faults() {
    let config = Config::default();
    let c = change("aws_instance.boom", ActionKind::Update);
    let e = with_config(&config, |ctx| evaluate_one(&c, &rules(), ctx));
    assert_eq!(e.signals.len(), 2);
    assert!(e.faults[0].message.contains("panicked: exploded"));
  }

  #[test]
  fn non_applicable_and_noop_are_skipped() {
    let config = Config::default();
    let del = change("aws_instance.a", ActionKind::Delete);
    let e = with_config(&config, |ctx| evaluate_one(&del, &rules(), ctx));
    assert!(e.faults.is_empty());
    assert_eq!(e.signals.len(), 2);

    let noop = change("aws_instance.a", ActionKind::NoOp);
    let e = with_config(&config, |ctx| evaluate_one(&noop, &rules(), ctx));
    assert!(e.signals.is_empty());
  }

  #[test]
  fn excluded_tags_are_dropped() {
    let config = Config {
      exclude_tags: vec!["security".into()],
      ..Config::default()
    };
    let c = change("aws_instance.a", ActionKind::Delete);
    let e = with_config(&config, |ctx| evaluate_one(&c, &rules(), ctx));
    let ids: Vec<_> = e.signals.iter().map(|s| s.rule.as_str()).collect();
    assert_eq!(ids, vec!["first"]);
  }

  #[test]
  fn parallel_matches_sequential() {
    let changes: Vec<_> = (0..40)
      .map(|i| change(&format!("aws_instance.n{}", i), ActionKind::Delete))
      .collect();
    let seq = Config {
      jobs: 1,
      ..Config::default()
    };
    let par = Config {
      jobs: 4,
      ..Config::default()
    };
    let a = with_config(&seq, |ctx| evaluate_all(&changes, &rules(), ctx));
    let b = with_config(&par, |ctx| evaluate_all(&changes, &rules(), ctx));
    let flat = |v: &[Evaluation]| v.iter().flat_map(|e| e.signals.clone()).collect::<Vec<_>>();
    assert_eq!(flat(&a), flat(&b));
    assert_eq!(a[7].signals[0].address, "aws_instance.n7");
  }
}
