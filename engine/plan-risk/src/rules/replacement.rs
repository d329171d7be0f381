//! Replacements that other resources in the run depend on.

use crate::error::RuleFault;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{preview, replacement_cause, Rule, RuleContext};
use crate::types::Signal;

pub struct ReplaceDependents;

impl Rule for ReplaceDependents {
  fn id(&self) -> &'static str {
    "replace-dependents"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    30
  }

  /// Weight grows by a third of the base per extra dependent, capped at 2x.
  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    let dependents = ctx.dependencies.dependents_of(&change.address);
    let n = dependents.len();
    if n == 0 {
      return Ok(Vec::new());
    }

    let step = ctx.fraction(1, 3);
    let extra = u32::try_from(n - 1).unwrap_or(u32::MAX);
    let weight = ctx
      .weight
      .saturating_add(step.saturating_mul(extra))
      .min(ctx.weight.saturating_mul(2));
    let noun = if n == 1 { "resource depends" } else { "resources depend" };
    let reason = format!(
      "{} will be destroyed and recreated{}; {} dependent {} on it: {}",
      change.address,
      replacement_cause(change),
      n,
      noun,
      preview(&dependents, 5)
    );
    let signal = ctx
      .signal_weighted(change, weight, reason)
      .with_tags(&["downtime"])
      .with_recommendations(&[
        "Verify no dependent resources will break",
        "Consider create_before_destroy to shorten the outage window",
      ]);
    Ok(vec![signal])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::model::{Classification, DependencyIndex};
  use crate::testkit::{change, resource};

  fn run(target: &ResourceChange, all: &[ResourceChange]) -> Vec<Signal> {
    run_weighted(target, all, 30)
  }

  fn run_weighted(target: &ResourceChange, all: &[ResourceChange], weight: u32) -> Vec<Signal> {
    let deps = DependencyIndex::build(all);
    let class = Classification::new();
    let config = Config::default();
    let ctx = RuleContext::new(&deps, &class, &config).for_rule("replace-dependents", weight);
    ReplaceDependents.evaluate(target, &ctx).unwrap()
  }

  #[test]
  fn weight_grows_with_dependents() {
    let sg = change("aws_security_group.sg", ActionKind::Replace);
    let deps: Vec<_> = (0..2)
      .map(|i| {
        resource(&format!("aws_instance.web[{}]", i), ActionKind::NoOp)
          .depends_on("aws_security_group.sg")
          .build()
      })
      .collect();
    let mut all = vec![sg.clone()];
    all.extend(deps);
    let s = run(&sg, &all);
    assert_eq!(s.len(), 1);
    assert_eq!(s[0].weight, 40);
    assert!(s[0].reason.contains("2 dependent resources depend"));
    assert!(s[0].reason.contains("aws_instance.web[0], aws_instance.web[1]"));
  }

  #[test]
  fn weight_is_capped() {
    let sg = change("aws_security_group.sg", ActionKind::Replace);
    let mut all = vec![sg.clone()];
    for i in 0..20 {
      all.push(
        resource(&format!("aws_instance.w{}", i), ActionKind::NoOp)
          .depends_on("aws_security_group.sg")
          .build(),
      );
    }
    let s = run(&sg, &all);
    assert_eq!(s[0].weight, 60);
    assert!(s[0].reason.contains("and 15 more"));
  }

  #[test]
  fn huge_weight_saturates_instead_of_wrapping() {
    let sg = change("aws_security_group.sg", ActionKind::Replace);
    let mut all = vec![sg.clone()];
    for i in 0..2 {
      all.push(
        resource(&format!("aws_instance.w{}", i), ActionKind::NoOp)
          .depends_on("aws_security_group.sg")
          .build(),
      );
    }
    assert_eq!(run_weighted(&sg, &all, u32::MAX)[0].weight, u32::MAX);
    let base = u32::MAX / 2 + 10;
    assert_eq!(run_weighted(&sg, &all, base)[0].weight, base + base / 3);
  }

  #[test]
  fn no_dependents_no_signal() {
    let sg = change("aws_security_group.sg", ActionKind::Replace);
    assert!(run(&sg, &[sg.clone()]).is_empty());
  }
}
