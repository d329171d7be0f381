//! ECS service capacity reductions.

use serde_json::Value;

use crate::error::RuleFault;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{as_int, Rule, RuleContext};
use crate::types::Signal;

pub struct CapacityReduction;

impl Rule for CapacityReduction {
  fn id(&self) -> &'static str {
    "capacity-reduction"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Update]
  }

  fn default_weight(&self) -> u32 {
    25
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if change.resource_type != "aws_ecs_service" {
      return Ok(Vec::new());
    }
    let mut out = Vec::new();

    let count = |v: Option<&Value>| v.and_then(as_int);
    if let (Some(before), Some(after)) = (
      count(change.before_known("desired_count")),
      count(change.after_known("desired_count")),
    ) {
      if before > 0 && after >= 0 && after < before {
        out.push(
          ctx
            .signal(
              change,
              format!("desired_count of {} decreases: {} -> {}", change.address, before, after),
            )
            .with_tags(&["ops", "capacity"])
            .with_recommendations(&[
              "Verify capacity is sufficient for current load",
              "Consider scaling down gradually",
            ]),
        );
      }
    }

    let key = "deployment_minimum_healthy_percent";
    if let (Some(before), Some(after)) = (
      deployment_setting(change.before_known(key), change.before_known("deployment_configuration"), key),
      deployment_setting(change.after_known(key), change.after_known("deployment_configuration"), key),
    ) {
      if before > 0 && after >= 0 && after < before {
        out.push(
          ctx
            .signal(
              change,
              format!("{} of {} decreases: {} -> {}", key, change.address, before, after),
            )
            .with_tags(&["ops"])
            .with_recommendations(&[
              "A lower minimum healthy percent raises the risk of downtime during deployments",
              "Ensure health checks and rollback are configured",
            ]),
        );
      }
    }

    Ok(out)
  }
}

/// Top-level value, else the one nested in `deployment_configuration`
/// (an object, or a single-element list as providers encode blocks).
fn deployment_setting(top: Option<&Value>, block: Option<&Value>, key: &str) -> Option<i64> {
  if let Some(v) = top.and_then(as_int) {
    return Some(v);
  }
  let block = match block? {
    Value::Array(items) => items.first()?,
    other => other,
  };
  block.get(key).and_then(as_int)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::model::{Classification, DependencyIndex};
  use crate::testkit::resource;
  use serde_json::json;

  fn run(c: &ResourceChange) -> Vec<Signal> {
    let deps = DependencyIndex::default();
    let class = Classification::new();
    let config = Config::default();
    let ctx = RuleContext::new(&deps, &class, &config).for_rule("capacity-reduction", 25);
    CapacityReduction.evaluate(c, &ctx).unwrap()
  }

  #[test]
  fn desired_count_decrease() {
    let c = resource("aws_ecs_service.api", ActionKind::Update)
      .before("desired_count", json!(6))
      .after("desired_count", json!(2))
      .build();
    let s = run(&c);
    assert_eq!(s.len(), 1);
    assert_eq!(s[0].reason, "desired_count of aws_ecs_service.api decreases: 6 -> 2");
    assert_eq!(s[0].tags, vec!["ops", "capacity"]);
  }

  #[test]
  fn nested_min_healthy_decrease() {
    let c = resource("aws_ecs_service.api", ActionKind::Update)
      .before("deployment_configuration", json!([{"deployment_minimum_healthy_percent": 100}]))
      .after("deployment_configuration", json!({"deployment_minimum_healthy_percent": 50}))
      .build();
    let s = run(&c);
    assert_eq!(s.len(), 1);
    assert!(s[0].reason.contains("100 -> 50"));
  }

  #[test]
  fn scale_up_is_silent() {
    let c = resource("aws_ecs_service.api", ActionKind::Update)
      .before("desired_count", json!(2))
      .after("desired_count", json!(4))
      .build();
    assert!(run(&c).is_empty());
  }
}
