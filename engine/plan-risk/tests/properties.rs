//! Property-based tests for the plan risk engine
//!
//! Invariants that hold for any plan:
//! - The overall tier dominates every resource tier
//! - Output is identical for sequential and parallel evaluation
//! - Sensitive values never appear in the serialized report
//! - No-op resources carry no signals
//! - Marking resources production-critical never lowers the overall tier

use plan_risk::{ActionKind, Classification, Config, Engine, RawPlan, RuleSet, Tier};
use proptest::prelude::*;
use serde_json::{json, Value};

const TYPES: &[&str] = &[
  "aws_db_instance",
  "aws_instance",
  "aws_security_group",
  "aws_kms_key",
  "aws_route",
  "aws_ecs_service",
  "aws_iam_policy",
];

const ACTIONS: &[&[&str]] = &[
  &["create"],
  &["update"],
  &["delete"],
  &["delete", "create"],
  &["no-op"],
  &["read"],
];

const SECRET: &str = "SECRETVALUE";

/// (type, action, counter, depends on previous, publicly accessible)
type EntryShape = (usize, usize, u8, bool, bool);

fn entry_shape() -> impl Strategy<Value = EntryShape> {
  (0..TYPES.len(), 0..ACTIONS.len(), 0u8..10, any::<bool>(), any::<bool>())
}

fn build_plan(shapes: &[EntryShape]) -> RawPlan {
  let changes: Vec<Value> = shapes
    .iter()
    .enumerate()
    .map(|(i, &(t, a, n, dep, public))| {
      let actions = ACTIONS[a];
      let before = json!({
        "password": format!("{}{}", SECRET, n),
        "desired_count": n,
        "publicly_accessible": false,
        "engine_version": "14.1",
        "ingress": [{"from_port": 22, "to_port": 22, "protocol": "tcp", "cidr_blocks": ["0.0.0.0/0"]}]
      });
      let after = json!({
        "password": format!("{}{}", SECRET, n + 1),
        "desired_count": n / 2,
        "publicly_accessible": public,
        "engine_version": "15.0",
        "ingress": []
      });
      let depends_on: Vec<String> = if dep && i > 0 {
        vec![format!("{}.r{}", TYPES[shapes[i - 1].0], i - 1)]
      } else {
        Vec::new()
      };
      let before = if actions == ["create"] { Value::Null } else { before };
      let after = if actions == ["delete"] { Value::Null } else { after };
      json!({
        "address": format!("{}.r{}", TYPES[t], i),
        "type": TYPES[t],
        "depends_on": depends_on,
        "change": {
          "actions": actions,
          "before": before,
          "after": after,
          "before_sensitive": {"password": true},
          "after_sensitive": {"password": true}
        }
      })
    })
    .collect();
  serde_json::from_value(json!({ "resource_changes": changes })).unwrap()
}

fn engine(jobs: usize) -> Engine {
  Engine::new(
    Config {
      jobs,
      ..Config::default()
    },
    RuleSet::builtin(),
  )
}

proptest! {
  #[test]
  fn prop_overall_dominates_resources(shapes in prop::collection::vec(entry_shape(), 1..12)) {
    let report = engine(1).analyze(&build_plan(&shapes), &Classification::new()).unwrap();
    for v in &report.verdict.resources {
      prop_assert!(report.verdict.overall >= v.tier);
    }
  }

  #[test]
  fn prop_parallel_matches_sequential(shapes in prop::collection::vec(entry_shape(), 1..12)) {
    let plan = build_plan(&shapes);
    let a = serde_json::to_string(&engine(1).analyze(&plan, &Classification::new()).unwrap()).unwrap();
    let b = serde_json::to_string(&engine(4).analyze(&plan, &Classification::new()).unwrap()).unwrap();
    prop_assert_eq!(a, b);
  }

  #[test]
  fn prop_sensitive_values_never_leak(shapes in prop::collection::vec(entry_shape(), 1..12)) {
    let report = engine(0).analyze(&build_plan(&shapes), &Classification::new()).unwrap();
    let out = serde_json::to_string(&report).unwrap();
    prop_assert!(!out.contains(SECRET));
  }

  #[test]
  fn prop_noop_has_no_signals(shapes in prop::collection::vec(entry_shape(), 1..12)) {
    let report = engine(1).analyze(&build_plan(&shapes), &Classification::new()).unwrap();
    for v in report.verdict.resources.iter().filter(|v| v.action == ActionKind::NoOp) {
      prop_assert_eq!(v.tier, Tier::None);
      prop_assert!(v.signals.is_empty());
    }
  }

  #[test]
  fn prop_critical_classification_is_monotonic(
    shapes in prop::collection::vec(entry_shape(), 1..12),
    pick in any::<prop::sample::Index>(),
  ) {
    let plan = build_plan(&shapes);
    let i = pick.index(shapes.len());
    let critical = Classification::new().with_critical(format!("{}.r{}", TYPES[shapes[i].0], i));
    let plain = engine(1).analyze(&plan, &Classification::new()).unwrap();
    let marked = engine(1).analyze(&plan, &critical).unwrap();
    prop_assert!(marked.verdict.overall >= plain.verdict.overall);
  }
}
