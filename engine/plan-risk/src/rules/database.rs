//! Database engine version changes.

use serde_json::Value;

use crate::error::RuleFault;
use crate::explain::render_deltas;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{Rule, RuleContext};
use crate::types::Signal;

const ENGINE_TYPES: &[&str] = &[
  "aws_db_instance",
  "aws_rds_cluster",
  "aws_rds_cluster_instance",
  "aws_elasticache_cluster",
  "aws_elasticache_replication_group",
];

pub struct EngineVersion;

impl Rule for EngineVersion {
  fn id(&self) -> &'static str {
    "engine-version"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Update, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    50
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if !ENGINE_TYPES.contains(&change.resource_type.as_str()) {
      return Ok(Vec::new());
    }
    let (Some(before), Some(after)) = (
      version(change.before_known("engine_version")),
      version(change.after_known("engine_version")),
    ) else {
      return Ok(Vec::new());
    };
    if before == after {
      return Ok(Vec::new());
    }

    let major = major_version(before) != major_version(after);
    let (kind, weight) = if major {
      ("major", ctx.weight)
    } else {
      ("minor", ctx.fraction(1, 2))
    };
    let signal = ctx
      .signal_weighted(
        change,
        weight,
        format!(
          "{} engine version upgrade on {}: engine_version \"{}\" -> \"{}\"",
          kind, change.address, before, after
        ),
      )
      .with_tags(&["downtime"])
      .with_recommendations(&[
        "Test the upgrade in a staging environment first",
        "Review the engine changelog for breaking changes",
        "Schedule during a maintenance window",
      ])
      .with_details(render_deltas(change, ctx.config.max_diffs));
    Ok(vec![signal])
  }
}

fn version(value: Option<&Value>) -> Option<&str> {
  value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn major_version(version: &str) -> &str {
  version.split('.').next().unwrap_or(version)
}
