//! Routing and load-balancer plumbing changes.

use crate::error::RuleFault;
use crate::explain::render_deltas;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{preview, replacement_cause, Rule, RuleContext};
use crate::types::Signal;

const NETWORK_INFRA_TYPES: &[&str] = &[
  "aws_route",
  "aws_route_table",
  "aws_network_acl",
  "aws_lb_listener",
  "aws_lb_listener_rule",
  "aws_nat_gateway",
];

pub(crate) fn is_network_infra(resource_type: &str) -> bool {
  NETWORK_INFRA_TYPES.contains(&resource_type)
}

/// Full weight for destroy/replace, half for in-place updates.
pub struct NetworkInfra;

impl Rule for NetworkInfra {
  fn id(&self) -> &'static str {
    "network-infra"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Update, ActionKind::Delete, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    50
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if !is_network_infra(&change.resource_type) {
      return Ok(Vec::new());
    }

    if change.action.is_destructive() {
      let reason = format!(
        "networking resource {} will be {}{}; traffic routed through it may be interrupted",
        change.address,
        change.action.participle(),
        replacement_cause(change)
      );
      let signal = ctx
        .signal(change, reason)
        .with_tags(&["network", "downtime"])
        .with_recommendations(&[
          "Verify network connectivity will not be disrupted",
          "Plan for potential service interruption",
          "Confirm dependent services can tolerate the change",
        ])
        .with_details(render_deltas(change, ctx.config.max_diffs));
      return Ok(vec![signal]);
    }

    let changed: Vec<&str> = change.changed_deltas().map(|d| d.key).collect();
    if changed.is_empty() {
      return Ok(Vec::new());
    }
    let reason = format!(
      "networking resource {} will be updated in place ({})",
      change.address,
      preview(&changed, 5)
    );
    let signal = ctx
      .signal_weighted(change, ctx.fraction(1, 2), reason)
      .with_tags(&["network"])
      .with_recommendations(&["Review network attribute changes for connectivity impact"])
      .with_details(render_deltas(change, ctx.config.max_diffs));
    Ok(vec![signal])
  }
}
