//! Network exposure: security groups opening sensitive ports to the world,
//! and changes to attributes that control public reachability.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::RuleFault;
use crate::explain::render_value;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{as_int, preview, Rule, RuleContext};
use crate::types::Signal;

const SECURITY_GROUP_TYPES: &[&str] = &["aws_security_group", "aws_security_group_rule"];

/// Inbound ports that should never face the internet.
const DANGEROUS_PORTS: &[(i64, &str)] = &[
  (22, "SSH"),
  (3306, "MySQL"),
  (3389, "RDP"),
  (5432, "PostgreSQL"),
  (6379, "Redis"),
  (9200, "Elasticsearch"),
];

const OPEN_CIDRS: &[&str] = &["0.0.0.0/0", "::/0"];

/// Attributes that decide whether a resource is reachable from outside.
const EXPOSURE_ATTRIBUTES: &[&str] = &[
  "publicly_accessible",
  "associate_public_ip_address",
  "map_public_ip_on_launch",
  "internal",
  "acl",
  "cidr_blocks",
  "ipv6_cidr_blocks",
];

/// Exposure attributes plus the ones that embed rules or policies.
const WATCHED_UNKNOWN: &[&str] = &[
  "publicly_accessible",
  "associate_public_ip_address",
  "map_public_ip_on_launch",
  "internal",
  "acl",
  "cidr_blocks",
  "ipv6_cidr_blocks",
  "ingress",
  "egress",
  "policy",
  "document",
  "assume_role_policy",
];

pub struct NetworkExposure;

impl Rule for NetworkExposure {
  fn id(&self) -> &'static str {
    "network-exposure"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Create, ActionKind::Update, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    60
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if SECURITY_GROUP_TYPES.contains(&change.resource_type.as_str()) {
      return Ok(open_port_signals(change, ctx));
    }
    Ok(attribute_signal(change, ctx).into_iter().collect())
  }
}

fn open_port_signals(change: &ResourceChange, ctx: &RuleContext<'_>) -> Vec<Signal> {
  let mut seen = BTreeSet::new();
  let mut out = Vec::new();

  if change.resource_type == "aws_security_group_rule" {
    if change.after_known("type").and_then(Value::as_str) == Some("ingress") {
      let lookup = |k: &str| change.after_known(k);
      check_ingress(&lookup, change, ctx, &mut seen, &mut out);
    }
    return out;
  }

  let Some(Value::Array(rules)) = change.after_known("ingress") else {
    return out;
  };
  for rule in rules.iter().filter_map(Value::as_object) {
    let lookup = |k: &str| rule.get(k);
    check_ingress(&lookup, change, ctx, &mut seen, &mut out);
  }
  out
}

fn check_ingress<'v>(
  get: &dyn Fn(&str) -> Option<&'v Value>,
  change: &ResourceChange,
  ctx: &RuleContext<'_>,
  seen: &mut BTreeSet<i64>,
  out: &mut Vec<Signal>,
) {
  let cidrs: Vec<&str> = ["cidr_blocks", "ipv6_cidr_blocks"]
    .iter()
    .filter_map(|k| get(*k).and_then(Value::as_array))
    .flatten()
    .filter_map(Value::as_str)
    .filter(|c| OPEN_CIDRS.contains(c))
    .collect();
  if cidrs.is_empty() {
    return;
  }

  let protocol = get("protocol").and_then(Value::as_str).unwrap_or("tcp");
  let all_ports = protocol == "-1" || protocol.eq_ignore_ascii_case("all");
  let from = get("from_port").and_then(as_int).unwrap_or(0);
  let to = get("to_port").and_then(as_int).unwrap_or(from);
  let open = cidrs.join(", ");

  for &(port, service) in DANGEROUS_PORTS {
    if !(all_ports || (from..=to).contains(&port)) || !seen.insert(port) {
      continue;
    }
    let mut signal = ctx
      .signal(
        change,
        format!(
          "{} port {} ({}) open to the internet ({}) on {}",
          service, port, protocol, open, change.address
        ),
      )
      .with_tags(&["security", "network"]);
    signal.recommendations = vec![
      format!("Restrict CIDR to specific IP ranges instead of {}", open),
      format!("Use a bastion host or VPN for {} access", service),
    ];
    out.push(signal);
  }
}

fn attribute_signal(change: &ResourceChange, ctx: &RuleContext<'_>) -> Option<Signal> {
  let changed: Vec<String> = if change.action == ActionKind::Create {
    // On create only an explicit opt-in to public access is notable.
    match change.after_known("publicly_accessible") {
      Some(Value::Bool(true)) => vec!["publicly_accessible = true".to_string()],
      _ => Vec::new(),
    }
  } else {
    EXPOSURE_ATTRIBUTES
      .iter()
      .map(|k| change.delta(k))
      .filter(|d| d.changed && !d.becomes_unknown())
      .map(|d| format!("{}: {} -> {}", d.key, render_value(d.before), render_value(d.after)))
      .collect()
  };
  if changed.is_empty() {
    return None;
  }
  let signal = ctx
    .signal_weighted(
      change,
      ctx.fraction(5, 6),
      format!("exposure settings of {} change ({})", change.address, preview(&changed, 3)),
    )
    .with_tags(&["security", "network"])
    .with_recommendations(&["Confirm the resource is meant to be reachable from the new network scope"]);
  Some(signal)
}

/// Exposure-relevant attributes whose final value is unknown until apply.
pub struct UnknownExposure;

impl Rule for UnknownExposure {
  fn id(&self) -> &'static str {
    "unknown-exposure"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Update, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    10
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    let unknown: Vec<&str> = WATCHED_UNKNOWN
      .iter()
      .copied()
      .filter(|k| change.delta(k).becomes_unknown())
      .collect();
    if unknown.is_empty() {
      return Ok(Vec::new());
    }
    let signal = ctx
      .signal(
        change,
        format!(
          "{} of {} will only be known after apply, so its exposure cannot be checked",
          preview(&unknown, 5),
          change.address
        ),
      )
      .with_tags(&["security"])
      .with_recommendations(&["Re-run the analysis against a plan where these values are resolved"]);
    Ok(vec![signal])
  }
}
