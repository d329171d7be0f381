//! IAM and bucket policies: wildcard grants, escalation actions and S3
//! public-access-block protections being switched off.

use serde_json::Value;

use crate::error::RuleFault;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{string_list, Rule, RuleContext};
use crate::types::Signal;

const POLICY_TYPES: &[&str] = &[
  "aws_iam_policy",
  "aws_iam_role_policy",
  "aws_iam_user_policy",
  "aws_iam_group_policy",
  "aws_s3_bucket_policy",
  "aws_s3_bucket_public_access_block",
];

const PUBLIC_ACCESS_FLAGS: &[&str] = &[
  "block_public_acls",
  "block_public_policy",
  "ignore_public_acls",
  "restrict_public_buckets",
];

const ESCALATION_ACTIONS: &[&str] = &["iam:passrole", "sts:assumerole"];

pub struct AccessPolicy;

impl Rule for AccessPolicy {
  fn id(&self) -> &'static str {
    "access-policy"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Create, ActionKind::Update, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    60
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if !POLICY_TYPES.contains(&change.resource_type.as_str()) {
      return Ok(Vec::new());
    }

    let mut out = Vec::new();
    if let Some(doc) = policy_document(change)? {
      analyze_document(&doc, change, ctx, &mut out);
    }
    if change.resource_type == "aws_s3_bucket_public_access_block" {
      out.extend(public_access_block(change, ctx));
    }

    // Statements often repeat the same grant; one signal per finding.
    let mut seen = std::collections::HashSet::new();
    out.retain(|s| seen.insert(s.reason.clone()));
    Ok(out)
  }
}

/// The policy JSON from `policy` or `document`, if known and present.
fn policy_document(change: &ResourceChange) -> Result<Option<Value>, RuleFault> {
  for key in ["policy", "document"] {
    match change.after_known(key) {
      Some(Value::String(s)) if !s.trim().is_empty() => {
        return serde_json::from_str(s).map(Some).map_err(|e| {
          RuleFault::new(format!("{} of {} is not valid policy JSON: {}", key, change.address, e))
        });
      }
      Some(v @ Value::Object(_)) => return Ok(Some(v.clone())),
      _ => {}
    }
  }
  Ok(None)
}

fn analyze_document(doc: &Value, change: &ResourceChange, ctx: &RuleContext<'_>, out: &mut Vec<Signal>) {
  let statements: Vec<&Value> = match doc.get("Statement") {
    Some(Value::Array(items)) => items.iter().collect(),
    Some(one @ Value::Object(_)) => vec![one],
    _ => return,
  };
  let recs_least_privilege = &["Restrict Action to specific API calls following least-privilege"];

  for stmt in statements.into_iter().take(ctx.config.max_policy_statements) {
    let effect = stmt.get("Effect").and_then(Value::as_str).unwrap_or("Allow");
    if effect.eq_ignore_ascii_case("deny") {
      continue;
    }

    for action in stmt.get("Action").map(string_list).unwrap_or_default() {
      if action == "*" {
        out.push(
          ctx
            .signal(
              change,
              format!("wildcard Action \"*\" in policy on {} allows every API action", change.address),
            )
            .with_tags(&["security"])
            .with_recommendations(&[
              "Restrict Action to specific API calls following least-privilege",
              "Use IAM Access Analyzer to scope down permissions",
            ]),
        );
      } else if action.ends_with(":*") {
        out.push(
          ctx
            .signal_weighted(
              change,
              ctx.fraction(5, 6),
              format!(
                "wildcard service Action \"{}\" in policy on {} allows every action of that service",
                action, change.address
              ),
            )
            .with_tags(&["security"])
            .with_recommendations(recs_least_privilege),
        );
      }

      if ESCALATION_ACTIONS.contains(&action.to_ascii_lowercase().as_str()) {
        out.push(
          ctx
            .signal_weighted(
              change,
              ctx.fraction(5, 6),
              format!(
                "action \"{}\" in policy on {} carries privilege escalation risk",
                action, change.address
              ),
            )
            .with_tags(&["security"])
            .with_recommendations(&[
              "Restrict Resource to specific role ARNs",
              "Add conditions to limit scope",
            ]),
        );
      }
    }

    if stmt
      .get("Resource")
      .map(string_list)
      .unwrap_or_default()
      .contains(&"*")
    {
      out.push(
        ctx
          .signal_weighted(
            change,
            ctx.fraction(5, 6),
            format!("wildcard Resource \"*\" in policy on {} applies to every resource", change.address),
          )
          .with_tags(&["security"])
          .with_recommendations(&["Restrict Resource to specific ARNs"]),
      );
    }
  }
}

fn public_access_block(change: &ResourceChange, ctx: &RuleContext<'_>) -> Option<Signal> {
  let disabled: Vec<&str> = PUBLIC_ACCESS_FLAGS
    .iter()
    .copied()
    .filter(|f| change.after_known(f) == Some(&Value::Bool(false)))
    .collect();
  if disabled.is_empty() {
    return None;
  }
  let signal = ctx
    .signal(
      change,
      format!(
        "S3 public access protections weakened on {}: {} set to false",
        change.address,
        disabled.join(", ")
      ),
    )
    .with_tags(&["security"])
    .with_recommendations(&[
      "Keep every block_public_* flag and restrict_public_buckets set to true",
      "Review the bucket policy for unintended public access",
    ]);
  Some(signal)
}
