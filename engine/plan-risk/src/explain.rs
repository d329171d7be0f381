//! Human-readable explanations and the plan summary.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::{AttrValue, ResourceChange};
use crate::types::*;

/// Longest rendered JSON value before truncation.
const MAX_VALUE_CHARS: usize = 120;

/// Render an attribute value for an explanation. Sensitive values never
/// reach this function as literals.
pub fn render_value(value: Option<&AttrValue>) -> String {
  match value {
    None | Some(AttrValue::Known(Value::Null)) => "(not set)".to_string(),
    Some(AttrValue::Unknown) => "(known after apply)".to_string(),
    Some(AttrValue::Sensitive(_)) => "(sensitive)".to_string(),
    Some(AttrValue::Known(v)) => render_json(v),
  }
}

fn render_json(v: &Value) -> String {
  match v {
    Value::String(s) => format!("\"{}\"", truncate(s)),
    Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
      _ => n.to_string(),
    },
    other => truncate(&other.to_string()),
  }
}

fn truncate(s: &str) -> String {
  if s.chars().count() <= MAX_VALUE_CHARS {
    return s.to_string();
  }
  let head: String = s.chars().take(MAX_VALUE_CHARS).collect();
  format!("{}...", head)
}

/// Changed attributes of `change` as `key: before -> after`, in key order,
/// at most `max` lines plus a count of the rest.
pub fn render_deltas(change: &ResourceChange, max: usize) -> Vec<String> {
  let mut lines = Vec::new();
  let mut rest = 0usize;
  for d in change.changed_deltas() {
    if lines.len() < max {
      lines.push(format!("{}: {} -> {}", d.key, render_value(d.before), render_value(d.after)));
    } else {
      rest += 1;
    }
  }
  if rest > 0 {
    lines.push(format!("... and {} more changed attributes", rest));
  }
  lines
}

/// Explanation for one verdict: headline plus bullets, most severe first.
pub fn explain_verdict(verdict: &Verdict) -> ResourceExplanation {
  let headline = if verdict.signals.is_empty() {
    format!("{} will be {}; no risk signals", verdict.address, verdict.action.participle())
  } else {
    format!(
      "{} risk: {} will be {} (score {})",
      verdict.tier.as_str().to_uppercase(),
      verdict.address,
      verdict.action.participle(),
      verdict.score
    )
  };

  // Stable sort keeps rule order among equal weights.
  let mut ordered: Vec<&Signal> = verdict.signals.iter().collect();
  ordered.sort_by(|a, b| b.weight.cmp(&a.weight));

  let tags: BTreeSet<&str> = ordered
    .iter()
    .flat_map(|s| s.tags.iter().map(|t| t.as_str()))
    .collect();

  let mut recommendations: Vec<String> = Vec::new();
  for rec in ordered.iter().flat_map(|s| s.recommendations.iter()) {
    if !recommendations.contains(rec) {
      recommendations.push(rec.clone());
    }
  }

  let mut details: Vec<String> = Vec::new();
  for d in ordered.iter().flat_map(|s| s.details.iter()) {
    if !details.contains(d) {
      details.push(d.clone());
    }
  }

  ResourceExplanation {
    address: verdict.address.clone(),
    tier: verdict.tier,
    score: verdict.score,
    headline,
    bullets: ordered.iter().map(|s| s.reason.clone()).collect(),
    tags: tags.into_iter().map(String::from).collect(),
    recommendations,
    details,
  }
}

/// One-sentence plan summary plus the `top_n` highest-scoring resources.
pub fn summarize(plan: &PlanVerdict, top_n: usize) -> Summary {
  let c = &plan.counts;
  let parts: Vec<String> = [
    (c.create, "to create"),
    (c.update, "to update"),
    (c.delete, "to destroy"),
    (c.replace, "to replace"),
  ]
  .iter()
  .filter(|(n, _)| *n > 0)
  .map(|(n, label)| format!("{} {}", n, label))
  .collect();

  let top: Vec<TopResource> = plan
    .resources
    .iter()
    .filter(|v| v.score > 0)
    .take(top_n)
    .map(|v| TopResource {
      address: v.address.clone(),
      tier: v.tier,
      score: v.score,
    })
    .collect();

  let mut sentence = if parts.is_empty() {
    "Plan: no changes.".to_string()
  } else {
    format!("Plan: {}.", parts.join(", "))
  };
  sentence.push_str(&format!(" Overall risk: {}.", plan.overall));
  if !top.is_empty() {
    let named: Vec<String> = top
      .iter()
      .map(|t| format!("{} ({}, {})", t.address, t.tier, t.score))
      .collect();
    sentence.push_str(&format!(" Top risks: {}.", named.join(", ")));
  }

  Summary { sentence, top }
}
