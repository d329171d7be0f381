//! Rule engine: the `Rule` capability, its evaluation context and the ordered
//! registry the engine runs.
//!
//! Rules are independent and stateless. Each one looks at a single
//! `ResourceChange` (plus the per-run lookups in `RuleContext`) and returns
//! zero or more `Signal`s. Evaluation order is registration order.

use std::sync::Arc;

use serde_json::Value;

use crate::config::Config;
use crate::error::RuleFault;
use crate::model::{ActionKind, Classification, DependencyIndex, ResourceChange};
use crate::types::Signal;

mod capacity;
mod critical;
mod database;
mod destroy;
mod exposure;
mod network;
mod policy;
mod replacement;
mod sensitive;

pub use capacity::CapacityReduction;
pub use critical::ProductionCritical;
pub use database::EngineVersion;
pub use destroy::{GenericDestroy, KmsDestroy, StatefulDestroy};
pub use exposure::{NetworkExposure, UnknownExposure};
pub use network::NetworkInfra;
pub use policy::AccessPolicy;
pub use replacement::ReplaceDependents;
pub use sensitive::SensitiveChange;

/// One risk heuristic.
pub trait Rule: Send + Sync {
  /// Stable identifier, unique within a `RuleSet`.
  fn id(&self) -> &'static str;

  /// Actions this rule looks at. Others are skipped without calling `evaluate`.
  fn applies_to(&self) -> &'static [ActionKind];

  fn default_weight(&self) -> u32;

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault>;
}

/// Read-only inputs shared by every rule in one run.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
  pub rule: &'static str,
  /// Effective weight for `rule` (default or overridden).
  pub weight: u32,
  pub dependencies: &'a DependencyIndex,
  pub classification: &'a Classification,
  pub config: &'a Config,
}

impl<'a> RuleContext<'a> {
  pub fn new(
    dependencies: &'a DependencyIndex,
    classification: &'a Classification,
    config: &'a Config,
  ) -> Self {
    Self {
      rule: "",
      weight: 0,
      dependencies,
      classification,
      config,
    }
  }

  /// The same context bound to one registry entry.
  pub fn for_rule(self, rule: &'static str, weight: u32) -> Self {
    Self { rule, weight, ..self }
  }

  /// A signal at the full rule weight.
  pub fn signal(&self, change: &ResourceChange, reason: impl Into<String>) -> Signal {
    self.signal_weighted(change, self.weight, reason)
  }

  pub fn signal_weighted(&self, change: &ResourceChange, weight: u32, reason: impl Into<String>) -> Signal {
    Signal {
      rule: self.rule.to_string(),
      weight,
      reason: reason.into(),
      address: change.address.clone(),
      tags: Vec::new(),
      recommendations: Vec::new(),
      details: Vec::new(),
    }
  }

  /// `weight * num / den`, for findings weaker than the rule's main one.
  pub fn fraction(&self, num: u32, den: u32) -> u32 {
    if den == 0 {
      return 0;
    }
    (u64::from(self.weight) * u64::from(num) / u64::from(den)) as u32
  }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Entry {
  rule: Arc<dyn Rule>,
  weight: u32,
}

/// Ordered rule registry, unique by id.
#[derive(Clone, Default)]
pub struct RuleSet {
  entries: Vec<Entry>,
}

impl std::fmt::Debug for RuleSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list()
      .entries(self.entries.iter().map(|e| (e.rule.id(), e.weight)))
      .finish()
  }
}

impl RuleSet {
  pub fn empty() -> Self {
    Self::default()
  }

  /// The default catalog, most specific rules first.
  pub fn builtin() -> Self {
    let mut set = Self::empty();
    set
      .register(ProductionCritical)
      .register(StatefulDestroy)
      .register(ReplaceDependents)
      .register(NetworkExposure)
      .register(AccessPolicy)
      .register(KmsDestroy)
      .register(NetworkInfra)
      .register(EngineVersion)
      .register(CapacityReduction)
      .register(SensitiveChange)
      .register(UnknownExposure)
      .register(GenericDestroy);
    set
  }

  /// Add a rule at its default weight.
  pub fn register<R: Rule + 'static>(&mut self, rule: R) -> &mut Self {
    let weight = rule.default_weight();
    self.register_weighted(rule, weight)
  }

  /// Add a rule. An existing rule with the same id is replaced in place.
  pub fn register_weighted<R: Rule + 'static>(&mut self, rule: R, weight: u32) -> &mut Self {
    let entry = Entry {
      rule: Arc::new(rule),
      weight,
    };
    match self.position(entry.rule.id()) {
      Some(i) => self.entries[i] = entry,
      None => self.entries.push(entry),
    }
    self
  }

  /// Override the weight of a registered rule. `false` if the id is unknown.
  pub fn set_weight(&mut self, id: &str, weight: u32) -> bool {
    match self.position(id) {
      Some(i) => {
        self.entries[i].weight = weight;
        true
      }
      None => false,
    }
  }

  pub fn remove(&mut self, id: &str) -> bool {
    match self.position(id) {
      Some(i) => {
        self.entries.remove(i);
        true
      }
      None => false,
    }
  }

  pub fn weight(&self, id: &str) -> Option<u32> {
    self.position(id).map(|i| self.entries[i].weight)
  }

  pub fn ids(&self) -> Vec<&'static str> {
    self.entries.iter().map(|e| e.rule.id()).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Rules with their effective weights, in evaluation order.
  pub fn iter(&self) -> impl Iterator<Item = (&dyn Rule, u32)> + '_ {
    self.entries.iter().map(|e| (e.rule.as_ref(), e.weight))
  }

  fn position(&self, id: &str) -> Option<usize> {
    self.entries.iter().position(|e| e.rule.id() == id)
  }
}

// ---------------------------------------------------------------------------
// Helpers shared by rule implementations
// ---------------------------------------------------------------------------

/// Integer view of a JSON number (floats truncate).
pub(crate) fn as_int(v: &Value) -> Option<i64> {
  v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// A string or an array of strings (policy `Action`, `Resource`).
pub(crate) fn string_list(v: &Value) -> Vec<&str> {
  match v {
    Value::String(s) => vec![s.as_str()],
    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
    _ => Vec::new(),
  }
}

/// `a, b, c and 2 more`.
pub(crate) fn preview<S: AsRef<str>>(items: &[S], max: usize) -> String {
  let shown: Vec<&str> = items.iter().take(max).map(|s| s.as_ref()).collect();
  let mut out = shown.join(", ");
  if items.len() > max {
    out.push_str(&format!(" and {} more", items.len() - max));
  }
  out
}

/// ` (replacement forced by: engine, tags.Name)` or empty.
pub(crate) fn replacement_cause(change: &ResourceChange) -> String {
  if change.action != ActionKind::Replace || change.replace_paths.is_empty() {
    return String::new();
  }
  format!(" (replacement forced by: {})", preview(&change.replace_paths, 5))
}
