//! Normalized plan model: typed resource changes, attribute values and the
//! per-run lookups rules use (dependents, production-critical classification).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::{self, SensitiveDigest};

// ---------------------------------------------------------------------------
// Action kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
  Create,
  Update,
  Delete,
  Replace,
  NoOp,
  Read,
}

impl ActionKind {
  /// Map the provisioning tool's action list. `None` for an empty or
  /// unrecognized list.
  pub fn from_actions(actions: &[String]) -> Option<Self> {
    let actions: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
    match actions.as_slice() {
      ["create"] => Some(Self::Create),
      ["update"] => Some(Self::Update),
      ["delete"] => Some(Self::Delete),
      ["read"] => Some(Self::Read),
      ["no-op"] => Some(Self::NoOp),
      ["delete", "create"] | ["create", "delete"] => Some(Self::Replace),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
      Self::Replace => "replace",
      Self::NoOp => "no-op",
      Self::Read => "read",
    }
  }

  /// Past participle used in explanations ("will be destroyed").
  pub fn participle(self) -> &'static str {
    match self {
      Self::Create => "created",
      Self::Update => "updated in place",
      Self::Delete => "destroyed",
      Self::Replace => "destroyed and recreated",
      Self::NoOp => "left unchanged",
      Self::Read => "read",
    }
  }

  pub fn is_destructive(self) -> bool {
    matches!(self, Self::Delete | Self::Replace)
  }

  /// Reads and no-ops never reach the rule engine.
  pub fn is_evaluated(self) -> bool {
    !matches!(self, Self::NoOp | Self::Read)
  }
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// One top-level attribute value as the plan reports it.
///
/// `Sensitive` keeps a digest only, so equality still works without the
/// literal ever being retained.
#[derive(Clone, PartialEq)]
pub enum AttrValue {
  Known(Value),
  Unknown,
  Sensitive(SensitiveDigest),
}

impl AttrValue {
  pub fn as_known(&self) -> Option<&Value> {
    match self {
      Self::Known(v) => Some(v),
      _ => None,
    }
  }

  pub fn is_unknown(&self) -> bool {
    matches!(self, Self::Unknown)
  }

  pub fn is_sensitive(&self) -> bool {
    matches!(self, Self::Sensitive(_))
  }
}

impl fmt::Debug for AttrValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Known(v) => f.debug_tuple("Known").field(v).finish(),
      Self::Unknown => f.write_str("Unknown"),
      Self::Sensitive(_) => f.write_str("Sensitive(<redacted>)"),
    }
  }
}

/// Before/after view of one attribute, computed on demand.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDelta<'a> {
  pub key: &'a str,
  pub before: Option<&'a AttrValue>,
  pub after: Option<&'a AttrValue>,
  pub changed: bool,
}

impl<'a> AttributeDelta<'a> {
  fn new(key: &'a str, before: Option<&'a AttrValue>, after: Option<&'a AttrValue>) -> Self {
    Self {
      key,
      before,
      after,
      changed: values_differ(before, after),
    }
  }

  pub fn is_sensitive(&self) -> bool {
    self.before.is_some_and(AttrValue::is_sensitive) || self.after.is_some_and(AttrValue::is_sensitive)
  }

  pub fn becomes_unknown(&self) -> bool {
    self.after.is_some_and(AttrValue::is_unknown)
  }
}

/// Absent and JSON `null` both mean "not set". Unknown is always a change.
fn values_differ(before: Option<&AttrValue>, after: Option<&AttrValue>) -> bool {
  match (before, after) {
    (Some(AttrValue::Unknown), _) | (_, Some(AttrValue::Unknown)) => true,
    (Some(AttrValue::Known(b)), Some(AttrValue::Known(a))) => b != a,
    (None, Some(AttrValue::Known(v))) | (Some(AttrValue::Known(v)), None) => !v.is_null(),
    (None, None) => false,
    (b, a) => digest_or_null(b) != digest_or_null(a),
  }
}

fn digest_or_null(value: Option<&AttrValue>) -> SensitiveDigest {
  match value {
    Some(AttrValue::Sensitive(d)) => *d,
    Some(AttrValue::Known(v)) => fingerprint::sensitive_digest(v),
    _ => fingerprint::sensitive_digest(&Value::Null),
  }
}

// ---------------------------------------------------------------------------
// Resource change
// ---------------------------------------------------------------------------

/// Canonical, immutable record of one planned resource change.
#[derive(Debug, Clone)]
pub struct ResourceChange {
  /// Position of the source entry in `resource_changes`.
  pub index: usize,
  pub address: String,
  pub resource_type: String,
  pub name: String,
  pub module_path: Option<String>,
  pub provider: Option<String>,
  pub data_source: bool,
  pub action: ActionKind,
  pub before: BTreeMap<String, AttrValue>,
  pub after: BTreeMap<String, AttrValue>,
  pub forces_replacement: bool,
  /// Attribute paths the provider reported as forcing replacement.
  pub replace_paths: Vec<String>,
  pub depends_on: BTreeSet<String>,
}

impl ResourceChange {
  pub fn delta<'a>(&'a self, key: &'a str) -> AttributeDelta<'a> {
    AttributeDelta::new(key, self.before.get(key), self.after.get(key))
  }

  /// All attributes present on either side, in key order.
  pub fn deltas(&self) -> impl Iterator<Item = AttributeDelta<'_>> {
    let keys: BTreeSet<&str> = self
      .before
      .keys()
      .chain(self.after.keys())
      .map(|k| k.as_str())
      .collect();
    keys
      .into_iter()
      .map(move |k| AttributeDelta::new(k, self.before.get(k), self.after.get(k)))
  }

  pub fn changed_deltas(&self) -> impl Iterator<Item = AttributeDelta<'_>> {
    self.deltas().filter(|d| d.changed)
  }

  pub fn has_effective_change(&self) -> bool {
    self.deltas().any(|d| d.changed)
  }

  pub fn before_known(&self, key: &str) -> Option<&Value> {
    self.before.get(key).and_then(AttrValue::as_known)
  }

  pub fn after_known(&self, key: &str) -> Option<&Value> {
    self.after.get(key).and_then(AttrValue::as_known)
  }
}

/// Strip a trailing instance key: `aws_instance.web[0]` -> `aws_instance.web`.
pub fn base_address(address: &str) -> &str {
  if address.ends_with(']') {
    if let Some(open) = address.rfind('[') {
      return &address[..open];
    }
  }
  address
}

// ---------------------------------------------------------------------------
// Per-run lookups
// ---------------------------------------------------------------------------

/// Reverse `depends_on` edges for one run: address -> resources depending on it.
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
  dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyIndex {
  pub fn build(changes: &[ResourceChange]) -> Self {
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for change in changes {
      for dep in &change.depends_on {
        if dep != &change.address {
          dependents
            .entry(dep.clone())
            .or_default()
            .insert(change.address.clone());
        }
      }
    }
    Self { dependents }
  }

  /// Resources depending on `address` or on its base address, sorted.
  pub fn dependents_of(&self, address: &str) -> Vec<&str> {
    let base = base_address(address);
    let mut out: BTreeSet<&str> = BTreeSet::new();
    for key in [address, base] {
      if let Some(set) = self.dependents.get(key) {
        out.extend(set.iter().map(|s| s.as_str()).filter(|s| *s != address));
      }
    }
    out.into_iter().collect()
  }

  pub fn dependent_count(&self, address: &str) -> usize {
    self.dependents_of(address).len()
  }
}

/// External classification input: which resources are production-critical.
///
/// Entries match an address exactly or as a prefix ending at a `.` or `[`
/// boundary, so `module.prod` covers everything inside that module.
#[derive(Debug, Clone, Default)]
pub struct Classification {
  critical: BTreeSet<String>,
}

impl Classification {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_critical(mut self, address_or_prefix: impl Into<String>) -> Self {
    self.critical.insert(address_or_prefix.into());
    self
  }

  pub fn is_empty(&self) -> bool {
    self.critical.is_empty()
  }

  /// The most specific entry matching `address`, if any.
  pub fn critical_match(&self, address: &str) -> Option<&str> {
    self
      .critical
      .iter()
      .filter(|entry| {
        address == entry.as_str()
          || (address.starts_with(entry.as_str())
            && matches!(address.as_bytes().get(entry.len()), Some(&b'.') | Some(&b'[')))
      })
      .max_by_key(|entry| entry.len())
      .map(|s| s.as_str())
  }
}
