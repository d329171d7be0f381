//! Change classifier: raw plan entries -> canonical `ResourceChange` records.
//!
//! Malformed entries are skipped with a diagnostic; the rest of the plan is
//! still classified.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::fingerprint;
use crate::model::{base_address, ActionKind, AttrValue, ResourceChange};
use crate::types::*;

/// Output of one classification pass.
#[derive(Debug, Default)]
pub struct Classified {
  /// Every valid change (including no-ops and reads), in source order.
  pub changes: Vec<ResourceChange>,
  pub counts: ActionCounts,
  pub diagnostics: Vec<Diagnostic>,
  /// Entries dropped as malformed.
  pub skipped: usize,
}

/// Parse plan JSON (`terraform show -json <planfile>` output).
pub fn parse_plan(input: &str) -> Result<RawPlan, AnalysisError> {
  if input.trim().is_empty() {
    return Err(AnalysisError::EmptyInput);
  }
  Ok(serde_json::from_str(input)?)
}

/// Classify every entry of a plan.
pub fn classify(plan: &RawPlan, config: &Config) -> Classified {
  let mut out = Classified::default();
  let state_deps = state_dependencies(plan.prior_state.as_ref(), config, &mut out.diagnostics);
  let mut positions: HashMap<String, usize> = HashMap::new();

  for (index, entry) in plan.resource_changes.iter().enumerate() {
    let raw = match entry {
      RawEntry::Change(raw) => raw,
      RawEntry::Invalid(_) => {
        let diag = Diagnostic::new(DiagnosticKind::MalformedPlan, "entry is not a resource change object")
          .at_index(index);
        skip(&mut out, diag);
        continue;
      }
    };

    let change = match classify_entry(index, raw, config, &mut out.diagnostics) {
      Ok(c) => c,
      Err(e) => {
        let mut diag = Diagnostic::new(DiagnosticKind::MalformedPlan, e.to_string()).at_index(index);
        if let Some(addr) = raw.address.as_deref().filter(|a| !a.is_empty()) {
          diag = diag.with_address(addr);
        }
        skip(&mut out, diag);
        continue;
      }
    };

    match positions.get(&change.address).copied() {
      None => {
        positions.insert(change.address.clone(), out.changes.len());
        out.changes.push(change);
      }
      Some(pos) => {
        let existing = &mut out.changes[pos];
        if !merge_replacement(existing, change) {
          let diag = Diagnostic::new(
            DiagnosticKind::MalformedPlan,
            "duplicate address: an earlier entry already covers this resource",
          )
          .at_index(index)
          .with_address(existing.address.clone());
          skip(&mut out, diag);
        }
      }
    }
  }

  for change in &mut out.changes {
    let deps = state_deps
      .get(&change.address)
      .or_else(|| state_deps.get(base_address(&change.address)));
    if let Some(deps) = deps {
      change.depends_on.extend(deps.iter().filter(|d| **d != change.address).cloned());
    }
    out.counts.record(change.action);
  }

  debug!(
    valid = out.changes.len(),
    skipped = out.skipped,
    "classified plan entries"
  );
  out
}

fn skip(out: &mut Classified, diag: Diagnostic) {
  warn!(index = ?diag.index, address = ?diag.address, "{}", diag.message);
  out.skipped += 1;
  out.diagnostics.push(diag);
}

/// Validate and normalize a single entry.
pub fn classify_entry(
  index: usize,
  raw: &RawResourceChange,
  config: &Config,
  diagnostics: &mut Vec<Diagnostic>,
) -> Result<ResourceChange, AnalysisError> {
  let address = raw
    .address
    .as_deref()
    .map(str::trim)
    .filter(|a| !a.is_empty())
    .ok_or_else(|| AnalysisError::malformed("address", "must not be empty"))?;

  let change = raw
    .change
    .as_ref()
    .ok_or_else(|| AnalysisError::malformed("change", "missing"))?;

  let actions = change
    .actions
    .as_ref()
    .ok_or_else(|| AnalysisError::malformed("change.actions", "missing"))?;
  if actions.is_empty() {
    return Err(AnalysisError::malformed("change.actions", "must not be empty"));
  }
  let action = ActionKind::from_actions(actions).ok_or_else(|| {
    AnalysisError::malformed(
      "change.actions",
      &format!("unrecognized action list [{}]", actions.join(", ")),
    )
  })?;

  let parts = split_address(address);
  let resource_type = raw
    .resource_type
    .clone()
    .filter(|t| !t.is_empty())
    .or_else(|| parts.as_ref().map(|p| p.resource_type.clone()))
    .ok_or_else(|| AnalysisError::malformed("type", "missing and not derivable from the address"))?;
  let name = raw
    .name
    .clone()
    .filter(|n| !n.is_empty())
    .or_else(|| parts.as_ref().map(|p| p.name.clone()))
    .unwrap_or_default();
  let module_path = raw
    .module_address
    .clone()
    .filter(|m| !m.is_empty())
    .or_else(|| parts.as_ref().and_then(|p| p.module_path.clone()));
  let data_source =
    raw.mode.as_deref() == Some("data") || parts.as_ref().is_some_and(|p| p.data_source);

  let no_markers = Value::Null;
  let mut truncated = false;
  let before = attribute_map(
    &change.before,
    &change.before_sensitive,
    &no_markers,
    "change.before",
    config.max_attributes,
    &mut truncated,
  )?;
  let after = attribute_map(
    &change.after,
    &change.after_sensitive,
    &change.after_unknown,
    "change.after",
    config.max_attributes,
    &mut truncated,
  )?;
  if truncated {
    diagnostics.push(
      Diagnostic::new(
        DiagnosticKind::InputLimit,
        format!("attributes beyond the first {} were ignored", config.max_attributes),
      )
      .at_index(index)
      .with_address(address),
    );
  }

  let mut resource = ResourceChange {
    index,
    address: address.to_string(),
    resource_type,
    name,
    module_path,
    provider: raw.provider_name.clone().filter(|p| !p.is_empty()),
    data_source,
    action,
    before,
    after,
    forces_replacement: action == ActionKind::Replace,
    replace_paths: replace_paths(&change.replace_paths),
    depends_on: raw
      .depends_on
      .iter()
      .filter(|d| !d.is_empty() && d.as_str() != address)
      .cloned()
      .collect(),
  };

  if resource.action == ActionKind::Update && !resource.has_effective_change() {
    debug!(address = %resource.address, "update without effective delta classified as no-op");
    resource.action = ActionKind::NoOp;
  }

  Ok(resource)
}

/// A `delete` entry and a `create` entry on one address form a replacement.
fn merge_replacement(existing: &mut ResourceChange, incoming: ResourceChange) -> bool {
  let (before, after) = match (existing.action, incoming.action) {
    (ActionKind::Delete, ActionKind::Create) => (existing.before.clone(), incoming.after),
    (ActionKind::Create, ActionKind::Delete) => (incoming.before, existing.after.clone()),
    _ => return false,
  };
  debug!(address = %existing.address, "merged delete + create entries into a replacement");
  existing.action = ActionKind::Replace;
  existing.forces_replacement = true;
  existing.before = before;
  existing.after = after;
  existing.depends_on.extend(incoming.depends_on);
  for path in incoming.replace_paths {
    if !existing.replace_paths.contains(&path) {
      existing.replace_paths.push(path);
    }
  }
  true
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

enum Markers<'a> {
  Nothing,
  All,
  Keys(&'a Map<String, Value>),
}

impl<'a> Markers<'a> {
  fn from_value(v: &'a Value) -> Self {
    match v {
      Value::Bool(true) => Self::All,
      Value::Object(map) => Self::Keys(map),
      _ => Self::Nothing,
    }
  }

  fn marks(&self, key: &str) -> bool {
    match self {
      Self::Nothing => false,
      Self::All => true,
      Self::Keys(map) => map.get(key).is_some_and(contains_true),
    }
  }

  fn marked_keys(&self) -> impl Iterator<Item = &'a String> + '_ {
    let keys = match self {
      Self::Keys(map) => Some(map.iter().filter(|(_, v)| contains_true(v)).map(|(k, _)| k)),
      _ => None,
    };
    keys.into_iter().flatten()
  }
}

/// A marker counts if it is `true` or a nested structure containing `true`.
fn contains_true(v: &Value) -> bool {
  match v {
    Value::Bool(b) => *b,
    Value::Array(items) => items.iter().any(contains_true),
    Value::Object(map) => map.values().any(contains_true),
    _ => false,
  }
}

fn attribute_map(
  values: &Value,
  sensitive: &Value,
  unknown: &Value,
  field: &str,
  cap: usize,
  truncated: &mut bool,
) -> Result<BTreeMap<String, AttrValue>, AnalysisError> {
  let empty = Map::new();
  let object = match values {
    Value::Null => &empty,
    Value::Object(map) => map,
    _ => return Err(AnalysisError::malformed(field, "expected an object or null")),
  };
  let sensitive = Markers::from_value(sensitive);
  let unknown = Markers::from_value(unknown);

  // Unknown keys may be missing from the value object entirely.
  let mut keys: BTreeSet<&str> = object.keys().map(|k| k.as_str()).collect();
  keys.extend(unknown.marked_keys().map(|k| k.as_str()));
  if keys.len() > cap {
    *truncated = true;
  }

  let mut out = BTreeMap::new();
  for key in keys.into_iter().take(cap) {
    let raw = object.get(key).unwrap_or(&Value::Null);
    let value = if unknown.marks(key) {
      AttrValue::Unknown
    } else if sensitive.marks(key) {
      AttrValue::Sensitive(fingerprint::sensitive_digest(raw))
    } else {
      AttrValue::Known(raw.clone())
    };
    out.insert(key.to_string(), value);
  }
  Ok(out)
}

/// `[["engine"], ["tags", "Name"]]` -> `["engine", "tags.Name"]`.
fn replace_paths(raw: &Value) -> Vec<String> {
  let Value::Array(paths) = raw else {
    return Vec::new();
  };
  paths
    .iter()
    .filter_map(|p| p.as_array())
    .map(|segments| {
      segments
        .iter()
        .map(|seg| match seg {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
    })
    .filter(|p| !p.is_empty())
    .collect()
}

// ---------------------------------------------------------------------------
// Addresses and dependencies
// ---------------------------------------------------------------------------

/// Identity parts recovered from a resource address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
  pub module_path: Option<String>,
  pub data_source: bool,
  pub resource_type: String,
  pub name: String,
}

/// Parse `module.a[0].data.aws_x.y["k"]` style addresses.
pub fn split_address(address: &str) -> Option<AddressParts> {
  let segments = address_segments(address);
  let mut i = 0;
  let mut modules = Vec::new();
  while segments.get(i) == Some(&"module") {
    let name = segments.get(i + 1)?;
    modules.push(format!("module.{}", name));
    i += 2;
  }
  let data_source = segments.get(i) == Some(&"data");
  if data_source {
    i += 1;
  }
  let resource_type = *segments.get(i)?;
  let name = base_address(segments.get(i + 1)?);
  if resource_type.is_empty() || name.is_empty() || segments.len() != i + 2 {
    return None;
  }
  Some(AddressParts {
    module_path: if modules.is_empty() {
      None
    } else {
      Some(modules.join("."))
    },
    data_source,
    resource_type: resource_type.to_string(),
    name: name.to_string(),
  })
}

/// Split on `.` outside of `[...]` index keys (which may contain dots).
fn address_segments(address: &str) -> Vec<&str> {
  let mut segments = Vec::new();
  let mut depth = 0usize;
  let mut in_string = false;
  let mut start = 0;
  for (i, b) in address.bytes().enumerate() {
    match b {
      b'"' if depth > 0 => in_string = !in_string,
      b'[' if !in_string => depth += 1,
      b']' if !in_string => depth = depth.saturating_sub(1),
      b'.' if depth == 0 && !in_string => {
        segments.push(&address[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  segments.push(&address[start..]);
  segments
}

/// Walk `prior_state` modules (bounded depth) collecting `depends_on`.
fn state_dependencies(
  state: Option<&RawState>,
  config: &Config,
  diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<String, BTreeSet<String>> {
  let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
  let Some(root) = state
    .and_then(|s| s.values.as_ref())
    .and_then(|v| v.root_module.as_ref())
  else {
    return deps;
  };

  let mut stack: Vec<(&RawModule, usize)> = vec![(root, 0)];
  let mut depth_exceeded = false;
  while let Some((module, depth)) = stack.pop() {
    for r in &module.resources {
      if !r.address.is_empty() && !r.depends_on.is_empty() {
        deps
          .entry(r.address.clone())
          .or_default()
          .extend(r.depends_on.iter().filter(|d| !d.is_empty()).cloned());
      }
    }
    if depth >= config.max_dependency_depth {
      depth_exceeded |= !module.child_modules.is_empty();
      continue;
    }
    stack.extend(module.child_modules.iter().map(|m| (m, depth + 1)));
  }

  if depth_exceeded {
    let diag = Diagnostic::new(
      DiagnosticKind::InputLimit,
      format!(
        "prior_state modules nested deeper than {} levels were not read for dependencies",
        config.max_dependency_depth
      ),
    );
    warn!("{}", diag.message);
    diagnostics.push(diag);
  }
  deps
}
