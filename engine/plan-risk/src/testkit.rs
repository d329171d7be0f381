//! Builders shared by unit tests.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::fingerprint;
use crate::model::{ActionKind, AttrValue, ResourceChange};

/// Bare change: type taken from the address, no attributes.
pub fn change(address: &str, action: ActionKind) -> ResourceChange {
  let resource_type = address.split('.').next().unwrap_or_default().to_string();
  ResourceChange {
    index: 0,
    address: address.to_string(),
    resource_type,
    name: "x".to_string(),
    module_path: None,
    provider: None,
    data_source: false,
    action,
    before: BTreeMap::new(),
    after: BTreeMap::new(),
    forces_replacement: action == ActionKind::Replace,
    replace_paths: Vec::new(),
    depends_on: BTreeSet::new(),
  }
}

pub struct ChangeBuilder(ResourceChange);

pub fn resource(address: &str, action: ActionKind) -> ChangeBuilder {
  ChangeBuilder(change(address, action))
}

impl ChangeBuilder {
  pub fn before(mut self, key: &str, value: Value) -> Self {
    self.0.before.insert(key.into(), AttrValue::Known(value));
    self
  }

  pub fn after(mut self, key: &str, value: Value) -> Self {
    self.0.after.insert(key.into(), AttrValue::Known(value));
    self
  }

  pub fn after_unknown(mut self, key: &str) -> Self {
    self.0.after.insert(key.into(), AttrValue::Unknown);
    self
  }

  pub fn before_sensitive(mut self, key: &str, value: Value) -> Self {
    self
      .0
      .before
      .insert(key.into(), AttrValue::Sensitive(fingerprint::sensitive_digest(&value)));
    self
  }

  pub fn after_sensitive(mut self, key: &str, value: Value) -> Self {
    self
      .0
      .after
      .insert(key.into(), AttrValue::Sensitive(fingerprint::sensitive_digest(&value)));
    self
  }

  pub fn depends_on(mut self, address: &str) -> Self {
    self.0.depends_on.insert(address.into());
    self
  }

  pub fn replace_path(mut self, path: &str) -> Self {
    self.0.replace_paths.push(path.into());
    self
  }

  pub fn build(self) -> ResourceChange {
    self.0
  }
}
