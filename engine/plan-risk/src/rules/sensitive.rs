//! Changes to sensitive attributes. Only attribute names are disclosed.

use crate::error::RuleFault;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{preview, Rule, RuleContext};
use crate::types::Signal;

pub struct SensitiveChange;

impl Rule for SensitiveChange {
  fn id(&self) -> &'static str {
    "sensitive-change"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Update, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    25
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    let names: Vec<&str> = change
      .changed_deltas()
      .filter(|d| d.is_sensitive())
      .map(|d| d.key)
      .collect();
    if names.is_empty() {
      return Ok(Vec::new());
    }
    let noun = if names.len() == 1 { "attribute" } else { "attributes" };
    let signal = ctx
      .signal(
        change,
        format!(
          "sensitive {} {} of {} will change (values hidden)",
          noun,
          preview(&names, 5),
          change.address
        ),
      )
      .with_tags(&["security"])
      .with_recommendations(&["Confirm the credential rotation is intended and consumers are updated"]);
    Ok(vec![signal])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::model::{Classification, DependencyIndex};
  use crate::testkit::resource;
  use serde_json::json;

  fn run(c: &ResourceChange) -> Vec<Signal> {
    let deps = DependencyIndex::default();
    let class = Classification::new();
    let config = Config::default();
    let ctx = RuleContext::new(&deps, &class, &config).for_rule("sensitive-change", 25);
    SensitiveChange.evaluate(c, &ctx).unwrap()
  }

  #[test]
  fn names_attribute_without_value() {
    let c = resource("aws_db_instance.main", ActionKind::Update)
      .before_sensitive("password", json!("old-hunter2"))
      .after_sensitive("password", json!("new-hunter2"))
      .build();
    let s = run(&c);
    assert_eq!(s.len(), 1);
    assert_eq!(s[0].reason, "sensitive attribute password of aws_db_instance.main will change (values hidden)");
    assert!(!s[0].reason.contains("hunter2"));
  }

  #[test]
  fn unchanged_secret_is_silent() {
    let c = resource("aws_db_instance.main", ActionKind::Update)
      .before_sensitive("password", json!("same"))
      .after_sensitive("password", json!("same"))
      .build();
    assert!(run(&c).is_empty());
  }
}
