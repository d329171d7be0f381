//! Destructive changes to resources the caller marked production-critical.

use crate::error::RuleFault;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::{Rule, RuleContext};
use crate::types::Signal;

pub struct ProductionCritical;

impl Rule for ProductionCritical {
  fn id(&self) -> &'static str {
    "production-critical"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    &[ActionKind::Delete, ActionKind::Replace]
  }

  fn default_weight(&self) -> u32 {
    85
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    let Some(entry) = ctx.classification.critical_match(&change.address) else {
      return Ok(Vec::new());
    };
    let matched = if entry == change.address {
      String::new()
    } else {
      format!(" (via {})", entry)
    };
    let signal = ctx
      .signal(
        change,
        format!(
          "{} is classified production-critical{} and will be {}",
          change.address,
          matched,
          change.action.participle()
        ),
      )
      .with_tags(&["critical"])
      .with_recommendations(&[
        "Get explicit sign-off before applying destructive changes to production-critical resources",
        "Schedule the apply inside a maintenance window",
      ]);
    Ok(vec![signal])
  }
}
