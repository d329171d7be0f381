//! Stable digests: redacted sensitive values and report ids.

use std::fmt;

use serde_json::Value;

use crate::types::PlanVerdict;

/// blake3 digest standing in for a sensitive value.
///
/// Lets the classifier tell whether a sensitive attribute changed without
/// keeping the literal. Never rendered.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensitiveDigest(blake3::Hash);

impl fmt::Debug for SensitiveDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SensitiveDigest(..)")
  }
}

/// Digest a JSON value. serde_json maps are key-ordered, so the encoding is
/// canonical.
pub fn sensitive_digest(value: &Value) -> SensitiveDigest {
  let mut hasher = blake3::Hasher::new();
  hasher.update(b"sensitive|");
  hasher.update(value.to_string().as_bytes());
  SensitiveDigest(hasher.finalize())
}

/// Compute a stable report id from the ranked verdicts.
///
/// Key components: overall tier + counts + every verdict's address, action,
/// score and signals, in report order.
pub fn report_id(verdict: &PlanVerdict) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(verdict.overall.as_str().as_bytes());
  let c = &verdict.counts;
  for n in [c.create, c.update, c.delete, c.replace, c.read, c.no_op] {
    hasher.update(b"|");
    hasher.update(&(n as u64).to_le_bytes());
  }

  for v in &verdict.resources {
    hasher.update(b"|");
    hasher.update(v.address.as_bytes());
    hasher.update(b":");
    hasher.update(v.action.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(&v.score.to_le_bytes());
    for s in &v.signals {
      hasher.update(b"|");
      hasher.update(s.rule.as_bytes());
      hasher.update(b":");
      hasher.update(&s.weight.to_le_bytes());
      hasher.update(b":");
      hasher.update(s.reason.as_bytes());
    }
  }

  let hex = hasher.finalize().to_hex();
  format!("rpt-{}", &hex[..16])
}
