//! Risk aggregation: signals -> per-resource verdicts -> plan verdict.

use crate::config::Scoring;
use crate::model::ResourceChange;
use crate::types::*;

/// Sum of signal weights, clamped to `max_score`.
pub fn compute_score(signals: &[Signal], scoring: &Scoring) -> u32 {
  let raw: u64 = signals.iter().map(|s| u64::from(s.weight)).sum();
  scoring.clamp(raw)
}

/// Verdict for one resource. Signal order is kept as evaluated.
pub fn resource_verdict(change: &ResourceChange, signals: Vec<Signal>, scoring: &Scoring) -> Verdict {
  let score = compute_score(&signals, scoring);
  Verdict {
    address: change.address.clone(),
    resource_type: change.resource_type.clone(),
    action: change.action,
    tier: scoring.tier_for(score),
    score,
    signals,
  }
}

/// Descending score, then address ascending.
pub fn rank(verdicts: &mut [Verdict]) {
  verdicts.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.address.cmp(&b.address)));
}

/// Highest tier among the verdicts; `None` when nothing changes.
pub fn overall_tier(verdicts: &[Verdict], counts: &ActionCounts) -> Tier {
  if counts.changes() == 0 {
    return Tier::None;
  }
  verdicts.iter().map(|v| v.tier).max().unwrap_or_default()
}

pub fn plan_verdict(mut verdicts: Vec<Verdict>, counts: ActionCounts) -> PlanVerdict {
  rank(&mut verdicts);
  PlanVerdict {
    overall: overall_tier(&verdicts, &counts),
    counts,
    resources: verdicts,
  }
}
