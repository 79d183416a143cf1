use crate::config::ScoringConfig;
use crate::model::{StageName, StageOutcome, StageResult, Verdict};

pub fn final_verdict(stages: &[StageResult], disqualified: bool) -> Verdict {
    if disqualified {
        return Verdict::Disqualified;
    }
    if stages.iter().any(|s| s.outcome == StageOutcome::Error) {
        return Verdict::Error;
    }
    let all_ok = stages
        .iter()
        .filter(|s| s.outcome != StageOutcome::Skipped)
        .all(|s| s.outcome == StageOutcome::Ok);
    if all_ok {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

/// Component of one stage in `0.0..=1.0`; skipped and errored stages give 0.
fn component(stages: &[StageResult], stage: StageName, scale: f64) -> f64 {
    stages
        .iter()
        .find(|s| s.stage == stage)
        .filter(|s| matches!(s.outcome, StageOutcome::Ok | StageOutcome::Fail))
        .and_then(|s| s.score)
        .map(|v| (v / scale).clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// `100 × (w_judge × judge/100 + w_checks × fraction) / (w_judge + w_checks)`,
/// rounded to two decimals. Disqualified submissions score 0.
pub fn score(stages: &[StageResult], weights: &ScoringConfig, verdict: Verdict) -> f64 {
    if verdict == Verdict::Disqualified {
        return 0.0;
    }
    let total = weights.judge_weight + weights.checks_weight;
    if total <= 0.0 {
        return 0.0;
    }
    let judge = component(stages, StageName::Judge, 100.0);
    let checks = component(stages, StageName::Checker, 1.0);
    let raw = 100.0 * (weights.judge_weight * judge + weights.checks_weight * checks) / total;
    (raw * 100.0).round() / 100.0
}
