//! Process exit codes. Part of the CLI contract; batch graders key off them.

use tally_core::model::{EvaluationResult, Verdict};

pub const SUCCESS: i32 = 0; // Every submission passed
pub const GRADED_FAIL: i32 = 1; // At least one FAIL or DISQUALIFIED
pub const INTERNAL_ERROR: i32 = 2; // Config, input or setup error
pub const INFRA_ERROR: i32 = 3; // At least one evaluation ended in ERROR

/// ERROR outranks FAIL/DISQUALIFIED: an infrastructure failure means the grade
/// itself is not trustworthy.
pub fn for_results(results: &[EvaluationResult]) -> i32 {
    if results.iter().any(|r| r.final_verdict == Verdict::Error) {
        INFRA_ERROR
    } else if results
        .iter()
        .any(|r| matches!(r.final_verdict, Verdict::Fail | Verdict::Disqualified))
    {
        GRADED_FAIL
    } else {
        SUCCESS
    }
}
