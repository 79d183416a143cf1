use crate::errors::ErrorClass;
use crate::model::{StageName, StageOutcome, StageResult};

/// Per-submission pipeline state.
///
/// `Pending -> Inspecting -> Judging -> Checking -> Scored`, with `Disqualified`
/// (inspector only) and `Error` as terminal exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Inspecting,
    Judging,
    Checking,
    Scored,
    Disqualified,
    Error,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Scored | PipelineState::Disqualified | PipelineState::Error
        )
    }

    /// The stage executed in this state, if any.
    pub fn stage(self) -> Option<StageName> {
        match self {
            PipelineState::Inspecting => Some(StageName::Inspector),
            PipelineState::Judging => Some(StageName::Judge),
            PipelineState::Checking => Some(StageName::Checker),
            _ => None,
        }
    }

    pub fn start(self) -> Self {
        match self {
            PipelineState::Pending => PipelineState::Inspecting,
            other => other,
        }
    }

    /// Transition after the current stage finished with `class`
    /// (`None` for a clean OK).
    pub fn advance(self, class: Option<ErrorClass>) -> Self {
        match (self, class) {
            (s, _) if s.is_terminal() || s == PipelineState::Pending => s,
            (_, Some(ErrorClass::TransientInfra | ErrorClass::PermanentInfra)) => {
                PipelineState::Error
            }
            (PipelineState::Inspecting, Some(ErrorClass::Disqualifying)) => {
                PipelineState::Disqualified
            }
            // Only the inspector may disqualify.
            (_, Some(ErrorClass::Disqualifying)) => PipelineState::Error,
            (PipelineState::Inspecting, _) => PipelineState::Judging,
            (PipelineState::Judging, _) => PipelineState::Checking,
            (PipelineState::Checking, _) => PipelineState::Scored,
            (s, _) => s,
        }
    }
}

/// How a finished stage steers the pipeline.
pub fn classify(stage: &StageResult, disqualified: bool) -> Option<ErrorClass> {
    if disqualified {
        return Some(ErrorClass::Disqualifying);
    }
    match stage.outcome {
        StageOutcome::Ok | StageOutcome::Skipped => None,
        StageOutcome::Fail => Some(ErrorClass::GradedFail),
        StageOutcome::Error => Some(ErrorClass::PermanentInfra),
    }
}
