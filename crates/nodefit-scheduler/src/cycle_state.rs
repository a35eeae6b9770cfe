use crate::{Result, SchedulerError};
use nodefit_core::ResourceVector;
use std::sync::OnceLock;

/// Key of the entry written at PreFilter
pub const PRE_FILTER_KEY: &str = "PreFilterNodeResourcesFit";
/// Key of the entry written at PreScore
pub const PRE_SCORE_KEY: &str = "PreScoreNodeResourcesFit";

/// Aggregated request of the pod being scheduled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreFilterState(pub ResourceVector);

/// Requested quantities in the order of the configured scoring resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreScoreState {
    pub pod_requests: Vec<i64>,
}

/// Per-attempt scratch space shared between the stages of one scheduling
/// attempt. Each slot is written once and may then be read concurrently.
#[derive(Debug, Default)]
pub struct CycleState {
    pre_filter: OnceLock<PreFilterState>,
    pre_score: OnceLock<PreScoreState>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_pre_filter(&self, state: PreFilterState) -> Result<()> {
        self.pre_filter
            .set(state)
            .map_err(|_| SchedulerError::internal_error(format!("{} written twice", PRE_FILTER_KEY)))
    }

    pub fn read_pre_filter(&self) -> Result<&PreFilterState> {
        self.pre_filter
            .get()
            .ok_or_else(|| SchedulerError::missing_cycle_state(PRE_FILTER_KEY))
    }

    pub fn write_pre_score(&self, state: PreScoreState) -> Result<()> {
        self.pre_score
            .set(state)
            .map_err(|_| SchedulerError::internal_error(format!("{} written twice", PRE_SCORE_KEY)))
    }

    pub fn read_pre_score(&self) -> Result<&PreScoreState> {
        self.pre_score
            .get()
            .ok_or_else(|| SchedulerError::missing_cycle_state(PRE_SCORE_KEY))
    }
}
