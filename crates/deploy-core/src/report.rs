use serde::Serialize;

use crate::pipeline::{FaultReport, PipelineStatus};

/// Final state of one pipeline, captured once it is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    pub status: PipelineStatus,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultReport>,
}

/// Aggregate outcome of one supervisor run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.targets
            .iter()
            .all(|target| target.status == PipelineStatus::Done)
    }

    pub fn faulted(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|target| target.status == PipelineStatus::Faulted)
    }
}
