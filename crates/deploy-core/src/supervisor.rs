use std::fmt::Write as _;
use std::time::Duration;

use tracing::info;

use crate::pipeline::{DeploymentPipeline, PipelineHandle, PipelineStatus};
use crate::report::RunReport;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// True while at least one pipeline has not reached a terminal state.
pub fn any_in_progress(handles: &[PipelineHandle]) -> bool {
    handles.iter().any(|handle| !handle.status().is_terminal())
}

/// Starts a batch of pipelines and polls them to completion.
///
/// Pipelines share no mutable state and run in parallel; the supervisor only
/// reads their handles. It returns once every pipeline is terminal.
pub struct Supervisor {
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub async fn run(&self, pipelines: Vec<DeploymentPipeline>) -> RunReport {
        let mut handles = Vec::with_capacity(pipelines.len());
        let mut tasks = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let (handle, task) = pipeline.start();
            handles.push(handle);
            tasks.push(task);
        }

        loop {
            info!(progress = %progress_line(&handles), "deploying");
            if !any_in_progress(&handles) {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        for task in tasks {
            // Pipelines capture their own faults; a join error here would
            // mean the task itself panicked.
            let _ = task.await;
        }

        RunReport {
            targets: handles.iter().map(PipelineHandle::report).collect(),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// One display line summarizing every pipeline: steps completed, status and
/// upload percentage while a transfer is in flight.
fn progress_line(handles: &[PipelineHandle]) -> String {
    let mut line = String::new();
    for handle in handles {
        if !line.is_empty() {
            line.push_str(", ");
        }
        let _ = write!(
            line,
            "{} {}/{} {}",
            handle.target_name(),
            handle.steps_completed(),
            handle.total_steps(),
            handle.status().label()
        );
        if handle.status() == PipelineStatus::Running {
            if let Some(sample) = handle.transfer_sample() {
                if sample.sent_bytes < sample.total_bytes {
                    let _ = write!(line, " (upload {:.1}%)", sample.percent());
                }
            }
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStatus;
    use crate::step::Step;
    use crate::testutil::{pipeline_with, MockPackager, ScriptedProvider};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_mixed_outcomes_independently() {
        let failing = Arc::new(ScriptedProvider {
            deny_publickey: true,
            ..ScriptedProvider::default()
        });
        let succeeding = Arc::new(ScriptedProvider::default());

        let supervisor = Supervisor::new(Duration::from_millis(10));
        let report = supervisor
            .run(vec![
                pipeline_with("rover-a", failing, MockPackager::default()),
                pipeline_with("rover-b", succeeding, MockPackager::default()),
            ])
            .await;

        assert!(!report.success());
        let by_name = |name: &str| {
            report
                .targets
                .iter()
                .find(|target| target.name == name)
                .expect("target report")
        };
        let faulted = by_name("rover-a");
        assert_eq!(faulted.status, PipelineStatus::Faulted);
        assert_eq!(faulted.steps_completed, 1);
        assert_eq!(faulted.fault.as_ref().expect("fault").step, Step::Connect);

        let done = by_name("rover-b");
        assert_eq!(done.status, PipelineStatus::Done);
        assert_eq!(done.steps_completed, done.total_steps);
        assert!(done.fault.is_none());
    }

    #[tokio::test]
    async fn all_done_run_succeeds() {
        let supervisor = Supervisor::new(Duration::from_millis(10));
        let report = supervisor
            .run(vec![pipeline_with(
                "rover-a",
                Arc::new(ScriptedProvider::default()),
                MockPackager::default(),
            )])
            .await;
        assert!(report.success());
        assert!(report.faulted().next().is_none());
    }

    #[tokio::test]
    async fn aggregate_predicate_follows_terminal_states() {
        let provider = Arc::new(ScriptedProvider {
            step_delay: Some(Duration::from_millis(2)),
            ..ScriptedProvider::default()
        });
        let pipeline = pipeline_with("rover-a", provider, MockPackager::default());
        let handle = pipeline.handle();

        // Not started yet: still counts as in progress.
        assert!(any_in_progress(std::slice::from_ref(&handle)));

        let (handle, task) = pipeline.start();
        assert!(any_in_progress(std::slice::from_ref(&handle)));
        task.await.expect("pipeline task");
        assert!(!any_in_progress(std::slice::from_ref(&handle)));
    }

    #[test]
    fn progress_line_lists_every_pipeline() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let pipeline = pipeline_with(
                "rover-a",
                Arc::new(ScriptedProvider::default()),
                MockPackager::default(),
            );
            let (handle, task) = pipeline.start();
            task.await.expect("pipeline task");
            let line = progress_line(std::slice::from_ref(&handle));
            assert_eq!(line, "rover-a 6/6 done");
        });
    }
}
