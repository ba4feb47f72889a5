use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DeployError, FaultKind};
use crate::progress::{ProgressSample, TransferProgress};
use crate::provider::{Packager, SessionProvider, TransportSession, UploadRequest};
use crate::report::TargetReport;
use crate::shell::shell_escape;
use crate::step::Step;
use crate::target::DeploymentTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    NotStarted,
    Running,
    Done,
    Faulted,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Done | PipelineStatus::Faulted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::NotStarted => "not-started",
            PipelineStatus::Running => "running",
            PipelineStatus::Done => "done",
            PipelineStatus::Faulted => "faulted",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipelineStatus::NotStarted => 0,
            PipelineStatus::Running => 1,
            PipelineStatus::Done => 2,
            PipelineStatus::Faulted => 3,
        }
    }

    fn from_u8(value: u8) -> PipelineStatus {
        match value {
            0 => PipelineStatus::NotStarted,
            1 => PipelineStatus::Running,
            2 => PipelineStatus::Done,
            _ => PipelineStatus::Faulted,
        }
    }
}

/// Recorded once, on the Running -> Faulted transition.
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub step: Step,
    pub kind: FaultKind,
    pub error: String,
}

/// State shared between the executing pipeline task (single writer) and its
/// observers (supervisor, external monitors). Reads never block.
#[derive(Debug)]
struct PipelineShared {
    target_name: String,
    status: AtomicU8,
    steps_completed: AtomicUsize,
    fault: OnceLock<FaultReport>,
    transfer: TransferProgress,
}

impl PipelineShared {
    fn new(target_name: String) -> Self {
        Self {
            target_name,
            status: AtomicU8::new(PipelineStatus::NotStarted.as_u8()),
            steps_completed: AtomicUsize::new(0),
            fault: OnceLock::new(),
            transfer: TransferProgress::default(),
        }
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_running(&self) {
        self.steps_completed.store(0, Ordering::Release);
        self.status
            .store(PipelineStatus::Running.as_u8(), Ordering::Release);
    }

    /// Called after each successful step, only while Running.
    fn step_done(&self) {
        self.steps_completed.fetch_add(1, Ordering::AcqRel);
    }

    fn finish_done(&self) {
        self.status
            .store(PipelineStatus::Done.as_u8(), Ordering::Release);
    }

    fn finish_faulted(&self, report: FaultReport) {
        // The fault record is published before the terminal status so a
        // reader that observes Faulted always finds it.
        let _ = self.fault.set(report);
        self.status
            .store(PipelineStatus::Faulted.as_u8(), Ordering::Release);
    }
}

/// Read-only view of a pipeline's progress, cheap to clone and safe to poll
/// from any task.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    shared: Arc<PipelineShared>,
}

impl PipelineHandle {
    pub fn target_name(&self) -> &str {
        &self.shared.target_name
    }

    pub fn status(&self) -> PipelineStatus {
        self.shared.status()
    }

    pub fn steps_completed(&self) -> usize {
        self.shared.steps_completed.load(Ordering::Acquire)
    }

    pub fn total_steps(&self) -> usize {
        Step::count()
    }

    pub fn fault(&self) -> Option<FaultReport> {
        self.shared.fault.get().cloned()
    }

    /// Sample of the upload currently in flight, if any transfer has begun.
    pub fn transfer_sample(&self) -> Option<ProgressSample> {
        self.shared.transfer.sample()
    }

    pub fn report(&self) -> TargetReport {
        TargetReport {
            name: self.shared.target_name.clone(),
            status: self.status(),
            steps_completed: self.steps_completed(),
            total_steps: self.total_steps(),
            fault: self.fault(),
        }
    }
}

/// The per-target execution record: runs the six-step sequence on its own
/// task and publishes progress through its handle.
pub struct DeploymentPipeline {
    target: DeploymentTarget,
    provider: Arc<dyn SessionProvider>,
    packager: Arc<dyn Packager>,
    staging_dir: PathBuf,
    shared: Arc<PipelineShared>,
}

impl DeploymentPipeline {
    pub fn new(
        target: DeploymentTarget,
        provider: Arc<dyn SessionProvider>,
        packager: Arc<dyn Packager>,
        staging_dir: PathBuf,
    ) -> Self {
        let shared = Arc::new(PipelineShared::new(target.name.clone()));
        Self {
            target,
            provider,
            packager,
            staging_dir,
            shared,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Begin executing the step sequence on a new task.
    ///
    /// Consumes the pipeline: a pipeline can only ever be started once, and
    /// the execution record is never reused or reset.
    pub fn start(self) -> (PipelineHandle, JoinHandle<()>) {
        let handle = self.handle();
        self.shared.set_running();
        info!(
            event = "deploy.start",
            target = %self.target.name,
            host = %self.target.host,
            "pipeline started"
        );
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    async fn run(self) {
        let started = Instant::now();
        match self.execute().await {
            Ok(()) => {
                self.shared.finish_done();
                info!(
                    event = "deploy.done",
                    target = %self.target.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "deployment finished"
                );
            }
            Err((step, error)) => {
                warn!(
                    event = "deploy.faulted",
                    target = %self.target.name,
                    step = %step,
                    error = %error,
                    "deployment faulted"
                );
                self.shared.finish_faulted(FaultReport {
                    step,
                    kind: error.kind(),
                    error: error.to_string(),
                });
            }
        }
    }

    async fn execute(&self) -> Result<(), (Step, DeployError)> {
        let target = &self.target;
        let archive_path = self
            .staging_dir
            .join(format!("{}-{}", target.name, target.archive_name));

        self.run_step(
            Step::Package,
            self.packager.package(&target.source_dir(), &archive_path),
        )
        .await?;

        let mut session = self
            .run_step(
                Step::Connect,
                self.provider
                    .connect(&target.host, &target.user, &target.ssh_args),
            )
            .await?;

        // The session stays open across the remote steps and is closed on
        // both terminal paths.
        let result = self.remote_steps(session.as_mut(), &archive_path).await;
        session.close().await;
        result
    }

    async fn remote_steps(
        &self,
        session: &mut dyn TransportSession,
        archive_path: &Path,
    ) -> Result<(), (Step, DeployError)> {
        let target = &self.target;

        let archive = UploadRequest {
            local_path: archive_path.to_owned(),
            remote_path: target.remote_archive_path(),
        };
        self.run_step(
            Step::UploadArchive,
            session.upload(&archive, &self.shared.transfer),
        )
        .await?;

        let extract_command = format!(
            "tar -zxvf {} -C {}",
            shell_escape(&target.remote_archive_path()),
            shell_escape(&target.remote_dir)
        );
        self.run_remote(session, Step::Extract, &extract_command)
            .await?;

        let build_command = format!(
            "cd {} && {}",
            shell_escape(&target.remote_dir),
            target.build_command
        );
        self.run_remote(session, Step::Build, &build_command).await?;

        let artifact = UploadRequest {
            local_path: target.artifact.local_path(),
            remote_path: target.artifact.remote_path(),
        };
        self.run_step(
            Step::UploadArtifact,
            session.upload(&artifact, &self.shared.transfer),
        )
        .await?;

        Ok(())
    }

    async fn run_remote(
        &self,
        session: &mut dyn TransportSession,
        step: Step,
        command: &str,
    ) -> Result<(), (Step, DeployError)> {
        let name = self.target.name.clone();
        self.run_step(step, async move {
            debug!(target = %name, step = %step, command, "remote command");
            let outcome = session.exec(command).await?;
            if !outcome.stdout.is_empty() {
                debug!(target = %name, step = %step, output = %outcome.stdout.trim_end(), "remote output");
            }
            if outcome.success() {
                Ok(())
            } else {
                Err(DeployError::RemoteExit {
                    command: command.to_string(),
                    code: outcome.code,
                    detail: last_line(&outcome.stderr),
                })
            }
        })
        .await
    }

    async fn run_step<T, F>(&self, step: Step, operation: F) -> Result<T, (Step, DeployError)>
    where
        F: std::future::Future<Output = Result<T, DeployError>>,
    {
        info!(
            event = "deploy.step.start",
            target = %self.target.name,
            step = %step,
            "step start"
        );
        let started = Instant::now();
        match operation.await {
            Ok(value) => {
                self.shared.step_done();
                info!(
                    event = "deploy.step.done",
                    target = %self.target.name,
                    step = %step,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "step done"
                );
                Ok(value)
            }
            Err(error) => {
                warn!(
                    event = "deploy.step.failed",
                    target = %self.target.name,
                    step = %step,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "step failed"
                );
                Err((step, error))
            }
        }
    }
}

fn last_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
