use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::DeployError;
use crate::progress::TransferProgress;

/// Exit status and fully drained output of one remote command.
///
/// The output streams are always read to end-of-stream before the status is
/// produced, so a faulted remote process is never left blocked on output
/// buffering.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// One file transfer: local source and remote destination. The transport
/// preserves the local file's permission bits and timestamps on the remote
/// side.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// One live authenticated connection to a target host.
///
/// Owned exclusively by the pipeline that created it and closed when that
/// pipeline reaches a terminal state. Never shared across pipelines.
#[async_trait]
pub trait TransportSession: Send {
    /// Bulk upload with per-chunk progress observation.
    async fn upload(
        &mut self,
        request: &UploadRequest,
        progress: &TransferProgress,
    ) -> Result<(), DeployError>;

    /// Execute a remote command, draining its output until end-of-stream
    /// before returning the exit status.
    async fn exec(&mut self, command: &str) -> Result<CommandOutcome, DeployError>;

    /// Tear the session down. Best-effort; called on both terminal paths.
    async fn close(&mut self);
}

/// Establishes authenticated transport sessions.
///
/// Connecting must fail with [`DeployError::PublicKeyUnavailable`] when the
/// host does not offer public-key authentication.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        ssh_args: &[String],
    ) -> Result<Box<dyn TransportSession>, DeployError>;
}

/// Produces a compressed archive of a local directory tree.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, source_dir: &Path, archive_path: &Path) -> Result<(), DeployError>;
}
