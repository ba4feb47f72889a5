//! Scripted collaborators for driving pipelines through chosen fault paths.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeployError;
use crate::pipeline::DeploymentPipeline;
use crate::progress::TransferProgress;
use crate::provider::{CommandOutcome, Packager, SessionProvider, TransportSession, UploadRequest};
use crate::target::{ArtifactSpec, DeploymentTarget};

pub(crate) fn target(name: &str) -> DeploymentTarget {
    DeploymentTarget {
        name: name.to_string(),
        host: format!("{name}.local"),
        user: "robot".to_string(),
        workspace: PathBuf::from("/home/robot/ws"),
        remote_dir: "/opt/deploy".to_string(),
        build_command: "colcon build".to_string(),
        archive_name: "src.tar.gz".to_string(),
        artifact: ArtifactSpec {
            file_name: "firmware.bin".to_string(),
            local_dir: PathBuf::from("/home/robot/fw"),
            remote_dir: "/lib/firmware".to_string(),
        },
        ssh_args: Vec::new(),
    }
}

pub(crate) fn pipeline_with(
    name: &str,
    provider: Arc<ScriptedProvider>,
    packager: MockPackager,
) -> DeploymentPipeline {
    DeploymentPipeline::new(
        target(name),
        provider,
        Arc::new(packager),
        std::env::temp_dir(),
    )
}

#[derive(Default)]
pub(crate) struct MockPackager {
    pub(crate) fail: bool,
}

#[async_trait]
impl Packager for MockPackager {
    async fn package(&self, source_dir: &Path, _archive_path: &Path) -> Result<(), DeployError> {
        if self.fail {
            return Err(DeployError::Package {
                path: source_dir.to_owned(),
                detail: "source directory missing".to_string(),
            });
        }
        Ok(())
    }
}

/// Provider whose sessions succeed, fail a chosen upload, or fail any remote
/// command containing a marker substring. Every call is recorded.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    pub(crate) deny_publickey: bool,
    pub(crate) fail_upload: Option<usize>,
    pub(crate) fail_command_containing: Option<&'static str>,
    pub(crate) step_delay: Option<Duration>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        _ssh_args: &[String],
    ) -> Result<Box<dyn TransportSession>, DeployError> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        if self.deny_publickey {
            return Err(DeployError::PublicKeyUnavailable {
                host: host.to_string(),
                offered: "password,keyboard-interactive".to_string(),
            });
        }
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("connect:{user}@{host}"));
        Ok(Box::new(ScriptedSession {
            fail_upload: self.fail_upload,
            fail_command_containing: self.fail_command_containing,
            step_delay: self.step_delay,
            uploads_seen: 0,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct ScriptedSession {
    fail_upload: Option<usize>,
    fail_command_containing: Option<&'static str>,
    step_delay: Option<Duration>,
    uploads_seen: usize,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    async fn pause(&self) {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, entry: String) {
        self.calls.lock().expect("calls lock").push(entry);
    }
}

#[async_trait]
impl TransportSession for ScriptedSession {
    async fn upload(
        &mut self,
        request: &UploadRequest,
        progress: &TransferProgress,
    ) -> Result<(), DeployError> {
        self.pause().await;
        progress.begin(100);
        progress.add(100);
        let index = self.uploads_seen;
        self.uploads_seen += 1;
        if self.fail_upload == Some(index) {
            return Err(DeployError::Transfer {
                path: request.remote_path.clone(),
                detail: "broken pipe".to_string(),
            });
        }
        self.record(format!("upload:{}", request.remote_path));
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutcome, DeployError> {
        self.pause().await;
        if let Some(marker) = self.fail_command_containing {
            if command.contains(marker) {
                return Ok(CommandOutcome {
                    code: 2,
                    stdout: String::new(),
                    stderr: "remote command failed\n".to_string(),
                });
            }
        }
        self.record(format!("exec:{command}"));
        Ok(CommandOutcome {
            code: 0,
            stdout: "ok\n".to_string(),
            stderr: String::new(),
        })
    }

    async fn close(&mut self) {
        self.record("close".to_string());
    }
}
