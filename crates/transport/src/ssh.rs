use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use deploy_core::{
    CommandOutcome, DeployError, SessionProvider, TransferProgress, TransportSession,
    UploadRequest,
};

use crate::auth::{offered_auth_methods, supports_publickey};
use crate::command::{build_upload_command, run_with_timeout, UPLOAD_CHUNK_SIZE};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const CONTROL_SOCKET_WAIT: Duration = Duration::from_secs(20);
const CONTROL_SOCKET_WAIT_INTERVAL: Duration = Duration::from_millis(100);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens one multiplexed SSH connection per target host.
///
/// Each session is backed by an `ssh` control master process; uploads and
/// remote commands run through its control socket, so authentication happens
/// exactly once per pipeline.
pub struct SshSessionProvider {
    control_dir: PathBuf,
}

impl SshSessionProvider {
    pub fn new(control_dir: PathBuf) -> Self {
        Self { control_dir }
    }
}

#[async_trait]
impl SessionProvider for SshSessionProvider {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        ssh_args: &[String],
    ) -> Result<Box<dyn TransportSession>, DeployError> {
        let endpoint = format!("{user}@{host}");
        tokio::fs::create_dir_all(&self.control_dir)
            .await
            .map_err(|err| DeployError::Session {
                detail: format!(
                    "failed to create control dir {}: {err}",
                    self.control_dir.display()
                ),
            })?;
        let control_path = self
            .control_dir
            .join(format!("{:016x}.sock", hash_endpoint(&endpoint)));

        info!(event = "session.connect", host, user, "opening ssh control master");
        let mut master =
            spawn_master(&endpoint, ssh_args, &control_path).map_err(|err| DeployError::Session {
                detail: format!("failed to spawn ssh: {err}"),
            })?;
        match wait_for_control_socket(&control_path, &mut master).await {
            Ok(()) => {
                info!(event = "session.ready", host, "ssh session established");
                Ok(Box::new(SshSession {
                    endpoint,
                    ssh_args: ssh_args.to_vec(),
                    control_path,
                    master,
                }))
            }
            Err(detail) => {
                let _ = master.kill().await;
                let _ = master.wait().await;
                Err(classify_connect_failure(host, &endpoint, ssh_args, detail).await)
            }
        }
    }
}

/// One live multiplexed connection, exclusively owned by its pipeline.
pub struct SshSession {
    endpoint: String,
    ssh_args: Vec<String>,
    control_path: PathBuf,
    master: Child,
}

impl SshSession {
    fn control_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S").arg(&self.control_path);
        cmd.arg("-T");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.args(&self.ssh_args);
        cmd.arg(&self.endpoint);
        cmd
    }
}

#[async_trait]
impl TransportSession for SshSession {
    async fn upload(
        &mut self,
        request: &UploadRequest,
        progress: &TransferProgress,
    ) -> Result<(), DeployError> {
        let mut file =
            tokio::fs::File::open(&request.local_path)
                .await
                .map_err(|err| DeployError::Transfer {
                    path: request.remote_path.clone(),
                    detail: format!("failed to open {}: {err}", request.local_path.display()),
                })?;
        let metadata = file.metadata().await.map_err(|err| DeployError::Transfer {
            path: request.remote_path.clone(),
            detail: format!("failed to stat {}: {err}", request.local_path.display()),
        })?;
        let total_bytes = metadata.len();
        let mode = metadata.mode() & 0o777;

        let mut cmd = self.control_command();
        cmd.arg(build_upload_command(
            &request.remote_path,
            mode,
            metadata.mtime(),
            metadata.atime(),
        ));
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|err| DeployError::Session {
            detail: format!("failed to spawn ssh: {err}"),
        })?;
        let mut stdin = child.stdin.take().ok_or_else(|| DeployError::Session {
            detail: "failed to open ssh stdin".to_string(),
        })?;

        progress.begin(total_bytes);
        info!(
            event = "transfer.start",
            endpoint = %self.endpoint,
            path = %request.remote_path,
            total_bytes,
            "uploading"
        );
        let started = Instant::now();
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).await.map_err(|err| DeployError::Transfer {
                path: request.remote_path.clone(),
                detail: format!("failed to read {}: {err}", request.local_path.display()),
            })?;
            if read == 0 {
                break;
            }
            stdin
                .write_all(&buffer[..read])
                .await
                .map_err(|err| DeployError::Transfer {
                    path: request.remote_path.clone(),
                    detail: format!("failed to send file: {err}"),
                })?;
            progress.add(read as u64);
        }
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| DeployError::Session {
                detail: format!("failed to wait for ssh: {err}"),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("upload exited with status {:?}", output.status.code())
            } else {
                stderr
            };
            return Err(DeployError::Transfer {
                path: request.remote_path.clone(),
                detail,
            });
        }

        let elapsed = started.elapsed();
        let rate = progress
            .sample()
            .map(|sample| sample.rate_mb_per_sec())
            .unwrap_or(0.0);
        info!(
            event = "transfer.done",
            endpoint = %self.endpoint,
            path = %request.remote_path,
            total_bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            rate_mb_s = format!("{rate:.2}"),
            "upload finished"
        );
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutcome, DeployError> {
        debug!(event = "exec.start", endpoint = %self.endpoint, command, "remote command");
        let mut cmd = self.control_command();
        cmd.arg(command);
        cmd.stdin(Stdio::null());
        // `output()` drains both streams to end-of-stream before the exit
        // status is produced. There is deliberately no timeout: a remote
        // build runs for as long as it runs.
        let output = cmd.output().await.map_err(|err| DeployError::Session {
            detail: format!("failed to run remote command: {err}"),
        })?;
        let outcome = CommandOutcome {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(event = "exec.done", endpoint = %self.endpoint, code = outcome.code, "remote command finished");
        Ok(outcome)
    }

    async fn close(&mut self) {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S").arg(&self.control_path);
        cmd.arg("-O").arg("exit");
        cmd.args(&self.ssh_args);
        cmd.arg(&self.endpoint);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Ok(mut child) = cmd.spawn() {
            let _ = child.wait().await;
        }
        match self.master.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                let _ = self.master.kill().await;
                let _ = self.master.wait().await;
            }
        }
        debug!(event = "session.closed", endpoint = %self.endpoint, "ssh control master closed");
    }
}

fn spawn_master(
    endpoint: &str,
    ssh_args: &[String],
    control_path: &Path,
) -> std::io::Result<Child> {
    let mut cmd = Command::new("ssh");
    cmd.arg("-N")
        .arg("-T")
        .arg("-o")
        .arg("ControlMaster=yes")
        .arg("-o")
        .arg(format!("ControlPath={}", control_path.display()))
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("PreferredAuthentications=publickey")
        .arg("-o")
        .arg("StrictHostKeyChecking=accept-new")
        .arg("-o")
        .arg(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"))
        .arg("-o")
        .arg("ServerAliveInterval=30");
    cmd.args(ssh_args);
    cmd.arg(endpoint);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.spawn()
}

async fn wait_for_control_socket(control_path: &Path, master: &mut Child) -> Result<(), String> {
    let started = Instant::now();
    loop {
        if control_path.exists() {
            return Ok(());
        }
        if let Ok(Some(status)) = master.try_wait() {
            return Err(format!("ssh master exited with {status}"));
        }
        if started.elapsed() >= CONTROL_SOCKET_WAIT {
            return Err(format!(
                "control socket not ready after {}ms",
                CONTROL_SOCKET_WAIT.as_millis()
            ));
        }
        tokio::time::sleep(CONTROL_SOCKET_WAIT_INTERVAL).await;
    }
}

/// Turn a failed master start into the right fault: a host that answers but
/// does not offer public-key authentication is a configuration fault, not a
/// generic connect error.
async fn classify_connect_failure(
    host: &str,
    endpoint: &str,
    ssh_args: &[String],
    detail: String,
) -> DeployError {
    let mut cmd = Command::new("ssh");
    cmd.arg("-T")
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("PreferredAuthentications=publickey")
        .arg("-o")
        .arg("StrictHostKeyChecking=accept-new")
        .arg("-o")
        .arg(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"));
    cmd.args(ssh_args);
    cmd.arg(endpoint);
    cmd.arg("true");
    match run_with_timeout(&mut cmd, PROBE_TIMEOUT, "ssh auth probe").await {
        Ok(output) if output.status.success() => DeployError::Connect {
            host: host.to_string(),
            detail,
        },
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if let Some(methods) = offered_auth_methods(&stderr) {
                if !supports_publickey(&methods) {
                    return DeployError::PublicKeyUnavailable {
                        host: host.to_string(),
                        offered: methods.join(","),
                    };
                }
            }
            let trimmed = stderr.trim();
            DeployError::Connect {
                host: host.to_string(),
                detail: if trimmed.is_empty() {
                    detail
                } else {
                    trimmed.to_string()
                },
            }
        }
        Err(err) => DeployError::Connect {
            host: host.to_string(),
            detail: format!("{detail}; probe failed: {err}"),
        },
    }
}

fn hash_endpoint(endpoint: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    endpoint.hash(&mut hasher);
    hasher.finish()
}
