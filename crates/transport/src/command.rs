use std::process::{Output, Stdio};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use deploy_core::shell_escape;

/// Chunk size for stdin-streamed uploads. Display granularity only; the
/// transfer is correct for any chunk size.
pub(crate) const UPLOAD_CHUNK_SIZE: usize = 65535;

/// Remote side of an upload: create the destination directory, receive the
/// byte stream, then restore the local file's mode and timestamps.
pub(crate) fn build_upload_command(remote_path: &str, mode: u32, mtime: i64, atime: i64) -> String {
    let parent = shell_escape(&remote_parent_dir(remote_path));
    let path = shell_escape(remote_path);
    format!(
        "mkdir -p {parent} && cat > {path} && chmod {mode:o} {path} \
         && touch -m -d @{mtime} {path} && touch -a -d @{atime} {path}"
    )
}

pub(crate) fn remote_parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

/// Run a command to completion with an upper bound on its runtime, draining
/// both output pipes. Used for connection probes, never for remote builds.
pub(crate) async fn run_with_timeout(
    cmd: &mut Command,
    command_timeout: Duration,
    label: &str,
) -> anyhow::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().with_context(|| format!("failed to spawn {label}"))?;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let status = match timeout(command_timeout, child.wait()).await {
        Ok(result) => result.with_context(|| format!("{label} failed"))?,
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            anyhow::bail!("{label} timed out after {}s", command_timeout.as_secs())
        }
    };
    let mut stdout = Vec::new();
    if let Some(mut pipe) = stdout_pipe.take() {
        let _ = pipe.read_to_end(&mut stdout).await;
    }
    let mut stderr = Vec::new();
    if let Some(mut pipe) = stderr_pipe.take() {
        let _ = pipe.read_to_end(&mut stderr).await;
    }
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_command_restores_mode_and_times() {
        let command = build_upload_command("/opt/deploy/src.tar.gz", 0o644, 1700000000, 1700000100);
        assert!(command.starts_with("mkdir -p '/opt/deploy' && cat > '/opt/deploy/src.tar.gz'"));
        assert!(command.contains("chmod 644 '/opt/deploy/src.tar.gz'"));
        assert!(command.contains("touch -m -d @1700000000"));
        assert!(command.contains("touch -a -d @1700000100"));
    }

    #[test]
    fn parent_of_root_level_path_is_root() {
        assert_eq!(remote_parent_dir("/src.tar.gz"), "/");
        assert_eq!(remote_parent_dir("/opt/deploy/src.tar.gz"), "/opt/deploy");
        assert_eq!(remote_parent_dir("src.tar.gz"), ".");
    }
}
