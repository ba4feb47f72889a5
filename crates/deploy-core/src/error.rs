use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Faults a deployment pipeline can terminate with.
///
/// Every step returns a typed fault instead of aborting the process, so one
/// pipeline's failure never affects its siblings.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("host {host} does not offer public-key authentication (offered: {offered})")]
    PublicKeyUnavailable { host: String, offered: String },

    #[error("failed to connect to {host}: {detail}")]
    Connect { host: String, detail: String },

    #[error("failed to package {}: {detail}", .path.display())]
    Package { path: PathBuf, detail: String },

    #[error("transfer to {path} failed: {detail}")]
    Transfer { path: String, detail: String },

    #[error("remote command exited with status {code}: {command}")]
    RemoteExit {
        command: String,
        code: i32,
        detail: String,
    },

    #[error("transport session error: {detail}")]
    Session { detail: String },
}

/// The fault taxonomy surfaced in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Configuration,
    Transfer,
    RemoteExecution,
}

impl DeployError {
    pub fn kind(&self) -> FaultKind {
        match self {
            DeployError::PublicKeyUnavailable { .. } | DeployError::Connect { .. } => {
                FaultKind::Configuration
            }
            DeployError::Package { .. }
            | DeployError::Transfer { .. }
            | DeployError::Session { .. } => FaultKind::Transfer,
            DeployError::RemoteExit { .. } => FaultKind::RemoteExecution,
        }
    }
}
