//! Core deployment pipeline and supervision.
//!
//! A [`DeploymentPipeline`] executes a fixed, ordered sequence of steps for
//! one [`DeploymentTarget`] — package, connect, upload, extract, build,
//! upload artifact — and publishes progress through a lock-free
//! [`PipelineHandle`]. The [`Supervisor`] starts many pipelines in parallel
//! and polls them until every one is terminal.
//!
//! Transport and packaging are collaborators behind the [`SessionProvider`],
//! [`TransportSession`] and [`Packager`] traits; any compliant
//! implementation is substitutable.

mod error;
mod pipeline;
mod progress;
mod provider;
mod report;
mod shell;
mod step;
mod supervisor;
mod target;

pub use error::{DeployError, FaultKind};
pub use pipeline::{DeploymentPipeline, FaultReport, PipelineHandle, PipelineStatus};
pub use progress::{ProgressSample, TransferProgress};
pub use provider::{CommandOutcome, Packager, SessionProvider, TransportSession, UploadRequest};
pub use report::{RunReport, TargetReport};
pub use shell::shell_escape;
pub use step::Step;
pub use supervisor::{any_in_progress, Supervisor, DEFAULT_POLL_INTERVAL};
pub use target::{join_remote, ArtifactSpec, DeploymentTarget};

#[cfg(test)]
mod testutil;
