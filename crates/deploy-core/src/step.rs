use std::fmt;

use serde::Serialize;

/// The ordered steps of one deployment run.
///
/// Everything that reports a step count derives it from [`Step::SEQUENCE`],
/// so the sequence and the reported total cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Compress the local workspace source tree into an archive.
    Package,
    /// Open an authenticated transport session to the target host.
    Connect,
    /// Transfer the workspace archive to the remote destination.
    UploadArchive,
    /// Extract the uploaded archive in place on the remote host.
    Extract,
    /// Run the configured remote build command.
    Build,
    /// Transfer the secondary artifact to its remote destination.
    UploadArtifact,
}

impl Step {
    pub const SEQUENCE: [Step; 6] = [
        Step::Package,
        Step::Connect,
        Step::UploadArchive,
        Step::Extract,
        Step::Build,
        Step::UploadArtifact,
    ];

    pub const fn count() -> usize {
        Self::SEQUENCE.len()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Step::Package => "package",
            Step::Connect => "connect",
            Step::UploadArchive => "upload-archive",
            Step::Extract => "extract",
            Step::Build => "build",
            Step::UploadArtifact => "upload-artifact",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
