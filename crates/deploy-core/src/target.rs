use std::path::PathBuf;

/// Immutable configuration for one deployment run.
///
/// Built once from the external configuration surface before the pipeline
/// starts and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    /// Display name used in logs and reports.
    pub name: String,
    /// Remote host to deploy to.
    pub host: String,
    /// Remote user to authenticate as.
    pub user: String,
    /// Local workspace root; its `src/` subtree is what gets packaged.
    pub workspace: PathBuf,
    /// Remote directory the archive is uploaded to and extracted in.
    pub remote_dir: String,
    /// Remote build invocation, run with `remote_dir` as working directory.
    pub build_command: String,
    /// File name of the workspace archive.
    pub archive_name: String,
    /// Secondary artifact to upload after the build.
    pub artifact: ArtifactSpec,
    /// Extra arguments passed through to the transport client.
    pub ssh_args: Vec<String>,
}

/// A secondary artifact: an independently named file transferred from a
/// possibly different local directory to a possibly different remote
/// destination.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub file_name: String,
    pub local_dir: PathBuf,
    pub remote_dir: String,
}

impl DeploymentTarget {
    pub fn endpoint(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// The directory that gets packaged: the workspace's `src/` subtree.
    pub fn source_dir(&self) -> PathBuf {
        self.workspace.join("src")
    }

    pub fn remote_archive_path(&self) -> String {
        join_remote(&self.remote_dir, &self.archive_name)
    }
}

impl ArtifactSpec {
    pub fn local_path(&self) -> PathBuf {
        self.local_dir.join(&self.file_name)
    }

    pub fn remote_path(&self) -> String {
        join_remote(&self.remote_dir, &self.file_name)
    }
}

pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
