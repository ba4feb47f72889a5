use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use deploy_core::{ArtifactSpec, DeploymentTarget};

const DEFAULT_ARCHIVE_NAME: &str = "src.tar.gz";

#[derive(Debug, Deserialize)]
pub(crate) struct DeployConfig {
    #[serde(default)]
    pub(crate) defaults: ConfigDefaults,
    pub(crate) targets: Vec<TargetConfig>,
}

/// Values applied to every target unless the target overrides them.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigDefaults {
    pub(crate) user: Option<String>,
    pub(crate) workspace: Option<PathBuf>,
    pub(crate) remote_dir: Option<String>,
    pub(crate) build_command: Option<String>,
    pub(crate) archive: Option<String>,
    pub(crate) ssh_args: Option<Vec<String>>,
    pub(crate) artifact: Option<ArtifactConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArtifactConfig {
    pub(crate) file: String,
    pub(crate) local_dir: PathBuf,
    pub(crate) remote_dir: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TargetConfig {
    pub(crate) name: Option<String>,
    pub(crate) host: String,
    pub(crate) user: Option<String>,
    pub(crate) workspace: Option<PathBuf>,
    pub(crate) remote_dir: Option<String>,
    pub(crate) build_command: Option<String>,
    pub(crate) archive: Option<String>,
    pub(crate) ssh_args: Option<Vec<String>>,
    pub(crate) artifact: Option<ArtifactConfig>,
}

pub(crate) fn load_deploy_config(path: &Path) -> anyhow::Result<DeployConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: DeployConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    if config.targets.is_empty() {
        anyhow::bail!("config must include at least one target");
    }
    Ok(config)
}

/// Merge the defaults under every target entry and build the immutable
/// per-run targets.
pub(crate) fn resolve_targets(config: DeployConfig) -> anyhow::Result<Vec<DeploymentTarget>> {
    let defaults = config.defaults;
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(config.targets.len());
    for entry in config.targets {
        let name = entry.name.clone().unwrap_or_else(|| entry.host.clone());
        if !seen.insert(name.clone()) {
            anyhow::bail!("duplicate target name: {name}");
        }
        targets.push(resolve_target(name, entry, &defaults)?);
    }
    Ok(targets)
}

fn resolve_target(
    name: String,
    entry: TargetConfig,
    defaults: &ConfigDefaults,
) -> anyhow::Result<DeploymentTarget> {
    let user = entry
        .user
        .or_else(|| defaults.user.clone())
        .with_context(|| format!("target {name} has no user"))?;
    let workspace = entry
        .workspace
        .or_else(|| defaults.workspace.clone())
        .with_context(|| format!("target {name} has no workspace"))?;
    let remote_dir = entry
        .remote_dir
        .or_else(|| defaults.remote_dir.clone())
        .with_context(|| format!("target {name} has no remote_dir"))?;
    let build_command = entry
        .build_command
        .or_else(|| defaults.build_command.clone())
        .with_context(|| format!("target {name} has no build_command"))?;
    let artifact = entry
        .artifact
        .or_else(|| defaults.artifact.clone())
        .with_context(|| format!("target {name} has no artifact"))?;
    let archive_name = entry
        .archive
        .or_else(|| defaults.archive.clone())
        .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
    let ssh_args = entry
        .ssh_args
        .or_else(|| defaults.ssh_args.clone())
        .unwrap_or_default();

    Ok(DeploymentTarget {
        name,
        host: entry.host,
        user,
        workspace,
        remote_dir,
        build_command,
        archive_name,
        artifact: ArtifactSpec {
            file_name: artifact.file,
            local_dir: artifact.local_dir,
            remote_dir: artifact.remote_dir,
        },
        ssh_args,
    })
}
