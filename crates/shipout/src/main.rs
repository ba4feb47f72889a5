mod cli;
mod config;
mod report;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use uuid::Uuid;

use deploy_core::{DeploymentPipeline, Packager, SessionProvider, Supervisor};
use packager::TarGzPackager;
use transport::SshSessionProvider;

use crate::cli::Args;
use crate::config::{load_deploy_config, resolve_targets};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_to_stderr);

    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        config = %args.config.display(),
        "shipout starting"
    );

    let config = load_deploy_config(&args.config)?;
    let targets = resolve_targets(config)?;

    // Per-run staging area for archives and control sockets. Never cleaned
    // up on fault: the pipeline does not delete what it created.
    let staging_dir = std::env::temp_dir().join(format!("shipout-{run_id}"));
    std::fs::create_dir_all(&staging_dir)
        .with_context(|| format!("failed to create staging dir {}", staging_dir.display()))?;

    let provider: Arc<dyn SessionProvider> =
        Arc::new(SshSessionProvider::new(staging_dir.join("ctl")));
    let workspace_packager: Arc<dyn Packager> = Arc::new(TarGzPackager);

    let pipelines: Vec<DeploymentPipeline> = targets
        .into_iter()
        .map(|target| {
            DeploymentPipeline::new(
                target,
                Arc::clone(&provider),
                Arc::clone(&workspace_packager),
                staging_dir.clone(),
            )
        })
        .collect();

    let started = Instant::now();
    let supervisor = Supervisor::new(args.poll_interval);
    let run_report = supervisor.run(pipelines).await;

    report::print_summary(&run_report);
    if let Some(path) = args.report.as_ref() {
        report::write_run_record(path, &run_id, &run_report, started.elapsed())?;
    }

    if !run_report.success() {
        std::process::exit(1);
    }
    info!(run_id = %run_id, "all targets deployed");
    Ok(())
}

fn init_tracing(log_to_stderr: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );
    if log_to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}
