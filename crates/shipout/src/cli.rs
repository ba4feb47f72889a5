use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "shipout", version, about = "One-shot workspace deployment over SSH")]
pub(crate) struct Args {
    #[arg(long, default_value = "config/shipout.toml")]
    pub(crate) config: PathBuf,
    /// Supervisor poll interval, e.g. "100ms" or "1s".
    #[arg(long, default_value = "100ms", value_parser = humantime::parse_duration)]
    pub(crate) poll_interval: Duration,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    /// Write a JSON run record to this path.
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,
}
