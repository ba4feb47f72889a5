use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use deploy_core::{PipelineStatus, RunReport};

/// Machine-readable record of one run.
#[derive(Serialize)]
struct RunRecord<'a> {
    run_id: &'a str,
    success: bool,
    duration_ms: u128,
    targets: &'a [deploy_core::TargetReport],
}

/// Human-facing per-target summary printed after the supervisor returns.
pub(crate) fn print_summary(report: &RunReport) {
    for target in &report.targets {
        match target.status {
            PipelineStatus::Done => {
                println!(
                    "{}: done ({}/{} steps)",
                    target.name, target.steps_completed, target.total_steps
                );
            }
            _ => match target.fault.as_ref() {
                Some(fault) => println!(
                    "{}: faulted at {} after {}/{} steps: {}",
                    target.name,
                    fault.step,
                    target.steps_completed,
                    target.total_steps,
                    fault.error
                ),
                None => println!(
                    "{}: {} ({}/{} steps)",
                    target.name,
                    target.status.label(),
                    target.steps_completed,
                    target.total_steps
                ),
            },
        }
    }
}

pub(crate) fn write_run_record(
    path: &Path,
    run_id: &str,
    report: &RunReport,
    duration: Duration,
) -> anyhow::Result<()> {
    let record = RunRecord {
        run_id,
        success: report.success(),
        duration_ms: duration.as_millis(),
        targets: &report.targets,
    };
    let payload = serde_json::to_vec_pretty(&record).context("failed to serialize run record")?;
    std::fs::write(path, payload)
        .with_context(|| format!("failed to write run record {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::{FaultKind, FaultReport, Step, TargetReport};
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn run_record_is_valid_json() {
        let report = RunReport {
            targets: vec![
                TargetReport {
                    name: "rover-a".to_string(),
                    status: PipelineStatus::Done,
                    steps_completed: 6,
                    total_steps: 6,
                    fault: None,
                },
                TargetReport {
                    name: "rover-b".to_string(),
                    status: PipelineStatus::Faulted,
                    steps_completed: 1,
                    total_steps: 6,
                    fault: Some(FaultReport {
                        step: Step::Connect,
                        kind: FaultKind::Configuration,
                        error: "no publickey".to_string(),
                    }),
                },
            ],
        };

        let mut dir = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("shipout-report-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("run.json");

        write_run_record(&path, "run-1", &report, Duration::from_millis(1234)).expect("write");
        let raw = fs::read_to_string(&path).expect("read record");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("parse record");
        assert_eq!(value["run_id"], "run-1");
        assert_eq!(value["success"], false);
        assert_eq!(value["targets"][1]["fault"]["step"], "connect");
        assert_eq!(value["targets"][1]["steps_completed"], 1);

        fs::remove_dir_all(&dir).ok();
    }
}
