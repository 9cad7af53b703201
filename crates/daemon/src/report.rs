//! Terminal output for `once` and `check`

use anyhow::Result;
use colored::Colorize;
use tabled::{Table, Tabled};

use netbackup_core::domain::{CycleReport, RecordResult, Target};

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Device type")]
    device_type: String,
    #[tabled(rename = "Command")]
    command: String,
}

fn record_rows(report: &CycleReport) -> Vec<RecordRow> {
    report
        .records
        .iter()
        .map(|record| match &record.result {
            RecordResult::Saved { artifact } => RecordRow {
                target: record.target.clone(),
                status: "saved",
                attempts: record.attempts,
                detail: artifact.clone(),
            },
            RecordResult::Failed { kind, message } => RecordRow {
                target: record.target.clone(),
                status: "failed",
                attempts: record.attempts,
                detail: format!("{}: {}", kind, message),
            },
        })
        .collect()
}

pub fn print_cycle_table(report: &CycleReport) {
    let succeeded = report.succeeded().count();
    let failed = report.failed().count();

    println!(
        "{}",
        format!("Cycle {} ({})", report.cycle, report.label).cyan().bold()
    );
    println!("{}", Table::new(record_rows(report)));
    println!();

    if failed == 0 {
        println!("{}", format!("✓ {} saved", succeeded).green().bold());
    } else {
        println!(
            "{}",
            format!("✗ {} saved, {} failed", succeeded, failed).red().bold()
        );
    }
}

pub fn print_cycle_json(report: &CycleReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn print_targets(targets: &[Target], command_override: Option<&str>) {
    let rows: Vec<TargetRow> = targets
        .iter()
        .map(|target| {
            let (host, port) = target.host_port();
            let device_type = target.effective_device_type();
            TargetRow {
                host: host.to_string(),
                port,
                device_type: device_type.as_str().to_string(),
                command: command_override
                    .unwrap_or_else(|| device_type.retrieval_command())
                    .to_string(),
            }
        })
        .collect();

    println!("{}", Table::new(rows));
    println!("{}", format!("✓ {} targets", targets.len()).green().bold());
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbackup_core::domain::{AttemptRecord, FailureKind, SessionErrorKind};

    fn report() -> CycleReport {
        let at = "2024-01-01T00:00:00Z".parse().unwrap();
        CycleReport {
            cycle: 1,
            label: "2024-01-01".to_string(),
            started_at: at,
            finished_at: at,
            records: vec![
                AttemptRecord {
                    target: "10.0.0.1".to_string(),
                    attempts: 3,
                    result: RecordResult::Failed {
                        kind: FailureKind::Connect {
                            kind: SessionErrorKind::Unreachable,
                        },
                        message: "no route".to_string(),
                    },
                },
                AttemptRecord {
                    target: "10.0.0.2".to_string(),
                    attempts: 1,
                    result: RecordResult::Saved {
                        artifact: "./10.0.0.2-2024-01-01".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_record_rows() {
        let rows = record_rows(&report());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "failed");
        assert_eq!(rows[0].attempts, 3);
        assert_eq!(rows[0].detail, "ConnectError(UnreachableError): no route");
        assert_eq!(rows[1].status, "saved");
        assert_eq!(rows[1].detail, "./10.0.0.2-2024-01-01");
    }

    #[test]
    fn test_table_lists_every_target() {
        let table = Table::new(record_rows(&report())).to_string();
        assert!(table.contains("10.0.0.1"));
        assert!(table.contains("10.0.0.2"));
        assert!(table.contains("Attempts"));
    }
}
