// Cycle Domain Model

use super::error::SessionErrorKind;
use super::target::{Target, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cycle sequence number (1-based, increases per cycle)
pub type CycleId = u64;

/// Date format used in artifact names
pub const CYCLE_LABEL_FORMAT: &str = "%Y-%m-%d";

/// One periodic round over all targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    id: CycleId,
    started_at: DateTime<Utc>,
}

impl Cycle {
    pub fn new(id: CycleId, started_at: DateTime<Utc>) -> Self {
        Self { id, started_at }
    }

    pub fn id(&self) -> CycleId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// `YYYY-MM-DD` in UTC
    pub fn label(&self) -> String {
        self.started_at.format(CYCLE_LABEL_FORMAT).to_string()
    }

    /// Deterministic artifact name for a target in this cycle
    pub fn artifact_name(&self, target: &Target) -> String {
        format!("{}-{}", target.id(), self.label())
    }
}

/// Why a target produced no artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    /// Connect failed on every allowed attempt
    Connect { kind: SessionErrorKind },
    /// Retrieval command failed (never retried)
    Exec,
    /// An artifact for this target and cycle already exists
    DuplicateArtifact,
    /// Artifact could not be written
    Persist,
    /// Shutdown arrived before the backup could start or retry
    Cancelled,
    /// Grace period or cycle deadline expired mid-flight
    Abandoned,
    /// Worker task panicked
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect { kind } => write!(f, "ConnectError({})", kind),
            FailureKind::Exec => write!(f, "ExecError"),
            FailureKind::DuplicateArtifact => write!(f, "DuplicateArtifactError"),
            FailureKind::Persist => write!(f, "PersistError"),
            FailureKind::Cancelled => write!(f, "Cancelled"),
            FailureKind::Abandoned => write!(f, "Abandoned"),
            FailureKind::Panicked => write!(f, "Panicked"),
        }
    }
}

/// Result of running one target's worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Success { text: String },
    Failure { kind: FailureKind, message: String },
}

/// One worker's attempt for one target in one cycle
#[derive(Debug, Clone)]
pub struct BackupAttempt {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub outcome: BackupOutcome,
}

impl BackupAttempt {
    pub fn success(
        target: Target,
        started_at: DateTime<Utc>,
        attempts: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            target,
            started_at,
            attempts,
            outcome: BackupOutcome::Success { text: text.into() },
        }
    }

    pub fn failure(
        target: Target,
        started_at: DateTime<Utc>,
        attempts: u32,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            started_at,
            attempts,
            outcome: BackupOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BackupOutcome::Success { .. })
    }
}

/// Final per-target accounting after the result sink ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordResult {
    Saved { artifact: String },
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub target: TargetId,
    pub attempts: u32,
    pub result: RecordResult,
}

impl AttemptRecord {
    pub fn is_saved(&self) -> bool {
        matches!(self.result, RecordResult::Saved { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.result {
            RecordResult::Failed { kind, .. } => Some(*kind),
            RecordResult::Saved { .. } => None,
        }
    }
}

/// Fan-in of one cycle: exactly one record per target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: CycleId,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<AttemptRecord>,
}

impl CycleReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter().filter(|r| r.is_saved())
    }

    pub fn failed(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter().filter(|r| !r.is_saved())
    }

    pub fn is_clean(&self) -> bool {
        self.records.iter().all(AttemptRecord::is_saved)
    }

    pub fn record_for(&self, target: &str) -> Option<&AttemptRecord> {
        self.records.iter().find(|r| r.target == target)
    }
}

/// Normalize captured text: one line per output line, each newline-terminated
pub fn render_artifact_text(captured: &str) -> String {
    let mut rendered = String::with_capacity(captured.len() + 1);
    for line in captured.lines() {
        rendered.push_str(line);
        rendered.push('\n');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_name_uses_utc_date() {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        let cycle = Cycle::new(1, started);
        let target = Target::new("10.0.0.1", None);
        assert_eq!(cycle.artifact_name(&target), "10.0.0.1-2024-01-01");
    }

    #[test]
    fn test_render_normalizes_line_endings() {
        assert_eq!(
            render_artifact_text("hostname r1\r\n!\r\nend"),
            "hostname r1\n!\nend\n"
        );
        assert_eq!(render_artifact_text("end\n"), "end\n");
        assert_eq!(render_artifact_text(""), "");
    }

    #[test]
    fn test_failure_kind_display() {
        let kind = FailureKind::Connect {
            kind: SessionErrorKind::Timeout,
        };
        assert_eq!(kind.to_string(), "ConnectError(TimeoutError)");
        assert_eq!(FailureKind::DuplicateArtifact.to_string(), "DuplicateArtifactError");
    }

    #[test]
    fn test_report_json_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = CycleReport {
            cycle: 7,
            label: "2024-01-01".to_string(),
            started_at: at,
            finished_at: at,
            records: vec![AttemptRecord {
                target: "10.0.0.1".to_string(),
                attempts: 3,
                result: RecordResult::Failed {
                    kind: FailureKind::Connect {
                        kind: SessionErrorKind::Unreachable,
                    },
                    message: "no route to host".to_string(),
                },
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        let record = &json["records"][0];
        assert_eq!(json["cycle"], 7);
        assert_eq!(record["result"]["status"], "failed");
        assert_eq!(record["result"]["kind"]["type"], "connect");
        assert_eq!(record["result"]["kind"]["kind"], "unreachable");
        assert!(!report.is_clean());
    }
}
