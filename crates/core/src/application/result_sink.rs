// Result Sink - persists captured configurations and accounts for failures

use crate::domain::{
    render_artifact_text, AttemptRecord, BackupAttempt, BackupOutcome, Cycle, FailureKind,
    RecordResult, Target,
};
use crate::port::{ArtifactError, ArtifactStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns each BackupAttempt into exactly one artifact or one logged failure
pub struct ResultSink {
    store: Arc<dyn ArtifactStore>,
}

impl ResultSink {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Record the outcome of one target in one cycle
    ///
    /// Success: the text is written under `{target}-{YYYY-MM-DD}`; an
    /// existing artifact is never overwritten (DuplicateArtifact failure).
    /// Failure: logged once, nothing is written.
    pub async fn record(&self, cycle: &Cycle, attempt: BackupAttempt) -> AttemptRecord {
        let BackupAttempt {
            target,
            attempts,
            outcome,
            ..
        } = attempt;

        let text = match outcome {
            BackupOutcome::Success { text } => text,
            BackupOutcome::Failure { kind, message } => {
                return self.record_failure(&target, attempts, kind, message);
            }
        };

        let key = cycle.artifact_name(&target);
        let contents = render_artifact_text(&text);

        match self.store.persist(&key, contents.as_bytes()).await {
            Ok(location) => {
                info!(
                    host = %target,
                    cycle = cycle.id(),
                    artifact = %location,
                    bytes = contents.len(),
                    "Backup saved"
                );
                AttemptRecord {
                    target: target.id().to_string(),
                    attempts,
                    result: RecordResult::Saved {
                        artifact: location,
                    },
                }
            }
            Err(e @ ArtifactError::Duplicate(_)) => {
                self.record_failure(
                    &target,
                    attempts,
                    FailureKind::DuplicateArtifact,
                    e.to_string(),
                )
            }
            Err(e @ ArtifactError::Io { .. }) => {
                self.record_failure(&target, attempts, FailureKind::Persist, e.to_string())
            }
        }
    }

    /// Log a target-level failure and build its record
    pub fn record_failure(
        &self,
        target: &Target,
        attempts: u32,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> AttemptRecord {
        let message = message.into();
        match kind {
            FailureKind::Cancelled | FailureKind::DuplicateArtifact => warn!(
                host = %target,
                kind = %kind,
                attempts = attempts,
                message = %message,
                "Backup not taken"
            ),
            _ => error!(
                host = %target,
                kind = %kind,
                attempts = attempts,
                message = %message,
                "Backup failed"
            ),
        }

        AttemptRecord {
            target: target.id().to_string(),
            attempts,
            result: RecordResult::Failed { kind, message },
        }
    }
}
