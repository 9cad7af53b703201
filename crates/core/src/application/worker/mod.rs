// Per-target backup worker

pub mod constants;
mod shutdown;

use constants::SESSION_CLOSE_TIMEOUT;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{BackupAttempt, Credential, FailureKind, Target};
use crate::port::{Session, SessionClient, TimeProvider};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Signals a worker observes at every suspension point
#[derive(Clone)]
pub struct WorkerSignals {
    /// Process shutdown: no new connects, no further retries
    pub shutdown: ShutdownToken,
    /// Cycle abandon: unwind now, releasing any session
    pub abandon: ShutdownToken,
}

/// Early exit from session acquisition
struct AcquireFailure {
    attempts: u32,
    kind: FailureKind,
    message: String,
}

/// Produces one BackupAttempt for one target
pub struct BackupWorker {
    session_client: Arc<dyn SessionClient>,
    credential: Arc<Credential>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    command_override: Option<String>,
}

impl BackupWorker {
    pub fn new(
        session_client: Arc<dyn SessionClient>,
        credential: Arc<Credential>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            session_client,
            credential,
            retry_policy,
            time_provider,
            command_override: None,
        }
    }

    /// Use `command` for every target instead of the per-platform default
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command_override = Some(command.into());
        self
    }

    /// Command sent to this target
    pub fn command_for(&self, target: &Target) -> String {
        match &self.command_override {
            Some(command) => command.clone(),
            None => target
                .effective_device_type()
                .retrieval_command()
                .to_string(),
        }
    }

    /// Run one backup attempt
    ///
    /// Algorithm:
    /// 1. Connect, retrying connect failures per RetryPolicy
    /// 2. Execute the retrieval command once (no retry on failure)
    /// 3. Close the session on every path once it was acquired
    ///
    /// Never fails: every exit path is described by the returned attempt.
    pub async fn backup(&self, target: &Target, signals: WorkerSignals) -> BackupAttempt {
        let started_at = self.time_provider.now();
        let WorkerSignals {
            mut shutdown,
            mut abandon,
        } = signals;

        let (mut session, attempts) =
            match self.acquire(target, &mut shutdown, &mut abandon).await {
                Ok(acquired) => acquired,
                Err(failure) => {
                    return BackupAttempt::failure(
                        target.clone(),
                        started_at,
                        failure.attempts,
                        failure.kind,
                        failure.message,
                    );
                }
            };

        let command = self.command_for(target);
        debug!(host = %target, command = %command, "Executing retrieval command");

        let executed = tokio::select! {
            biased;
            _ = abandon.wait() => Err((
                FailureKind::Abandoned,
                "abandoned while executing command".to_string(),
            )),
            result = session.execute(&command) => {
                result.map_err(|e| (FailureKind::Exec, e.to_string()))
            }
        };

        self.release(target, session).await;

        match executed {
            Ok(text) => {
                info!(
                    host = %target,
                    attempts = attempts,
                    bytes = text.len(),
                    "Configuration captured"
                );
                BackupAttempt::success(target.clone(), started_at, attempts, text)
            }
            Err((kind, message)) => {
                BackupAttempt::failure(target.clone(), started_at, attempts, kind, message)
            }
        }
    }

    /// Connect with retry and backoff, observing shutdown and abandon
    async fn acquire(
        &self,
        target: &Target,
        shutdown: &mut ShutdownToken,
        abandon: &mut ShutdownToken,
    ) -> Result<(Box<dyn Session>, u32), AcquireFailure> {
        let mut attempts = 0;

        loop {
            if shutdown.is_shutdown() {
                return Err(AcquireFailure {
                    attempts,
                    kind: FailureKind::Cancelled,
                    message: "shutdown requested before connect".to_string(),
                });
            }

            attempts += 1;
            let connected = tokio::select! {
                biased;
                _ = abandon.wait() => {
                    return Err(AcquireFailure {
                        attempts,
                        kind: FailureKind::Abandoned,
                        message: "abandoned while connecting".to_string(),
                    });
                }
                result = self.session_client.connect(target, &self.credential) => result,
            };

            let error = match connected {
                Ok(session) => return Ok((session, attempts)),
                Err(error) => error,
            };

            match self.retry_policy.should_retry(target, attempts) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        host = %target,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Connect failed, retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = abandon.wait() => {
                            return Err(AcquireFailure {
                                attempts,
                                kind: FailureKind::Abandoned,
                                message: format!("abandoned during backoff after: {}", error),
                            });
                        }
                        _ = shutdown.wait() => {
                            return Err(AcquireFailure {
                                attempts,
                                kind: FailureKind::Cancelled,
                                message: format!("shutdown during backoff after: {}", error),
                            });
                        }
                        _ = sleep(delay) => {}
                    }
                }
                RetryDecision::Failed => {
                    return Err(AcquireFailure {
                        attempts,
                        kind: FailureKind::Connect {
                            kind: error.kind(),
                        },
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    /// Best-effort close, bounded in time
    async fn release(&self, target: &Target, session: Box<dyn Session>) {
        if timeout(SESSION_CLOSE_TIMEOUT, session.close()).await.is_err() {
            warn!(
                host = %target,
                timeout_ms = SESSION_CLOSE_TIMEOUT.as_millis() as u64,
                "Session close timed out"
            );
        } else {
            debug!(host = %target, "Session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackupOutcome, Secret, SessionErrorKind};
    use crate::port::session_client::mocks::{HostScript, MockSessionClient};
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use std::time::Duration;

    fn worker(client: Arc<MockSessionClient>) -> BackupWorker {
        BackupWorker::new(
            client,
            Arc::new(Credential::new("admin", Secret::new("pw"))),
            Arc::new(RetryPolicy::default()),
            Arc::new(FixedTimeProvider::at_date(2024, 1, 1)),
        )
    }

    fn idle_signals() -> (ShutdownSender, ShutdownSender, WorkerSignals) {
        let (shutdown_tx, shutdown) = shutdown_channel();
        let (abandon_tx, abandon) = shutdown_channel();
        (shutdown_tx, abandon_tx, WorkerSignals { shutdown, abandon })
    }

    #[tokio::test]
    async fn test_success_closes_once() {
        let client =
            Arc::new(MockSessionClient::new().with_host("r1", HostScript::ok("hostname r1")));
        let (_s, _a, signals) = idle_signals();

        let attempt = worker(client.clone()).backup(&Target::new("r1", None), signals).await;

        assert_eq!(
            attempt.outcome,
            BackupOutcome::Success {
                text: "hostname r1".to_string()
            }
        );
        assert_eq!(attempt.attempts, 1);
        assert_eq!(client.close_calls("r1"), 1);
        assert_eq!(client.leaked_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retried_then_succeeds() {
        let client = Arc::new(MockSessionClient::new().with_host(
            "r1",
            HostScript::connect_fails(2, SessionErrorKind::Timeout).with_output("cfg"),
        ));
        let (_s, _a, signals) = idle_signals();

        let attempt = worker(client.clone()).backup(&Target::new("r1", None), signals).await;

        assert!(attempt.is_success());
        assert_eq!(attempt.attempts, 3);
        assert_eq!(client.connect_calls("r1"), 3);
        assert_eq!(client.close_calls("r1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_exhausted_never_closes() {
        let client = Arc::new(MockSessionClient::new().with_host("r1", HostScript::unreachable()));
        let (_s, _a, signals) = idle_signals();

        let attempt = worker(client.clone()).backup(&Target::new("r1", None), signals).await;

        match attempt.outcome {
            BackupOutcome::Failure { kind, .. } => assert_eq!(
                kind,
                FailureKind::Connect {
                    kind: SessionErrorKind::Unreachable
                }
            ),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(attempt.attempts, 3);
        assert_eq!(client.connect_calls("r1"), 3);
        assert_eq!(client.close_calls("r1"), 0);
    }

    #[tokio::test]
    async fn test_exec_failure_not_retried() {
        let client = Arc::new(
            MockSessionClient::new()
                .with_host("r1", HostScript::exec_fails(SessionErrorKind::Protocol)),
        );
        let (_s, _a, signals) = idle_signals();

        let attempt = worker(client.clone()).backup(&Target::new("r1", None), signals).await;

        assert!(matches!(
            attempt.outcome,
            BackupOutcome::Failure {
                kind: FailureKind::Exec,
                ..
            }
        ));
        assert_eq!(client.connect_calls("r1"), 1);
        assert_eq!(client.execute_calls("r1"), 1);
        assert_eq!(client.close_calls("r1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_cancels() {
        let client = Arc::new(MockSessionClient::new().with_host("r1", HostScript::unreachable()));
        let (shutdown_tx, _a, signals) = idle_signals();
        let worker = worker(client.clone());
        let target = Target::new("r1", None);

        let handle = tokio::spawn(async move { worker.backup(&target, signals).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown_tx.shutdown();
        let attempt = handle.await.unwrap();

        assert!(matches!(
            attempt.outcome,
            BackupOutcome::Failure {
                kind: FailureKind::Cancelled,
                ..
            }
        ));
        assert_eq!(client.connect_calls("r1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_during_exec_still_closes() {
        let client = Arc::new(MockSessionClient::new().with_host("r1", HostScript::hangs()));
        let (_s, abandon_tx, signals) = idle_signals();
        let worker = worker(client.clone());
        let target = Target::new("r1", None);

        let handle = tokio::spawn(async move { worker.backup(&target, signals).await });
        tokio::time::sleep(Duration::from_secs(10)).await;
        abandon_tx.shutdown();
        let attempt = handle.await.unwrap();

        assert!(matches!(
            attempt.outcome,
            BackupOutcome::Failure {
                kind: FailureKind::Abandoned,
                ..
            }
        ));
        assert_eq!(client.close_calls("r1"), 1);
        assert_eq!(client.leaked_sessions(), 0);
    }

    #[test]
    fn test_command_override() {
        let client = Arc::new(MockSessionClient::new());
        let target = Target::new("r1", None);
        assert_eq!(worker(client.clone()).command_for(&target), "show running-config");
        assert_eq!(
            worker(client).with_command("show run brief").command_for(&target),
            "show run brief"
        );
    }
}
