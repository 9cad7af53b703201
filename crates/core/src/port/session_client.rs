// Session Client Port
// Remote shell access to a device: connect, run one command, close

use crate::domain::{Credential, SessionErrorKind, Target};
use async_trait::async_trait;
use thiserror::Error;

/// Classified session failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            SessionErrorKind::Auth => SessionError::Auth(message),
            SessionErrorKind::Timeout => SessionError::Timeout(message),
            SessionErrorKind::Unreachable => SessionError::Unreachable(message),
            SessionErrorKind::Protocol => SessionError::Protocol(message),
        }
    }

    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::Auth(_) => SessionErrorKind::Auth,
            SessionError::Timeout(_) => SessionErrorKind::Timeout,
            SessionError::Unreachable(_) => SessionErrorKind::Unreachable,
            SessionError::Protocol(_) => SessionErrorKind::Protocol,
        }
    }
}

/// An authenticated connection owned by exactly one worker
#[async_trait]
pub trait Session: Send {
    /// Run a command and return its captured output
    async fn execute(&mut self, command: &str) -> Result<String, SessionError>;

    /// Release the connection. Best-effort: never fails.
    async fn close(self: Box<Self>);
}

/// Factory for sessions
///
/// Implementations:
/// - SshSessionClient (infra-ssh): libssh2 over TCP
/// - MockSessionClient: scripted per-host behavior for tests
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Establish an authenticated session to the target
    ///
    /// # Errors
    /// Any `SessionError` variant; the caller decides whether to retry.
    async fn connect(
        &self,
        target: &Target,
        credential: &Credential,
    ) -> Result<Box<dyn Session>, SessionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What `execute` does on a scripted host
    #[derive(Debug, Clone)]
    pub enum ExecBehavior {
        /// Return this text
        Output(String),
        /// Fail with this classification
        Fail(SessionErrorKind),
        /// Never return (for deadline and shutdown testing)
        Hang,
    }

    /// Scripted behavior for one host
    #[derive(Debug, Clone)]
    pub struct HostScript {
        connect_failures: u32,
        connect_error: SessionErrorKind,
        connect_delay: Duration,
        exec: ExecBehavior,
        exec_delay: Duration,
    }

    impl HostScript {
        /// Connect and execute succeed, returning `output`
        pub fn ok(output: impl Into<String>) -> Self {
            Self {
                connect_failures: 0,
                connect_error: SessionErrorKind::Unreachable,
                connect_delay: Duration::ZERO,
                exec: ExecBehavior::Output(output.into()),
                exec_delay: Duration::ZERO,
            }
        }

        /// The first `times` connects fail with `kind`, later ones succeed
        pub fn connect_fails(times: u32, kind: SessionErrorKind) -> Self {
            Self {
                connect_failures: times,
                connect_error: kind,
                ..Self::ok("")
            }
        }

        /// Every connect fails
        pub fn unreachable() -> Self {
            Self::connect_fails(u32::MAX, SessionErrorKind::Unreachable)
        }

        pub fn exec_fails(kind: SessionErrorKind) -> Self {
            Self {
                exec: ExecBehavior::Fail(kind),
                ..Self::ok("")
            }
        }

        pub fn hangs() -> Self {
            Self {
                exec: ExecBehavior::Hang,
                ..Self::ok("")
            }
        }

        pub fn with_output(mut self, output: impl Into<String>) -> Self {
            self.exec = ExecBehavior::Output(output.into());
            self
        }

        pub fn with_connect_delay(mut self, delay: Duration) -> Self {
            self.connect_delay = delay;
            self
        }

        pub fn with_exec_delay(mut self, delay: Duration) -> Self {
            self.exec_delay = delay;
            self
        }
    }

    #[derive(Default)]
    struct MockStats {
        connects: HashMap<String, u32>,
        executes: HashMap<String, u32>,
        closes: HashMap<String, u32>,
        active: usize,
        peak: usize,
        leaked: usize,
    }

    /// Scripted session client; unknown hosts are unreachable
    #[derive(Default)]
    pub struct MockSessionClient {
        scripts: HashMap<String, HostScript>,
        stats: Arc<Mutex<MockStats>>,
    }

    impl MockSessionClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_host(mut self, host: impl Into<String>, script: HostScript) -> Self {
            self.scripts.insert(host.into(), script);
            self
        }

        pub fn connect_calls(&self, host: &str) -> u32 {
            self.stats.lock().unwrap().connects.get(host).copied().unwrap_or(0)
        }

        pub fn execute_calls(&self, host: &str) -> u32 {
            self.stats.lock().unwrap().executes.get(host).copied().unwrap_or(0)
        }

        pub fn close_calls(&self, host: &str) -> u32 {
            self.stats.lock().unwrap().closes.get(host).copied().unwrap_or(0)
        }

        /// Sessions currently open
        pub fn active_sessions(&self) -> usize {
            self.stats.lock().unwrap().active
        }

        /// Highest number of simultaneously open sessions
        pub fn peak_sessions(&self) -> usize {
            self.stats.lock().unwrap().peak
        }

        /// Sessions dropped without `close`
        pub fn leaked_sessions(&self) -> usize {
            self.stats.lock().unwrap().leaked
        }
    }

    #[async_trait]
    impl SessionClient for MockSessionClient {
        async fn connect(
            &self,
            target: &Target,
            _credential: &Credential,
        ) -> Result<Box<dyn Session>, SessionError> {
            let script = self
                .scripts
                .get(target.id())
                .cloned()
                .unwrap_or_else(HostScript::unreachable);

            let attempt = {
                let mut stats = self.stats.lock().unwrap();
                let count = stats.connects.entry(target.id().to_string()).or_insert(0);
                *count += 1;
                *count
            };

            if !script.connect_delay.is_zero() {
                tokio::time::sleep(script.connect_delay).await;
            }

            if attempt <= script.connect_failures {
                return Err(SessionError::new(
                    script.connect_error,
                    format!("scripted connect failure #{}", attempt),
                ));
            }

            {
                let mut stats = self.stats.lock().unwrap();
                stats.active += 1;
                stats.peak = stats.peak.max(stats.active);
            }

            Ok(Box::new(MockSession {
                host: target.id().to_string(),
                script,
                stats: Arc::clone(&self.stats),
                closed: false,
            }))
        }
    }

    struct MockSession {
        host: String,
        script: HostScript,
        stats: Arc<Mutex<MockStats>>,
        closed: bool,
    }

    #[async_trait]
    impl Session for MockSession {
        async fn execute(&mut self, _command: &str) -> Result<String, SessionError> {
            *self
                .stats
                .lock()
                .unwrap()
                .executes
                .entry(self.host.clone())
                .or_insert(0) += 1;

            if !self.script.exec_delay.is_zero() {
                tokio::time::sleep(self.script.exec_delay).await;
            }

            match &self.script.exec {
                ExecBehavior::Output(text) => Ok(text.clone()),
                ExecBehavior::Fail(kind) => {
                    Err(SessionError::new(*kind, "scripted command failure"))
                }
                ExecBehavior::Hang => std::future::pending().await,
            }
        }

        async fn close(mut self: Box<Self>) {
            self.closed = true;
            let mut stats = self.stats.lock().unwrap();
            *stats.closes.entry(self.host.clone()).or_insert(0) += 1;
            stats.active -= 1;
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            if !self.closed {
                let mut stats = self.stats.lock().unwrap();
                stats.leaked += 1;
                stats.active -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{HostScript, MockSessionClient};
    use super::*;
    use crate::domain::Secret;

    #[test]
    fn test_error_kind_roundtrip() {
        for kind in [
            SessionErrorKind::Auth,
            SessionErrorKind::Timeout,
            SessionErrorKind::Unreachable,
            SessionErrorKind::Protocol,
        ] {
            assert_eq!(SessionError::new(kind, "x").kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_mock_counts_sessions() {
        let client = MockSessionClient::new().with_host("r1", HostScript::ok("hostname r1"));
        let target = Target::new("r1", None);
        let cred = Credential::new("admin", Secret::new("pw"));

        let mut session = client.connect(&target, &cred).await.unwrap();
        assert_eq!(client.active_sessions(), 1);
        assert_eq!(session.execute("show running-config").await.unwrap(), "hostname r1");
        session.close().await;

        assert_eq!(client.active_sessions(), 0);
        assert_eq!(client.close_calls("r1"), 1);
        assert_eq!(client.leaked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_mock_unknown_host_unreachable() {
        let client = MockSessionClient::new();
        let target = Target::new("nowhere", None);
        let cred = Credential::new("admin", Secret::new("pw"));

        let err = client.connect(&target, &cred).await.err().unwrap();
        assert_eq!(err.kind(), SessionErrorKind::Unreachable);
    }
}
