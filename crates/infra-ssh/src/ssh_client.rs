// SSH session client
// reason: ssh2 is blocking; every libssh2 call runs on spawn_blocking and the
// ssh2::Session is moved into the blocking task and back, so no handle is shared
use async_trait::async_trait;
use ssh2::ErrorCode;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

use netbackup_core::domain::{Credential, Secret, SessionErrorKind, Target};
use netbackup_core::port::{Session, SessionClient, SessionError};

/// libssh2 error codes the classifier cares about
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// SSH transport tuning
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// TCP connect, handshake and authentication budget
    pub connect_timeout: Duration,
    /// Budget for any single blocking libssh2 call while running a command
    pub command_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// SessionClient over SSH with password authentication
pub struct SshSessionClient {
    config: SshConfig,
}

impl SshSessionClient {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

impl Default for SshSessionClient {
    fn default() -> Self {
        Self::new(SshConfig::default())
    }
}

#[async_trait]
impl SessionClient for SshSessionClient {
    async fn connect(
        &self,
        target: &Target,
        credential: &Credential,
    ) -> Result<Box<dyn Session>, SessionError> {
        let (host, port) = target.host_port();
        let host = host.to_string();
        let username = credential.username().to_string();
        let password = credential.secret().clone();
        let config = self.config.clone();

        debug!(host = %target, port = port, user = %username, "Opening SSH session");

        let session = tokio::task::spawn_blocking(move || {
            open_session(&host, port, &username, &password, &config)
        })
        .await
        .map_err(|e| SessionError::Protocol(format!("SSH connect task failed: {}", e)))??;

        info!(host = %target, "SSH session established");
        Ok(Box::new(SshSession {
            host: target.to_string(),
            inner: Some(session),
        }))
    }
}

/// One authenticated SSH connection
pub struct SshSession {
    host: String,
    /// None while a blocking call owns the session, or after it was lost
    inner: Option<ssh2::Session>,
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        let session = self
            .inner
            .take()
            .ok_or_else(|| SessionError::Protocol("session is no longer usable".to_string()))?;
        let command = command.to_string();

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = run_command(&session, &command);
            (session, result)
        })
        .await
        .map_err(|e| SessionError::Protocol(format!("SSH exec task failed: {}", e)))?;

        self.inner = Some(session);
        result
    }

    async fn close(self: Box<Self>) {
        let SshSession { host, inner } = *self;
        let Some(session) = inner else {
            // Still held by an abandoned exec task; dropping it there closes the socket
            debug!(host = %host, "SSH session already released");
            return;
        };

        let disconnected = tokio::task::spawn_blocking(move || {
            session.disconnect(None, "backup complete", None)
        })
        .await;

        match disconnected {
            Ok(Ok(())) => debug!(host = %host, "SSH session disconnected"),
            Ok(Err(e)) => debug!(host = %host, error = %e, "SSH disconnect failed, ignoring"),
            Err(e) => debug!(host = %host, error = %e, "SSH disconnect task failed, ignoring"),
        }
    }
}

/// Resolve, connect, handshake and authenticate (blocking)
fn open_session(
    host: &str,
    port: u16,
    username: &str,
    password: &Secret,
    config: &SshConfig,
) -> Result<ssh2::Session, SessionError> {
    let tcp = connect_tcp(host, port, config.connect_timeout)?;

    let mut session = ssh2::Session::new()
        .map_err(|e| ssh_error(&e, SessionErrorKind::Protocol, "SSH session init failed"))?;
    session.set_timeout(timeout_millis(config.connect_timeout));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| ssh_error(&e, SessionErrorKind::Protocol, "SSH handshake failed"))?;

    session
        .userauth_password(username, password.expose())
        .map_err(|e| ssh_error(&e, SessionErrorKind::Auth, "SSH authentication failed"))?;
    if !session.authenticated() {
        return Err(SessionError::Auth(format!(
            "SSH authentication failed for user '{}'",
            username
        )));
    }

    session.set_timeout(timeout_millis(config.command_timeout));
    Ok(session)
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, SessionError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            SessionError::Unreachable(format!("cannot resolve {}:{}: {}", host, port, e))
        })?
        .collect();

    let mut last_error = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => SessionError::new(
            classify_io(&e),
            format!("SSH connect to {}:{} failed: {}", host, port, e),
        ),
        None => SessionError::Unreachable(format!("no address found for {}:{}", host, port)),
    })
}

/// Run one command on its own exec channel (blocking)
fn run_command(session: &ssh2::Session, command: &str) -> Result<String, SessionError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| ssh_error(&e, SessionErrorKind::Protocol, "SSH channel open failed"))?;
    channel
        .exec(command)
        .map_err(|e| ssh_error(&e, SessionErrorKind::Protocol, "SSH exec failed"))?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).map_err(|e| {
        SessionError::new(
            read_error_kind(&e),
            format!("SSH read failed: {}", e),
        )
    })?;
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    channel.wait_close().ok();
    let exit_status = channel.exit_status().unwrap_or(0);

    if exit_status != 0 && stdout.trim().is_empty() {
        return Err(SessionError::Protocol(if stderr.trim().is_empty() {
            format!("command exited with status {}", exit_status)
        } else {
            format!("command failed: {}", stderr.trim())
        }));
    }

    Ok(stdout)
}

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Connect-phase IO errors: anything but a timeout means the host is not reachable
fn classify_io(error: &io::Error) -> SessionErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SessionErrorKind::Timeout,
        _ => SessionErrorKind::Unreachable,
    }
}

fn read_error_kind(error: &io::Error) -> SessionErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SessionErrorKind::Timeout,
        _ => SessionErrorKind::Protocol,
    }
}

/// Timeouts and auth failures are recognised by code, everything else takes `fallback`
fn classify_ssh(error: &ssh2::Error, fallback: SessionErrorKind) -> SessionErrorKind {
    match error.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT)
        | ErrorCode::Session(LIBSSH2_ERROR_SOCKET_TIMEOUT) => SessionErrorKind::Timeout,
        ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED) => SessionErrorKind::Auth,
        _ => fallback,
    }
}

fn ssh_error(error: &ssh2::Error, fallback: SessionErrorKind, context: &str) -> SessionError {
    SessionError::new(
        classify_ssh(error, fallback),
        format!("{}: {}", context, error),
    )
}
