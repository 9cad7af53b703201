// netbackup Infrastructure - SSH Adapter
// Implements: SessionClient

pub mod ssh_client;

pub use ssh_client::{SshConfig, SshSession, SshSessionClient};
