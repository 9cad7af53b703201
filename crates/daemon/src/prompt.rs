//! Interactive fallbacks for values missing from flags and environment

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use tracing::warn;

use netbackup_core::domain::{Credential, Secret};

/// Build the credential, prompting for whatever was not supplied
pub fn resolve_credential(
    username: Option<String>,
    password: Option<String>,
) -> Result<Credential> {
    let username = match non_empty(username) {
        Some(username) => username,
        None => prompt_line("Username: ")?,
    };
    if username.is_empty() {
        bail!("A username is required");
    }

    let secret = match password {
        Some(password) => Secret::new(password),
        None => Secret::new(
            rpassword::prompt_password("Password: ").context("Failed to read password")?,
        ),
    };

    if secret.is_empty() {
        warn!(user = %username, "Empty password supplied");
    }

    Ok(Credential::new(username, secret))
}

/// Target file path with `~` expanded, prompting if not supplied
pub fn resolve_targets_path(in_file: Option<String>) -> Result<String> {
    let path = match non_empty(in_file) {
        Some(path) => path,
        None => prompt_line("Targets file: ")?,
    };
    if path.is_empty() {
        bail!("A targets file is required");
    }
    Ok(shellexpand::tilde(&path).into_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prompt_line(label: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", label)?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}
