//! Target list loading
//!
//! Format: one target per line, `identifier [device_type]`.
//! Blank lines and `#` comments (whole-line or trailing) are skipped; duplicates keep the first
//! occurrence and are reported with a warning.

use crate::domain::{DeviceType, LoadError, Target};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Read and parse a target list file
pub async fn load_targets(path: impl AsRef<Path>) -> Result<Vec<Target>, LoadError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

    let targets = parse_targets(&text)?;
    info!(path = %path.display(), count = targets.len(), "Target list loaded");
    Ok(targets)
}

/// Parse target list text into ordered, de-duplicated targets
pub fn parse_targets(text: &str) -> Result<Vec<Target>, LoadError> {
    let mut targets = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let target = parse_line(line, line_no)?;
        let key = target.id().to_ascii_lowercase();
        if let Some(first_line) = seen.get(&key) {
            warn!(
                host = %target,
                line = line_no,
                first_line = *first_line,
                "Duplicate target ignored"
            );
            continue;
        }
        seen.insert(key, line_no);
        targets.push(target);
    }

    if targets.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(targets)
}

fn parse_line(line: &str, line_no: usize) -> Result<Target, LoadError> {
    let mut fields = line.split_whitespace();
    // Non-empty after trim, so there is always a first field
    let id = fields.next().unwrap_or_default();
    let device_type = fields.next().map(DeviceType::from_tag);

    if fields.next().is_some() {
        return Err(LoadError::InvalidLine {
            line: line_no,
            reason: format!("expected `host [device_type]`, got `{}`", line),
        });
    }

    // The identifier becomes an artifact file name: no separators, no hidden files
    if id.starts_with('.') || id.contains(['/', '\\']) || id.chars().any(char::is_control) {
        return Err(LoadError::InvalidLine {
            line: line_no,
            reason: format!("`{}` is not a valid host identifier", id),
        });
    }

    Ok(Target::new(id, device_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_trims_and_skips_blank_lines() {
        let targets = assert_ok!(parse_targets("  10.0.0.1  \n\n\t\n10.0.0.2\r\n"));
        let ids: Vec<&str> = targets.iter().map(Target::id).collect();
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let targets = assert_ok!(parse_targets("core-sw nxos\nedge\nCORE-SW\n"));
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id(), "core-sw");
        assert_eq!(targets[0].device_type(), Some(&DeviceType::CiscoNxos));
        assert_eq!(targets[1].id(), "edge");
    }

    #[test]
    fn test_comments_skipped() {
        let targets = assert_ok!(parse_targets("# core\n10.0.0.1 # not a tag\n"));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = assert_err!(parse_targets("\n  \n# only comments\n"));
        assert!(matches!(err, LoadError::Empty));
    }

    #[test]
    fn test_extra_fields_rejected() {
        let err = assert_err!(parse_targets("10.0.0.1\n10.0.0.2 ios extra\n"));
        assert!(matches!(err, LoadError::InvalidLine { line: 2, .. }));
    }

    #[test]
    fn test_path_separators_rejected() {
        let err = assert_err!(parse_targets("../etc/passwd\n"));
        assert!(matches!(err, LoadError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn test_leading_dot_rejected() {
        let err = assert_err!(parse_targets("10.0.0.1\n.r1\n"));
        assert!(matches!(err, LoadError::InvalidLine { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let err = assert_err!(load_targets("/nonexistent/netbackup/targets.txt").await);
        assert!(matches!(err, LoadError::Unreadable { .. }));
    }
}
