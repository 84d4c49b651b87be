use std::fs::read_to_string;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswdError {
    #[error("Failed to read user database {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Malformed passwd entry on line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// A single local user account, snapshotted at the start of a cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
}

/// Takes a full snapshot of the local user accounts from a passwd(5)-format
/// file. Enumeration order is whatever the file happens to contain; callers
/// must sort before relying on any ordering.
pub fn snapshot(path: &Path) -> Result<Vec<UserRecord>, PasswdError> {
    let content = read_to_string(path).map_err(|source| PasswdError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&content)
}

fn parse(content: &str) -> Result<Vec<UserRecord>, PasswdError> {
    let mut users = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut iter = trimmed.split(':');
        let name = iter.next().filter(|name| !name.is_empty()).ok_or_else(|| {
            PasswdError::Malformed {
                line: i + 1,
                reason: "user name not found".into(),
            }
        })?;
        // Second field is the password placeholder
        let _ = iter.next().ok_or_else(|| PasswdError::Malformed {
            line: i + 1,
            reason: "password field not found".into(),
        })?;
        let uid = iter
            .next()
            .ok_or_else(|| PasswdError::Malformed {
                line: i + 1,
                reason: "uid field not found".into(),
            })?
            .parse()
            .map_err(|err| PasswdError::Malformed {
                line: i + 1,
                reason: format!("uid is not a number: {err}"),
            })?;

        users.push(UserRecord {
            name: name.to_owned(),
            uid,
        });
    }

    Ok(users)
}
