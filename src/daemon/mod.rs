use std::fs::read_to_string;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

mod shutdown;

pub use shutdown::ShutdownToken;

use crate::config::Config;
use crate::fs::atomic::{WriteError, write_atomic};
use crate::passwd::{self, PasswdError};
use crate::reconcile::{self, Reconciliation, SubordinateRange};

#[cfg(test)]
mod tests;

/// A failure confined to one reconciliation cycle. The daemon logs these and
/// carries on; only one-shot mode turns them into a process exit.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("User database unavailable: {0}")]
    Directory(#[from] PasswdError),
    #[error("Failed to read mapping file {path:?}: {source}")]
    ReadMapping { path: PathBuf, source: io::Error },
    #[error("Failed to persist mapping file {path:?}: {source}")]
    Persist { path: PathBuf, source: WriteError },
}

/// Runs one full reconciliation cycle: snapshot the user database, compare
/// the desired mapping set against both persisted files, and rewrite them
/// atomically when anything differs. The subuid and subgid files receive
/// identical content, written in that order; a failure on either leaves the
/// cycle failed and the next cycle recomputes from scratch.
pub fn run_cycle(config: &Config) -> Result<Reconciliation, CycleError> {
    let users = passwd::snapshot(&config.passwd_file)?;

    debug!("snapshot contains {} user accounts", users.len());

    let persisted_subuid = load_persisted(&config.subuid_file)?;
    let persisted_subgid = load_persisted(&config.subgid_file)?;

    let mut result = reconcile::reconcile(config, &users, &persisted_subuid);

    // A cycle that failed between the two writes leaves the files out of
    // step with each other; treat a stale sibling as a change too.
    if !result.changed && result.ranges != persisted_subgid {
        debug!("subgid file out of step with subuid file, scheduling rewrite");
        result.changed = true;
    }

    if result.changed {
        let rendered = reconcile::render(&result.ranges);

        for path in [&config.subuid_file, &config.subgid_file] {
            write_atomic(path, &rendered).map_err(|source| CycleError::Persist {
                path: (*path).clone(),
                source,
            })?;
        }

        info!(
            "wrote {} subordinate id ranges to {:?} and {:?}",
            result.ranges.len(),
            config.subuid_file,
            config.subgid_file
        );
    } else {
        debug!("mapping files already up to date");
    }

    Ok(result)
}

/// Daemon loop: reconcile, then sleep `service_timeout` seconds in
/// shutdown-poll increments, until the token fires. Per-cycle errors are
/// logged and the loop continues; an in-flight cycle is always allowed to
/// finish before the flag is observed.
pub fn run(config: &Config, token: &ShutdownToken) {
    info!(
        "entering reconciliation loop with a {}s interval",
        config.service_timeout
    );

    loop {
        if let Err(err) = run_cycle(config) {
            error!("skipping cycle: {err}");
        }

        if token.wait(Duration::from_secs(config.service_timeout)) {
            break;
        }
    }

    info!("shutdown requested, leaving reconciliation loop");
}

fn load_persisted(path: &Path) -> Result<Vec<SubordinateRange>, CycleError> {
    let content = match read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) if err.kind() == io::ErrorKind::IsADirectory => {
            // Let the write path report the destination problem precisely
            warn!("mapping file {path:?} is a directory, scheduling rewrite");
            return Ok(Vec::new());
        },
        Err(source) => {
            return Err(CycleError::ReadMapping {
                path: path.to_path_buf(),
                source,
            });
        },
    };

    match reconcile::parse_mapping_file(&content) {
        Ok(ranges) => Ok(ranges),
        Err(err) => {
            // Never let a corrupted target file wedge the daemon; rewrite it
            warn!("unparseable mapping file {path:?}, scheduling rewrite: {err}");
            Ok(Vec::new())
        },
    }
}
