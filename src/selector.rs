//! Locating the current journal inside the journal directory.

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

const JOURNAL_PREFIX: &str = "Journal.";
const JOURNAL_SUFFIX: &str = ".log";

/// Whether `path` names a journal file (`Journal.*.log`, case-sensitive).
pub fn is_journal_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_journal_name)
}

fn is_journal_name(name: &str) -> bool {
    name.len() >= JOURNAL_PREFIX.len() + JOURNAL_SUFFIX.len()
        && name.starts_with(JOURNAL_PREFIX)
        && name.ends_with(JOURNAL_SUFFIX)
}

/// Returns every journal file directly inside `directory`, sorted ascending.
pub fn list_journals(directory: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|e| not_found_or_io(directory, e))?;

    let mut journals: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| is_journal_file(path))
        .collect();

    journals.sort_unstable();
    Ok(journals)
}

/// Returns the current journal: the lexicographically greatest journal file.
///
/// Journal names embed a sortable timestamp, so this is also the newest one.
pub fn latest_journal(directory: &Path) -> Result<Option<PathBuf>> {
    Ok(list_journals(directory)?.pop())
}

/// Waits until `directory` exists, checking according to `policy`.
///
/// The first failed check is logged at warn level, later ones at debug.
pub async fn wait_for_directory(directory: &Path, policy: &RetryPolicy) -> Result<()> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match tokio::fs::metadata(directory).await {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(Error::PathNotFound {
                    path: directory.display().to_string(),
                });
            }
            Err(e) if attempt == 1 => {
                tracing::warn!(path = %directory.display(), error = %e, "journal directory not available yet");
            }
            Err(e) => {
                tracing::debug!(path = %directory.display(), attempt, error = %e, "still waiting for journal directory");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay()).await;
        }
    }

    Err(Error::DirectoryUnavailable {
        path: directory.display().to_string(),
        attempts,
    })
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::NotFound => Error::PathNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    }
}
