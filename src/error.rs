//! Error types for the journal reader library.

use thiserror::Error;

/// The main error type for journal reader operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading journals or listing the journal directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The native file-change notification backend failed.
    #[error("File watcher error: {0}")]
    WatchBackend(#[from] notify::Error),

    /// The watched directory (or a file inside it) does not exist.
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    /// A journal line could not be parsed into an event.
    #[error("Malformed record ({reason}): {line}")]
    MalformedRecord { line: String, reason: String },

    /// The journal directory never became accessible during startup.
    #[error("Journal directory unavailable after {attempts} attempt(s): {path}")]
    DirectoryUnavailable { path: String, attempts: u32 },

    /// The supplied configuration was rejected.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// A convenient Result type for journal reader operations.
pub type Result<T> = std::result::Result<T, Error>;
