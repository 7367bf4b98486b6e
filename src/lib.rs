//! A journal reader library that tails a directory of rotating, line-delimited
//! JSON journal files and delivers new events in real time.
//!
//! The newest `Journal.*.log` file in the directory is the current journal.
//! Appended bytes are read exactly once, split into complete lines and parsed
//! into [`Event`]s. When a journal is first attached, only the latest event
//! of each state-defining kind is replayed instead of the whole history. A
//! newer journal appearing in the directory replaces the current one.
//!
//! # Example
//!
//! ```rust,no_run
//! use journal_reader::watch_journal;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stream = watch_journal("/path/to/journals", None).await?;
//!
//!     while let Some(events) = stream.next().await {
//!         for event in events {
//!             println!("{} at {:?}", event.kind(), event.timestamp());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod bootstrap;
mod config;
mod decoder;
mod entry;
mod error;
mod journal;
mod reader;
mod selector;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use bootstrap::BootstrapScanner;
pub use config::{DEFAULT_STATE_KINDS, RetryPolicy, WatchConfig};
pub use decoder::{DecodedLines, decode_lines};
pub use entry::{EntryParser, Event};
pub use error::{Error, Result};
pub use journal::{EventCallback, JournalWatcher, WatchPhase};
pub use reader::{Delta, JournalCursor, TailReader};
pub use selector::{is_journal_file, latest_journal, list_journals, wait_for_directory};
pub use stream::JournalStream;
pub use watcher::{Backend, ChangeKind, ChangeSignal};

use std::path::Path;
use tokio_stream::Stream;

/// Creates a stream of event batches from a journal directory.
///
/// # Arguments
///
/// * `directory` - Directory holding the `Journal.*.log` files
/// * `config` - Watcher settings (defaults when `None`)
///
/// # Example
///
/// ```rust,no_run
/// use journal_reader::{WatchConfig, watch_journal};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = WatchConfig {
///         force_polling: true,
///         ..WatchConfig::default()
///     };
///     let mut stream = watch_journal("/path/to/journals", Some(config)).await?;
///
///     while let Some(events) = stream.next().await {
///         println!("{} new events", events.len());
///     }
///
///     Ok(())
/// }
/// ```
pub async fn watch_journal<P: AsRef<Path>>(
    directory: P,
    config: Option<WatchConfig>,
) -> Result<impl Stream<Item = Vec<Event>>> {
    JournalStream::new(directory, config).await
}
