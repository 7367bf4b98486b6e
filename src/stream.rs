//! Stream adapter over a [`JournalWatcher`].

use crate::config::WatchConfig;
use crate::entry::Event;
use crate::error::Result;
use crate::journal::JournalWatcher;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A stream of event batches from a journal directory.
///
/// The first item is the bootstrap batch of the current journal, if it has
/// any state events. Empty batches are never yielded. Dropping the stream
/// stops the underlying watcher.
pub struct JournalStream {
    receiver: mpsc::UnboundedReceiver<Vec<Event>>,
    watcher: JournalWatcher,
}

impl JournalStream {
    /// Creates a new JournalStream for the specified journal directory.
    pub async fn new<P: AsRef<Path>>(directory: P, config: Option<WatchConfig>) -> Result<Self> {
        let watcher =
            JournalWatcher::with_config(directory, config.unwrap_or_default()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        watcher
            .register_callback(move |events: Vec<Event>| {
                if !events.is_empty() {
                    let _ = tx.send(events);
                }
            })
            .await;

        // Read what the current journal already holds.
        watcher.trigger_current_journal_check().await;

        Ok(JournalStream {
            receiver: rx,
            watcher,
        })
    }

    pub async fn current_journal(&self) -> Option<PathBuf> {
        self.watcher.current_journal().await
    }

    /// Stops the underlying watcher; the stream ends once buffered batches
    /// have been drained.
    pub async fn stop(&mut self) {
        self.watcher.stop().await;
        self.watcher.register_callback(|_| {}).await;
    }
}

impl Stream for JournalStream {
    type Item = Vec<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
