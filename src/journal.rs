//! The journal watcher: ties change detection, journal selection and tailing
//! together and hands event batches to a callback.

use crate::bootstrap::BootstrapScanner;
use crate::config::WatchConfig;
use crate::entry::{EntryParser, Event};
use crate::error::Result;
use crate::reader::TailReader;
use crate::selector::{is_journal_file, latest_journal, wait_for_directory};
use crate::watcher::{Backend, ChangeSignal, ChangeSource, spawn_heartbeat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;

/// Callback invoked with each batch of new events.
pub type EventCallback = Box<dyn Fn(Vec<Event>) + Send + Sync + 'static>;

/// Lifecycle of a [`JournalWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// No journal exists yet; waiting for one to be created.
    Unattached,
    /// A current journal is being tailed.
    Attached,
    /// `stop()` was called.
    Stopped,
}

struct WatchState {
    directory: PathBuf,
    reader: TailReader,
    current: Option<PathBuf>,
    current_tx: watch::Sender<Option<PathBuf>>,
    callback: Option<EventCallback>,
    stopped: bool,
}

impl WatchState {
    fn phase(&self) -> WatchPhase {
        match (self.stopped, &self.current) {
            (true, _) => WatchPhase::Stopped,
            (false, None) => WatchPhase::Unattached,
            (false, Some(_)) => WatchPhase::Attached,
        }
    }

    fn set_current(&mut self, path: PathBuf) {
        self.current = Some(path.clone());
        self.current_tx.send_replace(Some(path));
    }

    /// Decides whether a signal for `path` should be processed, switching the
    /// current journal when a newer one shows up.
    ///
    /// Journals are identified and ordered by file name only; the tracked path
    /// is always rebuilt under the watched directory.
    fn track(&mut self, path: &Path) -> bool {
        if !is_journal_file(path) {
            return false;
        }
        let Some(name) = path.file_name() else {
            return false;
        };

        let current = self.current.clone();
        match current.as_deref().and_then(Path::file_name) {
            Some(current_name) if current_name == name => true,
            Some(current_name) if name > current_name => {
                let next = self.directory.join(name);
                tracing::info!(
                    from = %Path::new(current_name).display(),
                    to = %next.display(),
                    "journal rotated"
                );
                self.set_current(next);
                true
            }
            Some(current_name) => {
                tracing::debug!(
                    path = %path.display(),
                    current = %Path::new(current_name).display(),
                    "ignoring change to an older journal"
                );
                false
            }
            None => {
                let next = self.directory.join(name);
                tracing::info!(path = %next.display(), "journal appeared");
                self.set_current(next);
                true
            }
        }
    }

    /// Tails the current journal and hands the resulting batch to the
    /// callback. Failures are logged, never propagated.
    async fn process_current(&mut self) {
        let Some(path) = self.current.clone() else {
            return;
        };

        match self.reader.process(&path).await {
            Ok(events) => {
                tracing::debug!(path = %path.display(), events = events.len(), "journal processed");
                match &self.callback {
                    Some(callback) => callback(events),
                    None if !events.is_empty() => {
                        tracing::debug!(events = events.len(), "no callback registered, dropping events");
                    }
                    None => {}
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to process journal change, will retry on the next change"
                );
            }
        }
    }
}

/// Watches a journal directory and delivers new events to a callback.
///
/// ```rust,no_run
/// use journal_reader::JournalWatcher;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut watcher = JournalWatcher::start("/path/to/journals", false).await?;
///     watcher
///         .register_callback(|events| {
///             for event in events {
///                 println!("{}", event.kind());
///             }
///         })
///         .await;
///     watcher.trigger_current_journal_check().await;
///
///     tokio::signal::ctrl_c().await?;
///     watcher.stop().await;
///     Ok(())
/// }
/// ```
pub struct JournalWatcher {
    directory: PathBuf,
    backend: watch::Receiver<Backend>,
    state: Arc<Mutex<WatchState>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl JournalWatcher {
    /// Starts watching `directory` with default settings.
    pub async fn start<P: AsRef<Path>>(directory: P, force_polling: bool) -> Result<Self> {
        let config = WatchConfig {
            force_polling,
            ..WatchConfig::default()
        };
        Self::with_config(directory, config).await
    }

    /// Starts watching `directory`.
    ///
    /// Waits for the directory according to `config.directory_retry`, selects
    /// the latest journal (if any) and spawns the watch loop. The journal is
    /// not read until a change is signalled or
    /// [`trigger_current_journal_check`](Self::trigger_current_journal_check)
    /// is called.
    ///
    /// The directory is canonicalized, so a relative path is watched under its
    /// absolute name.
    pub async fn with_config<P: AsRef<Path>>(directory: P, config: WatchConfig) -> Result<Self> {
        config.validate()?;

        wait_for_directory(directory.as_ref(), &config.directory_retry).await?;
        let directory = tokio::fs::canonicalize(directory.as_ref()).await?;
        let current = latest_journal(&directory)?;
        match &current {
            Some(path) => tracing::info!(path = %path.display(), "current journal selected"),
            None => tracing::info!(path = %directory.display(), "no journal yet, waiting for one"),
        }

        let source = ChangeSource::open(&directory, &config);
        let backend = source.subscribe_backend();

        let (current_tx, current_rx) = watch::channel(current.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        let reader = TailReader::new(
            EntryParser::new(config.kind_field.clone(), config.timestamp_field.clone()),
            BootstrapScanner::new(config.state_kinds.iter().cloned()),
        );
        let state = Arc::new(Mutex::new(WatchState {
            directory: directory.clone(),
            reader,
            current,
            current_tx,
            callback: None,
            stopped: false,
        }));

        let mut tasks = Vec::with_capacity(2);
        let loop_state = Arc::clone(&state);
        let loop_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            watch_loop(source, loop_state, loop_shutdown).await;
        }));

        if let Some(period) = config.heartbeat_interval() {
            tasks.push(spawn_heartbeat(current_rx, period, shutdown_tx.subscribe()));
        }

        tracing::info!(path = %directory.display(), backend = ?*backend.borrow(), "journal watcher started");

        Ok(Self {
            directory,
            backend,
            state,
            shutdown_tx,
            tasks,
        })
    }

    /// Sets the callback, replacing any previous one.
    pub async fn register_callback<F>(&self, callback: F)
    where
        F: Fn(Vec<Event>) + Send + Sync + 'static,
    {
        self.state.lock().await.callback = Some(Box::new(callback));
    }

    /// Processes the current journal right away, without waiting for a change.
    ///
    /// When no journal is attached yet the directory is scanned again first.
    pub async fn trigger_current_journal_check(&self) {
        let mut state = self.state.lock().await;
        if state.stopped {
            return;
        }

        if state.current.is_none() {
            match latest_journal(&self.directory) {
                Ok(Some(path)) => {
                    state.track(&path);
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(path = %self.directory.display(), error = %e, "cannot scan journal directory");
                    return;
                }
            }
        }

        state.process_current().await;
    }

    /// Stops watching. Idempotent; no callback runs after this returns.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());

        {
            // Waits for an in-flight batch to finish.
            let mut state = self.state.lock().await;
            if !state.stopped {
                state.stopped = true;
                tracing::info!(path = %self.directory.display(), "journal watcher stopped");
            }
        }

        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    /// The canonical journal directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The active change source; turns into `Polling` if a native watch is lost.
    pub fn backend(&self) -> Backend {
        *self.backend.borrow()
    }

    pub async fn current_journal(&self) -> Option<PathBuf> {
        self.state.lock().await.current.clone()
    }

    pub async fn phase(&self) -> WatchPhase {
        self.state.lock().await.phase()
    }
}

impl Drop for JournalWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn watch_loop(
    mut source: ChangeSource,
    state: Arc<Mutex<WatchState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            signal = source.next_signal() => {
                match signal {
                    Some(signal) => handle_signal(&state, signal).await,
                    None => {
                        tracing::warn!("change source closed, journal watching ended");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_signal(state: &Mutex<WatchState>, signal: ChangeSignal) {
    let mut state = state.lock().await;
    if state.stopped {
        return;
    }

    tracing::debug!(path = %signal.path.display(), kind = ?signal.kind, "journal change");
    if state.track(&signal.path) {
        state.process_current().await;
    }
}
