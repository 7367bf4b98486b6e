//! Change detection for the journal directory using the notify crate, with a
//! polling fallback and a diagnostic heartbeat.

use crate::config::WatchConfig;
use crate::error::Result;
use crate::selector::{is_journal_file, list_journals};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What happened to a journal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// "This journal may have changed."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Which mechanism produces change signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Native,
    Polling,
}

/// A running source of change signals for one directory.
///
/// A native source whose watch is lost (backend error, directory removed or
/// moved) replaces itself with a polling source. Dropping it releases the OS
/// watch handle or stops the poll task.
pub(crate) struct ChangeSource {
    directory: PathBuf,
    poll_interval: Duration,
    receiver: mpsc::UnboundedReceiver<Notice>,
    handle: SourceHandle,
    backend_tx: watch::Sender<Backend>,
}

enum SourceHandle {
    Native(RecommendedWatcher),
    Polling(JoinHandle<()>),
}

/// What the backends put on the source channel.
#[derive(Debug)]
enum Notice {
    Change(ChangeSignal),
    WatchLost(String),
}

impl ChangeSource {
    /// Opens the backend selected by `config`, falling back to polling when
    /// native notifications cannot be set up.
    pub(crate) fn open(directory: &Path, config: &WatchConfig) -> Self {
        if config.force_polling {
            return Self::polling(directory, config.poll_interval());
        }

        match Self::native(directory, config.poll_interval()) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(
                    path = %directory.display(),
                    error = %e,
                    "native file watching unavailable, falling back to polling"
                );
                Self::polling(directory, config.poll_interval())
            }
        }
    }

    /// Watches `directory` (non-recursively) through OS notifications.
    ///
    /// `poll_interval` is used if the watch is later lost.
    pub(crate) fn native(directory: &Path, poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched = directory.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if watch_lost(&event, &watched) {
                        let reason = format!("{:?} on the watched directory", event.kind);
                        let _ = tx.send(Notice::WatchLost(reason));
                        return;
                    }
                    for signal in signals_from_event(&event) {
                        let _ = tx.send(Notice::Change(signal));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Notice::WatchLost(e.to_string()));
                }
            },
            Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            directory: directory.to_path_buf(),
            poll_interval,
            receiver: rx,
            handle: SourceHandle::Native(watcher),
            backend_tx: watch::channel(Backend::Native).0,
        })
    }

    /// Lists `directory` every `interval` and signals size changes.
    pub(crate) fn polling(directory: &Path, interval: Duration) -> Self {
        let (receiver, task) = spawn_polling(directory, interval, None);

        Self {
            directory: directory.to_path_buf(),
            poll_interval: interval,
            receiver,
            handle: SourceHandle::Polling(task),
            backend_tx: watch::channel(Backend::Polling).0,
        }
    }

    pub(crate) fn backend(&self) -> Backend {
        match self.handle {
            SourceHandle::Native(_) => Backend::Native,
            SourceHandle::Polling(_) => Backend::Polling,
        }
    }

    /// Follows backend changes, including a later switch to polling.
    pub(crate) fn subscribe_backend(&self) -> watch::Receiver<Backend> {
        self.backend_tx.subscribe()
    }

    /// Returns the next change signal.
    pub(crate) async fn next_signal(&mut self) -> Option<ChangeSignal> {
        loop {
            match self.receiver.recv().await? {
                Notice::Change(signal) => return Some(signal),
                Notice::WatchLost(reason) => self.fall_back_to_polling(&reason),
            }
        }
    }

    fn fall_back_to_polling(&mut self, reason: &str) {
        if self.backend() == Backend::Polling {
            return;
        }
        tracing::warn!(
            path = %self.directory.display(),
            reason,
            "native watch lost, switching to polling"
        );

        // Everything found by the first listing is reported, so journals
        // recreated while the watch was down are not missed.
        let (receiver, task) =
            spawn_polling(&self.directory, self.poll_interval, Some(Snapshot::new()));
        self.receiver = receiver;
        self.handle = SourceHandle::Polling(task);
        self.backend_tx.send_replace(Backend::Polling);
    }
}

impl Drop for ChangeSource {
    fn drop(&mut self) {
        if let SourceHandle::Polling(task) = &self.handle {
            task.abort();
        }
    }
}

fn spawn_polling(
    directory: &Path,
    interval: Duration,
    baseline: Option<Snapshot>,
) -> (mpsc::UnboundedReceiver<Notice>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(poll_directory(directory.to_path_buf(), interval, baseline, tx));
    (rx, task)
}

/// True when `event` means the watch on `directory` itself is gone.
fn watch_lost(event: &Event, directory: &Path) -> bool {
    let on_directory = event.paths.iter().any(|path| path == directory);
    on_directory
        && matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        )
}

/// Turns a notify event into signals for the journal files it touches.
pub(crate) fn signals_from_event(event: &Event) -> Vec<ChangeSignal> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| is_journal_file(path))
        .map(|path| ChangeSignal {
            path: path.clone(),
            kind,
        })
        .collect()
}

type Snapshot = BTreeMap<PathBuf, u64>;

/// Sizes of every journal in `directory`.
fn snapshot(directory: &Path) -> Result<Snapshot> {
    let mut sizes = Snapshot::new();
    for path in list_journals(directory)? {
        // A file removed between listing and stat is simply absent.
        if let Ok(metadata) = std::fs::metadata(&path) {
            sizes.insert(path, metadata.len());
        }
    }
    Ok(sizes)
}

/// Signals for files that appeared or changed size, in path order.
fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeSignal> {
    current
        .iter()
        .filter_map(|(path, size)| {
            let kind = match previous.get(path) {
                None => ChangeKind::Created,
                Some(old) if old != size => ChangeKind::Modified,
                Some(_) => return None,
            };
            Some(ChangeSignal {
                path: path.clone(),
                kind,
            })
        })
        .collect()
}

/// Without a `baseline` the first successful listing only becomes one.
async fn poll_directory(
    directory: PathBuf,
    period: Duration,
    baseline: Option<Snapshot>,
    tx: mpsc::UnboundedSender<Notice>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut previous = baseline;
    let mut failures = 0u32;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let current = match snapshot(&directory) {
            Ok(current) => {
                if failures > 0 {
                    tracing::info!(path = %directory.display(), failures, "journal directory readable again");
                    failures = 0;
                }
                current
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    tracing::warn!(path = %directory.display(), error = %e, "cannot list journal directory");
                } else {
                    tracing::debug!(path = %directory.display(), failures, error = %e, "journal directory still unreadable");
                }
                continue;
            }
        };

        if let Some(previous) = &previous {
            for signal in diff_snapshots(previous, &current) {
                if tx.send(Notice::Change(signal)).is_err() {
                    return;
                }
            }
        }
        previous = Some(current);
    }
}

/// Periodically logs the size of the currently selected journal.
///
/// Purely diagnostic: nothing it observes reaches the event pipeline.
pub(crate) fn spawn_heartbeat(
    current: watch::Receiver<Option<PathBuf>>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<(PathBuf, u64)> = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let path = current.borrow().clone();
                    let Some(path) = path else { continue };

                    let size = match tokio::fs::metadata(&path).await {
                        Ok(metadata) => metadata.len(),
                        Err(e) => {
                            tracing::debug!(path = %path.display(), error = %e, "heartbeat cannot stat journal");
                            continue;
                        }
                    };

                    if let Some(note) = heartbeat_note(last.as_ref(), &path, size) {
                        tracing::debug!(path = %path.display(), "{}", note);
                    }
                    last = Some((path, size));
                }
            }
        }
    })
}

fn heartbeat_note(last: Option<&(PathBuf, u64)>, path: &Path, size: u64) -> Option<String> {
    match last {
        Some((last_path, last_size)) if last_path == path => (size != *last_size).then(|| {
            format!(
                "file size check: {} ({:+})",
                size,
                size as i128 - *last_size as i128
            )
        }),
        _ => Some(format!("file size check: {}", size)),
    }
}
