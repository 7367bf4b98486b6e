//! Byte-accurate tailing of the current journal file.

use crate::bootstrap::BootstrapScanner;
use crate::decoder::decode_lines;
use crate::entry::{EntryParser, Event};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read position within one journal file.
///
/// `offset` trails `size` while an unterminated line is pending, so shrinking
/// is detected against the last observed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalCursor {
    path: PathBuf,
    offset: u64,
    size: u64,
}

impl JournalCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            size: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of the file already turned into events.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size seen by the last read.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True until the first complete line has been consumed.
    pub fn is_fresh(&self) -> bool {
        self.offset == 0
    }
}

/// Bytes appended to a journal since the cursor was last advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    start: u64,
    bytes: Vec<u8>,
}

impl Delta {
    /// File offset of the first byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A delta covering the file from its first byte goes through the
    /// bootstrap scan instead of a full replay.
    pub fn is_bootstrap(&self) -> bool {
        self.start == 0
    }
}

/// Tracks the current journal and turns its growth into events.
#[derive(Debug, Default)]
pub struct TailReader {
    cursor: Option<JournalCursor>,
    parser: EntryParser,
    scanner: BootstrapScanner,
}

impl TailReader {
    pub fn new(parser: EntryParser, scanner: BootstrapScanner) -> Self {
        Self {
            cursor: None,
            parser,
            scanner,
        }
    }

    pub fn cursor(&self) -> Option<&JournalCursor> {
        self.cursor.as_ref()
    }

    /// Starts tracking `path` from offset zero, replacing any previous cursor.
    pub fn attach(&mut self, path: &Path) {
        if let Some(previous) = &self.cursor {
            tracing::info!(
                from = %previous.path.display(),
                to = %path.display(),
                abandoned_offset = previous.offset,
                "switching journal"
            );
        } else {
            tracing::info!(path = %path.display(), "attaching to journal");
        }
        self.cursor = Some(JournalCursor::new(path));
    }

    /// Reads the bytes appended to `path` since the last advance.
    ///
    /// A different `path` than the tracked one is attached first. A file
    /// smaller than at the previous read is treated as freshly attached, even
    /// when it is still larger than the consumed offset. Returns `None` when there is
    /// nothing new or the file is gone. The cursor is not moved; call
    /// [`advance`](Self::advance) once the delta has been handled.
    pub async fn read_delta(&mut self, path: &Path) -> Result<Option<Delta>> {
        if self.cursor.as_ref().map(JournalCursor::path) != Some(path) {
            self.attach(path);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let current_size = file.metadata().await?.len();

        if detect_file_truncation(current_size, cursor.size) {
            tracing::info!(
                path = %path.display(),
                previous = cursor.size,
                current = current_size,
                abandoned_offset = cursor.offset,
                "journal truncated, re-reading from the start"
            );
            cursor.offset = 0;
        }
        cursor.size = current_size;

        let bytes_to_read = match calculate_bytes_to_read(current_size, cursor.offset) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        file.seek(std::io::SeekFrom::Start(cursor.offset)).await?;

        let mut bytes = Vec::with_capacity(bytes_to_read as usize);
        file.take(bytes_to_read).read_to_end(&mut bytes).await?;

        tracing::debug!(
            path = %path.display(),
            from = cursor.offset,
            to = current_size,
            "journal grew"
        );

        Ok(Some(Delta {
            start: cursor.offset,
            bytes,
        }))
    }

    /// Moves the cursor past `consumed` bytes of `delta`.
    pub fn advance(&mut self, delta: &Delta, consumed: usize) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.offset = delta.start + consumed as u64;
        }
    }

    /// Reads, decodes and parses everything appended to `path`.
    ///
    /// The first delta of a fresh file is reduced by the bootstrap scan, which
    /// skips bad lines. Later deltas are parsed as one unit: a malformed line
    /// fails the call and leaves the cursor where it was, so the same bytes
    /// are retried on the next call. An unterminated last line is never
    /// consumed.
    pub async fn process(&mut self, path: &Path) -> Result<Vec<Event>> {
        let Some(delta) = self.read_delta(path).await? else {
            return Ok(Vec::new());
        };

        let decoded = decode_lines(delta.bytes());
        let lines = decoded.lines().iter().copied();

        let events = if delta.is_bootstrap() {
            let events = self.scanner.scan(&self.parser, lines);
            tracing::debug!(
                path = %path.display(),
                lines = decoded.len(),
                events = events.len(),
                "bootstrapped journal"
            );
            events
        } else {
            self.parser.parse_batch(lines)?
        };

        self.advance(&delta, decoded.consumed());
        Ok(events)
    }
}

/// Detect if the file was truncated by comparing current size with the last observed size
fn detect_file_truncation(current_size: u64, last_size: u64) -> bool {
    current_size < last_size
}

/// Calculate bytes to read based on current size and last position
fn calculate_bytes_to_read(current_size: u64, last_position: u64) -> Option<u64> {
    if current_size <= last_position {
        None
    } else {
        Some(current_size - last_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STATE_KINDS;
    use crate::error::Error;
    use crate::test_helpers::TempJournalDir;

    const DOCKED: &str = r#"{"timestamp":"2024-01-02T00:01:00Z","event":"Docked","StationName":"Jameson Memorial"}"#;
    const MUSIC: &str = r#"{"timestamp":"2024-01-02T00:01:05Z","event":"Music","MusicTrack":"Starport"}"#;
    const UNDOCKED: &str = r#"{"timestamp":"2024-01-02T00:02:00Z","event":"Undocked"}"#;

    fn reader() -> TailReader {
        TailReader::new(EntryParser::default(), BootstrapScanner::new(DEFAULT_STATE_KINDS))
    }

    fn kinds(events: &[Event]) -> Vec<&str> {
        events.iter().map(Event::kind).collect()
    }

    #[test]
    fn test_detect_file_truncation() {
        assert!(detect_file_truncation(100, 200));
        assert!(!detect_file_truncation(200, 100));
        assert!(!detect_file_truncation(100, 100));
        assert!(!detect_file_truncation(0, 0));
        assert!(detect_file_truncation(0, 1));
    }

    #[test]
    fn test_calculate_bytes_to_read() {
        assert_eq!(calculate_bytes_to_read(200, 100), Some(100));
        assert_eq!(calculate_bytes_to_read(100, 100), None);
        assert_eq!(calculate_bytes_to_read(50, 100), None);
        assert_eq!(calculate_bytes_to_read(0, 0), None);
        assert_eq!(calculate_bytes_to_read(1, 0), Some(1));
        assert_eq!(calculate_bytes_to_read(u64::MAX, u64::MAX - 1), Some(1));
    }

    #[test]
    fn test_cursor_starts_fresh() {
        let cursor = JournalCursor::new("/journals/Journal.2024-01-02T000000.01.log");
        assert!(cursor.is_fresh());
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.size(), 0);
    }

    #[tokio::test]
    async fn test_read_delta_returns_whole_file_on_attach() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();

        let delta = reader.read_delta(&path).await.unwrap().unwrap();

        assert!(delta.is_bootstrap());
        assert_eq!(delta.start(), 0);
        assert_eq!(delta.len() as u64, std::fs::metadata(&path).unwrap().len());
        assert_eq!(reader.cursor().unwrap().path(), path.as_path());
        assert!(reader.cursor().unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_read_delta_without_advance_repeats() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();

        let first = reader.read_delta(&path).await.unwrap().unwrap();
        let second = reader.read_delta(&path).await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_read_delta_only_returns_appended_bytes() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();

        let first = reader.read_delta(&path).await.unwrap().unwrap();
        reader.advance(&first, first.len());
        dir.append_line(&path, UNDOCKED).unwrap();

        let second = reader.read_delta(&path).await.unwrap().unwrap();

        assert!(!second.is_bootstrap());
        assert_eq!(second.start(), first.len() as u64);
        assert_eq!(second.bytes(), format!("{}\n", UNDOCKED).as_bytes());
    }

    #[tokio::test]
    async fn test_read_delta_nothing_new() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();

        let delta = reader.read_delta(&path).await.unwrap().unwrap();
        reader.advance(&delta, delta.len());

        assert_eq!(reader.read_delta(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_delta_missing_file() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.path().join("Journal.2024-01-02T000000.01.log");
        let mut reader = reader();

        assert_eq!(reader.read_delta(&path).await.unwrap(), None);
        assert_eq!(reader.cursor().unwrap().offset(), 0);
    }

    #[tokio::test]
    async fn test_read_delta_empty_file() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[]).unwrap();
        let mut reader = reader();

        assert_eq!(reader.read_delta(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_process_bootstraps_then_tails() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir
            .create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED, MUSIC])
            .unwrap();
        let mut reader = reader();

        let bootstrap = reader.process(&path).await.unwrap();
        assert_eq!(kinds(&bootstrap), vec!["Docked"]);

        dir.append_line(&path, MUSIC).unwrap();
        dir.append_line(&path, UNDOCKED).unwrap();

        let events = reader.process(&path).await.unwrap();
        assert_eq!(kinds(&events), vec!["Music", "Undocked"]);
        assert_eq!(
            reader.cursor().unwrap().offset(),
            std::fs::metadata(&path).unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_process_holds_back_partial_line() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();
        reader.process(&path).await.unwrap();

        dir.append_raw(&path, "{\"event\":\"A\"}\n{\"event\":\"B\"").unwrap();
        let events = reader.process(&path).await.unwrap();
        assert_eq!(kinds(&events), vec!["A"]);

        dir.append_raw(&path, "}\n").unwrap();
        let events = reader.process(&path).await.unwrap();
        assert_eq!(kinds(&events), vec!["B"]);
    }

    #[tokio::test]
    async fn test_process_malformed_batch_is_retried() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();
        reader.process(&path).await.unwrap();
        let offset = reader.cursor().unwrap().offset();

        dir.append_line(&path, MUSIC).unwrap();
        dir.append_line(&path, "{\"event\":").unwrap();

        let result = reader.process(&path).await;
        assert!(matches!(result, Err(Error::MalformedRecord { .. })));
        assert_eq!(reader.cursor().unwrap().offset(), offset);

        // Same bytes fail again; nothing was skipped.
        assert!(reader.process(&path).await.is_err());
        assert_eq!(reader.cursor().unwrap().offset(), offset);
    }

    #[tokio::test]
    async fn test_process_truncation_rebootstraps() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir
            .create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED, MUSIC, MUSIC])
            .unwrap();
        let mut reader = reader();
        reader.process(&path).await.unwrap();

        dir.truncate(&path).unwrap();
        dir.append_line(&path, MUSIC).unwrap();
        dir.append_line(&path, UNDOCKED).unwrap();

        let events = reader.process(&path).await.unwrap();

        assert_eq!(kinds(&events), vec!["Undocked"]);
        assert_eq!(
            reader.cursor().unwrap().offset(),
            std::fs::metadata(&path).unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_process_shrink_below_pending_fragment_rebootstraps() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();
        reader.process(&path).await.unwrap();

        // Half a record keeps the offset behind the size.
        dir.append_raw(&path, &MUSIC[..40]).unwrap();
        assert!(reader.process(&path).await.unwrap().is_empty());
        let cursor = reader.cursor().unwrap().clone();
        assert!(cursor.size() > cursor.offset());

        // Replaced by content shorter than before but longer than the offset.
        let replacement = format!(
            r#"{{"timestamp":"2024-01-02T00:02:00Z","event":"Undocked","StationName":"{}"}}"#,
            "J".repeat(30)
        );
        std::fs::write(&path, format!("{}\n", replacement)).unwrap();
        let new_size = std::fs::metadata(&path).unwrap().len();
        assert!(new_size > cursor.offset() && new_size < cursor.size());

        let events = reader.process(&path).await.unwrap();

        assert_eq!(kinds(&events), vec!["Undocked"]);
        assert_eq!(reader.cursor().unwrap().offset(), new_size);
        assert_eq!(reader.cursor().unwrap().size(), new_size);
    }

    #[tokio::test]
    async fn test_process_new_path_attaches_fresh() {
        let dir = TempJournalDir::new().unwrap();
        let old = dir
            .create_journal("Journal.2024-01-01T000000.01.log", &[DOCKED, MUSIC, UNDOCKED])
            .unwrap();
        let new = dir.create_journal("Journal.2024-01-02T000000.01.log", &[MUSIC, DOCKED]).unwrap();
        let mut reader = reader();
        reader.process(&old).await.unwrap();
        assert!(reader.cursor().unwrap().offset() > 0);

        let events = reader.process(&new).await.unwrap();

        assert_eq!(kinds(&events), vec!["Docked"]);
        assert_eq!(reader.cursor().unwrap().path(), new.as_path());
        assert_eq!(
            reader.cursor().unwrap().offset(),
            std::fs::metadata(&new).unwrap().len()
        );
    }

    #[tokio::test]
    async fn test_no_byte_delivered_twice() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-02T000000.01.log", &[DOCKED]).unwrap();
        let mut reader = reader();

        let bootstrap = reader.read_delta(&path).await.unwrap().unwrap();
        reader.advance(&bootstrap, bootstrap.len());

        let mut delivered = 0usize;
        for i in 0..20 {
            dir.append_line(&path, &format!(r#"{{"event":"Tick","n":{}}}"#, i))
                .unwrap();
            let delta = reader.read_delta(&path).await.unwrap().unwrap();
            delivered += delta.len();
            reader.advance(&delta, decode_lines(delta.bytes()).consumed());
        }

        let file_size = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(delivered, file_size - bootstrap.len());
    }

    #[tokio::test]
    async fn test_fixture_bootstrap() {
        let mut reader = reader();
        let events = reader
            .process(Path::new("fixtures/Journal.2024-01-02T000000.01.log"))
            .await
            .unwrap();

        let kinds = kinds(&events);
        assert_eq!(kinds, vec!["Undocked", "StartJump", "FSDJump", "Docked"]);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp() <= pair[1].timestamp());
        }
    }
}
