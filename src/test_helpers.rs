//! Test utilities for building temporary journal directories.

#[cfg(test)]
use std::fs::{File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};

#[cfg(test)]
pub struct TempJournalDir {
    _temp_dir: tempfile::TempDir,
    path: PathBuf,
}

#[cfg(test)]
impl TempJournalDir {
    /// Create an empty temporary journal directory, under its canonical path
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().canonicalize()?;
        Ok(Self {
            _temp_dir: temp_dir,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a journal file holding `lines`, each terminated by `\n`
    pub fn create_journal(&self, name: &str, lines: &[&str]) -> std::io::Result<PathBuf> {
        let path = self.path.join(name);
        let mut file = File::create(&path)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(path)
    }

    /// Append one terminated line, the way the game writes a record
    pub fn append_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        self.append_raw(path, &format!("{}\n", line))
    }

    /// Append bytes verbatim, e.g. half of a record
    pub fn append_raw(&self, path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place
    pub fn truncate(&self, path: &Path) -> std::io::Result<()> {
        File::create(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_journal_dir_creation() {
        let dir = TempJournalDir::new().unwrap();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_create_journal_with_lines() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir
            .create_journal("Journal.2024-01-01T000000.01.log", &["one", "two"])
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_append_and_truncate() {
        let dir = TempJournalDir::new().unwrap();
        let path = dir.create_journal("Journal.2024-01-01T000000.01.log", &[]).unwrap();

        dir.append_line(&path, "line 1").unwrap();
        dir.append_raw(&path, "partial").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line 1\npartial");

        dir.truncate(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().is_empty());
    }
}
