//! Splitting of raw journal bytes into complete lines.

/// Complete lines decoded from one delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLines<'a> {
    lines: Vec<&'a [u8]>,
    consumed: usize,
}

impl<'a> DecodedLines<'a> {
    /// Non-blank complete lines, terminators stripped, in file order.
    pub fn lines(&self) -> &[&'a [u8]] {
        &self.lines
    }

    /// Bytes up to and including the last line terminator.
    ///
    /// Anything after this offset is an unterminated fragment that belongs to
    /// a write still in progress.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Splits `buffer` on `\n` (dropping a preceding `\r`) and keeps only the
/// complete, non-blank lines.
pub fn decode_lines(buffer: &[u8]) -> DecodedLines<'_> {
    let consumed = buffer
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);

    let lines = buffer[..consumed]
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .collect();

    DecodedLines { lines, consumed }
}
