//! Journal events and the line parser that produces them.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// One journal record.
///
/// The full JSON object is kept; `kind` and `timestamp` are read out of it
/// once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: String,
    timestamp: Option<String>,
    fields: Map<String, Value>,
}

impl Event {
    /// The event type, e.g. `"FSDJump"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The record timestamp as written by the game, if present.
    ///
    /// Journal timestamps are ISO-8601 UTC strings, so string order is
    /// chronological order.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Turns journal lines into [`Event`]s.
#[derive(Debug, Clone)]
pub struct EntryParser {
    kind_field: String,
    timestamp_field: String,
}

impl Default for EntryParser {
    fn default() -> Self {
        Self::new("event", "timestamp")
    }
}

impl EntryParser {
    pub fn new(kind_field: impl Into<String>, timestamp_field: impl Into<String>) -> Self {
        Self {
            kind_field: kind_field.into(),
            timestamp_field: timestamp_field.into(),
        }
    }

    /// Parses one line.
    ///
    /// Fails with [`Error::MalformedRecord`] when the line is not UTF-8, not a
    /// JSON object, or has no string kind field.
    pub fn parse(&self, line: &[u8]) -> Result<Event> {
        let value: Value = serde_json::from_slice(line).map_err(|e| malformed(line, e))?;

        let Value::Object(fields) = value else {
            return Err(malformed(line, "not a JSON object"));
        };

        let kind = match fields.get(&self.kind_field) {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(malformed(line, format!("`{}` is not a string", self.kind_field))),
            None => return Err(malformed(line, format!("missing `{}`", self.kind_field))),
        };

        let timestamp = fields
            .get(&self.timestamp_field)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Event {
            kind,
            timestamp,
            fields,
        })
    }

    /// Parses a whole delta as one unit.
    ///
    /// The first malformed line fails the batch, so the caller can leave its
    /// offset untouched and retry the same bytes later.
    pub fn parse_batch<'a, I>(&self, lines: I) -> Result<Vec<Event>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        lines.into_iter().map(|line| self.parse(line)).collect()
    }
}

fn malformed(line: &[u8], reason: impl ToString) -> Error {
    Error::MalformedRecord {
        line: String::from_utf8_lossy(line).into_owned(),
        reason: reason.to_string(),
    }
}
