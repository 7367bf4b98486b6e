//! Reduced replay of a journal that already has history when first attached.

use crate::entry::{EntryParser, Event};
use std::collections::{HashMap, HashSet};

/// Keeps only the most recent event of each state-defining kind.
#[derive(Debug, Clone, Default)]
pub struct BootstrapScanner {
    state_kinds: HashSet<String>,
}

impl BootstrapScanner {
    pub fn new<I, S>(state_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state_kinds: state_kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_state_kind(&self, kind: &str) -> bool {
        self.state_kinds.contains(kind)
    }

    /// Scans `lines` and returns the latest event per state kind, oldest first.
    ///
    /// Lines that fail to parse are logged and skipped. Among same-kind events
    /// with equal timestamps the one later in the file wins.
    pub fn scan<'a, I>(&self, parser: &EntryParser, lines: I) -> Vec<Event>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut latest: HashMap<String, (usize, Event)> = HashMap::new();
        let mut skipped = 0usize;

        for (position, line) in lines.into_iter().enumerate() {
            let event = match parser.parse(line) {
                Ok(event) => event,
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(position, error = %e, "skipping unparsable line during bootstrap");
                    continue;
                }
            };

            if !self.is_state_kind(event.kind()) {
                continue;
            }

            let replace = match latest.get(event.kind()) {
                Some((_, kept)) => event.timestamp() >= kept.timestamp(),
                None => true,
            };
            if replace {
                latest.insert(event.kind().to_string(), (position, event));
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "bootstrap skipped unparsable lines");
        }

        let mut retained: Vec<(usize, Event)> = latest.into_values().collect();
        retained.sort_by(|(pos_a, a), (pos_b, b)| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| pos_a.cmp(pos_b))
        });
        retained.into_iter().map(|(_, event)| event).collect()
    }
}
