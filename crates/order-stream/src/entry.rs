use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::StreamError;

/// Identifier of an entry in the stream.
///
/// Entry ids are assigned by the stream on append and have the form
/// `<milliseconds>-<sequence>`. They are strictly increasing within a stream,
/// so ordering by id is ordering by append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    millis: u64,
    seq: u64,
}

impl EntryId {
    /// Creates an entry ID from its two components.
    pub fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// The smallest possible id, used as the "from the beginning" cursor.
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// The largest possible id.
    pub fn max() -> Self {
        Self::new(u64::MAX, u64::MAX)
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the id that follows this one within the same millisecond.
    pub fn next(&self) -> Self {
        Self::new(self.millis, self.seq + 1)
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StreamError::InvalidEntryId(s.to_string());
        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (s, "0"),
        };
        let millis = millis.parse().map_err(|_| invalid())?;
        let seq = seq.parse().map_err(|_| invalid())?;
        Ok(Self::new(millis, seq))
    }
}

/// A single entry read from the stream: an id plus its field/value payload.
///
/// Entries are immutable once appended and live until explicitly deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub fields: BTreeMap<String, String>,
}

impl StreamEntry {
    pub fn new(id: EntryId, fields: BTreeMap<String, String>) -> Self {
        Self { id, fields }
    }

    /// Returns the value of a payload field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// An entry that has been delivered to a consumer but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// The delivered entry.
    pub id: EntryId,

    /// Consumer that currently owns the entry.
    pub consumer: String,

    /// Time since the entry was last delivered or claimed.
    pub idle: Duration,

    /// Number of times the entry has been delivered, including claims.
    pub delivery_count: u64,
}

/// Inclusive id range used when scanning the pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRange {
    pub start: EntryId,
    pub end: EntryId,
}

impl EntryRange {
    /// The full id range, `-` to `+`.
    pub fn full() -> Self {
        Self {
            start: EntryId::zero(),
            end: EntryId::max(),
        }
    }

    /// Renders the range bounds the way Redis expects them.
    pub(crate) fn bounds(&self) -> (String, String) {
        let start = if self.start == EntryId::zero() {
            "-".to_string()
        } else {
            self.start.to_string()
        };
        let end = if self.end == EntryId::max() {
            "+".to_string()
        } else {
            self.end.to_string()
        };
        (start, end)
    }
}

impl Default for EntryRange {
    fn default() -> Self {
        Self::full()
    }
}
