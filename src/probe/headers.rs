//! Response head parsing: reason-phrase capture and header accumulation.
//!
//! The executor feeds every raw head line it reads off the wire, status
//! lines included, through [`ResponseHead::absorb_line`] in delivery order.
//! Folded (multi-line) headers are not supported; a continuation line has
//! no colon and is dropped, so such a header keeps only its first line.

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::LazyLock;

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/\d\.\d \d{3} (\w+)").expect("status line pattern"));

/// Response header mapping.
///
/// Names keep their as-received casing and the last occurrence of a name
/// wins, but lookup is case-insensitive: `get("Content-Type")` and
/// `get("content-type")` hit the same entry regardless of what the server
/// sent. Serializes as a plain name→value map under as-received names.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    // lowercased name -> (as-received name, value)
    entries: HashMap<String, (String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `name → value`, replacing any earlier entry with the same
    /// name in any casing.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries.insert(
            name.to_ascii_lowercase(),
            (name.to_string(), value.to_string()),
        );
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(as-received name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Serialize for HeaderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Accumulates the head lines of one transfer.
///
/// Spans a whole redirect chain: the reason phrase is taken from the first
/// status line and never overwritten, while headers accumulate across hops
/// with last-write-wins.
#[derive(Debug, Default)]
pub struct ResponseHead {
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw head line, trailing CRLF and all.
    ///
    /// Status lines contribute the reason phrase; lines without a colon
    /// (blank separators, folded continuations) are dropped; everything
    /// else is split at the first colon and stored with both sides
    /// whitespace-trimmed.
    pub fn absorb_line(&mut self, line: &str) {
        if self.reason.is_none() {
            if let Some(captures) = STATUS_LINE.captures(line) {
                self.reason = Some(captures[1].to_string());
            }
        }

        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        self.headers.insert(name.trim(), value.trim());
    }
}
