//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! Flat object text codec.
//!
//! Payloads are single-level objects of string keys and string values written
//! in a JSON-like form: `{"type":"SENSOR_DATA","value":"22.5"}`. Decoding is
//! permissive: anything that is not wrapped in braces decodes to an empty
//! object, entries without a top-level colon are dropped, and unquoted values
//! (bare numbers, booleans) are kept as their literal text.

use std::fmt;

use indexmap::IndexMap;

/// Ordered string-to-string mapping carried in every frame payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatObject {
    entries: IndexMap<String, String>,
}

impl FlatObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert `value` only when present.
    pub fn insert_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Owned copy of a value, the shape message fields use.
    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the object holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for FlatObject
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut object = FlatObject::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}

impl fmt::Display for FlatObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Decode payload text into a flat object. Never fails.
pub fn decode(text: &str) -> FlatObject {
    entries(text).collect()
}

/// Encode an object as text, quoting every key and value.
pub fn encode(object: &FlatObject) -> String {
    let mut out = String::with_capacity(2 + object.len() * 16);
    out.push('{');
    for (idx, (key, value)) in object.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        push_quoted(&mut out, key);
        out.push(':');
        push_quoted(&mut out, value);
    }
    out.push('}');
    out
}

/// Top-level `(key, value)` pairs in source order, duplicates included.
pub(crate) fn entries(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    raw_entries(text).map(|(key, value)| (unquote(key), unquote(value)))
}

/// Like [`entries`] but leaves both sides undecoded.
pub(crate) fn raw_entries(text: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    let body = body(text).unwrap_or("");
    split_top_level(body, ',').into_iter().filter_map(|entry| {
        let colon = find_top_level(entry, ':')?;
        Some((&entry[..colon], &entry[colon + 1..]))
    })
}

fn body(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('{') && trimmed.ends_with('}') {
        Some(&trimmed[1..trimmed.len() - 1])
    } else {
        None
    }
}

/// Walks `text` tracking whether the cursor sits inside a quoted span.
struct QuoteScanner {
    in_quotes: bool,
    escaped: bool,
}

impl QuoteScanner {
    fn new() -> Self {
        Self {
            in_quotes: false,
            escaped: false,
        }
    }

    /// Feed one character; returns true when it is outside any quoted span.
    fn top_level(&mut self, ch: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match ch {
            '\\' if self.in_quotes => {
                self.escaped = true;
                false
            }
            '"' => {
                self.in_quotes = !self.in_quotes;
                false
            }
            _ => !self.in_quotes,
        }
    }
}

fn split_top_level(text: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut scanner = QuoteScanner::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if scanner.top_level(ch) && ch == delim {
            parts.push(&text[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn find_top_level(text: &str, delim: char) -> Option<usize> {
    let mut scanner = QuoteScanner::new();
    text.char_indices()
        .find(|&(_, ch)| scanner.top_level(ch) && ch == delim)
        .map(|(idx, _)| idx)
}

pub(crate) fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        unescape(&trimmed[1..trimmed.len() - 1])
    } else {
        trimmed.to_owned()
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            other => out.push(other),
        }
    }
    out.push('"');
}
