//! Structured email messages.
//!
//! A [`Message`] is a tree: an ordered multi-map of headers (duplicates
//! allowed, order preserved) over a body that is either raw bytes or a
//! sequence of sub-messages for multipart content types. The tree survives
//! serialization byte-for-byte closely enough for news posting and digest
//! wrapping; parsing from wire bytes goes through `mailparse`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building a [`Message`] from raw bytes.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The underlying MIME parse failed.
    #[error("Message parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),
}

/// A single header line, name and unfolded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Message payload: raw bytes for leaf parts, sub-messages for multipart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    Raw(Vec<u8>),
    Multipart {
        boundary: String,
        parts: Vec<Message>,
    },
}

/// An email message or message part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    headers: Vec<Header>,
    body: Body,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Create an empty message with an empty raw body.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
            body: Body::Raw(Vec::new()),
        }
    }

    /// Parse a message tree from raw wire bytes.
    ///
    /// Leaf bodies keep their transfer encoding untouched; decoding is the
    /// caller's concern.
    ///
    /// # Errors
    /// If the bytes are not parseable as a MIME message.
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let parsed = mailparse::parse_mail(raw)?;
        Ok(Self::from_parsed(&parsed))
    }

    fn from_parsed(part: &mailparse::ParsedMail<'_>) -> Self {
        let headers = part
            .headers
            .iter()
            .map(|h| Header {
                name: h.get_key(),
                value: unfold(h.get_value_raw()),
            })
            .collect();

        let body = if part.subparts.is_empty() {
            Body::Raw(raw_body(part.raw_bytes))
        } else {
            let boundary = part
                .ctype
                .params
                .get("boundary")
                .cloned()
                .unwrap_or_default();
            Body::Multipart {
                boundary,
                parts: part.subparts.iter().map(Self::from_parsed).collect(),
            }
        };

        Self { headers, body }
    }

    /// First value of a header, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values of a header, in order of appearance.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Replace every occurrence of a header with a single value.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.append(name, value);
    }

    /// Append a header, preserving existing occurrences.
    pub fn append(&mut self, name: &str, value: &str) {
        self.headers.push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Remove every occurrence of a header; returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    /// Ordered view of all headers.
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart { .. })
    }

    /// Sub-parts of a multipart body, `None` for a leaf part.
    #[must_use]
    pub fn parts(&self) -> Option<&[Self]> {
        match &self.body {
            Body::Multipart { parts, .. } => Some(parts),
            Body::Raw(_) => None,
        }
    }

    /// Content type, lowercased, without parameters. Defaults to
    /// `text/plain` when the header is absent, mirroring RFC 2045.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.get("content-type").map_or_else(
            || "text/plain".to_string(),
            |v| {
                v.split(';')
                    .next()
                    .unwrap_or("text/plain")
                    .trim()
                    .to_ascii_lowercase()
            },
        )
    }

    /// A single `Content-Type` parameter value, unquoted.
    #[must_use]
    pub fn content_param(&self, param: &str) -> Option<String> {
        let value = self.get("content-type")?;
        for piece in value.split(';').skip(1) {
            let mut kv = piece.splitn(2, '=');
            let key = kv.next()?.trim();
            if key.eq_ignore_ascii_case(param) {
                let raw = kv.next().unwrap_or("").trim();
                return Some(raw.trim_matches('"').to_string());
            }
        }
        None
    }

    /// The `Content-Description` header, if present.
    #[must_use]
    pub fn content_description(&self) -> Option<&str> {
        self.get("content-description")
    }

    /// Every leaf (non-multipart) part of the tree, in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match &self.body {
            Body::Raw(_) => out.push(self),
            Body::Multipart { parts, .. } => {
                for part in parts {
                    part.collect_leaves(out);
                }
            }
        }
    }

    /// Serialize the body only (no headers).
    #[must_use]
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            Body::Raw(bytes) => bytes.clone(),
            Body::Multipart { boundary, parts } => {
                let mut out = Vec::new();
                for part in parts {
                    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
                    out.extend_from_slice(&part.to_bytes());
                    // The CRLF before a boundary belongs to the delimiter,
                    // not to the part; emitting it unconditionally keeps
                    // part bodies byte-exact across a reparse.
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
                out
            }
        }
    }

    /// Serialize the whole message to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body_bytes());
        out
    }

    /// Number of body lines, the value news servers expect in `Lines`.
    #[must_use]
    pub fn body_line_count(&self) -> usize {
        let body = self.body_bytes();
        if body.is_empty() {
            return 0;
        }
        let newlines = body.iter().filter(|b| **b == b'\n').count();
        if body.ends_with(b"\n") {
            newlines
        } else {
            newlines + 1
        }
    }
}

/// Unfold a raw header value: folded continuation lines collapse to a
/// single space, surrounding whitespace is trimmed.
fn unfold(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.lines().enumerate() {
        if i == 0 {
            out.push_str(line.trim_end());
        } else {
            out.push(' ');
            out.push_str(line.trim());
        }
    }
    out.trim().to_string()
}

/// Undecoded body bytes of a raw part (everything past the header block).
fn raw_body(raw: &[u8]) -> Vec<u8> {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        raw[pos + 4..].to_vec()
    } else if let Some(pos) = find(raw, b"\n\n") {
        raw[pos + 2..].to_vec()
    } else {
        Vec::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
