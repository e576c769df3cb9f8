//! Processing metadata carried alongside a queued message.
//!
//! Metadata is a string-keyed map of simple values. The keys the system
//! itself reads and writes form a closed set, declared in [`keys`]; ad hoc
//! keys are tolerated on the way through but never interpreted.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// The metadata record attached to every queued work item.
pub type Metadata = AHashMap<String, Value>;

/// Simple metadata values: booleans, integers, strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// The closed set of metadata keys the runners interpret.
pub mod keys {
    /// Target mailing list's internal name.
    pub const LIST: &str = "list";
    /// Set once the news gateway has rewritten headers, so a requeued
    /// item is not prepared twice.
    pub const PREPARED: &str = "prepared";
    /// Operator-forced digest emission, regardless of threshold.
    pub const DIGEST_SEND: &str = "digest_send";
    /// Marks the two rendered digests emitted into the virgin queue.
    pub const IS_DIGEST: &str = "is_digest";
}

/// True when `key` is present and set to `Bool(true)`.
#[must_use]
pub fn flag(metadata: &Metadata, key: &str) -> bool {
    metadata
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Bool(true).as_str(), None);
    }

    #[test]
    fn test_flag_helper() {
        let mut md = Metadata::default();
        assert!(!flag(&md, keys::PREPARED));
        md.insert(keys::PREPARED.to_string(), Value::Bool(true));
        assert!(flag(&md, keys::PREPARED));
        md.insert(keys::PREPARED.to_string(), Value::Int(1));
        assert!(!flag(&md, keys::PREPARED));
    }
}
