use serde::{Deserialize, Serialize};

/// Identifier for a queued work item.
///
/// A ULID: 26 characters encoding creation time plus randomness, so
/// directory listings sort roughly first-in-first-out and collisions are
/// practically impossible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    #[serde(with = "ulid::serde::ulid_as_u128")]
    id: ulid::Ulid,
}

impl ItemKey {
    /// Parse a key from an item filename like `01ARYZ6S41....itm`.
    ///
    /// Rejects path separators, traversal patterns, and anything that is
    /// not a valid ULID, so a hostile filename never escapes the queue
    /// directory.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".itm")?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// Generate a fresh unique key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// The underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Milliseconds since the Unix epoch encoded in the key.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }

    /// Filename of the live item in its queue directory.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.itm", self.id)
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_filename_round_trip() {
        let key = ItemKey::generate();
        let parsed = ItemKey::from_filename(&key.filename());
        assert_eq!(parsed, Some(key));
    }

    #[test]
    fn test_item_key_filename_validation() {
        assert!(ItemKey::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.itm").is_some());

        // Security: traversal and separators
        assert!(ItemKey::from_filename("../etc/passwd.itm").is_none());
        assert!(ItemKey::from_filename("foo/bar.itm").is_none());
        assert!(ItemKey::from_filename("..\\windows.itm").is_none());

        // Format
        assert!(ItemKey::from_filename("not_a_ulid.itm").is_none());
        assert!(ItemKey::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.eml").is_none());
        assert!(ItemKey::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.itm.bak").is_none());
    }

    #[test]
    fn test_item_keys_are_unique() {
        let keys: Vec<ItemKey> = (0..100).map(|_| ItemKey::generate()).collect();
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }
}
