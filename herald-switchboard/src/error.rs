//! Error types for switchboard operations.

use std::io;

use thiserror::Error;

use crate::types::ItemKey;

/// Top-level switchboard error type.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bincode encoding failed.
    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Item not present in the queue, or lost to a concurrent claim.
    #[error("Item not found: {0}")]
    NotFound(ItemKey),

    /// Item is currently claimed by another owner.
    #[error("Item already claimed: {0}")]
    AlreadyClaimed(ItemKey),

    /// Persisted item exists but its content cannot be decoded. Such
    /// items are shunted individually rather than aborting the scan.
    #[error("Malformed item {key}: {reason}")]
    Malformed { key: ItemKey, reason: String },

    /// Queue root or queue name failed validation.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SwitchboardError {
    /// True when the error means "somebody else owns this item now",
    /// which a scanning runner skips without noise.
    #[must_use]
    pub const fn is_claim_race(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyClaimed(_))
    }
}

/// Specialized `Result` type for switchboard operations.
pub type Result<T> = std::result::Result<T, SwitchboardError>;
