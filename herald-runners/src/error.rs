//! Error types for runner behaviors.

use thiserror::Error;

use crate::nntp::client::NntpError;

/// Errors a behavior can raise while processing one item.
///
/// The runner reacts by classification, not by variant: transient
/// failures count against the item's retry budget, permanent ones send
/// it straight to the shunt queue.
#[derive(Debug, Error)]
pub enum BehaviorError {
    /// A failure expected to clear on its own (peer down, disk full).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The item references configuration that does not exist or is
    /// invalid. Retrying cannot help until an operator intervenes.
    #[error("Configuration error: {0}")]
    Config(String),

    /// News server conversation failed.
    #[error(transparent)]
    Nntp(#[from] NntpError),

    /// Persisting or reading runner state failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State file exists but cannot be decoded.
    #[error("State decode error: {0}")]
    Decode(String),

    /// Switchboard operation issued by the behavior failed.
    #[error(transparent)]
    Switchboard(#[from] herald_switchboard::SwitchboardError),
}

impl BehaviorError {
    /// Whether retrying the item later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Config(_) | Self::Decode(_) => false,
            Self::Transient(_) | Self::Nntp(_) | Self::Io(_) | Self::Switchboard(_) => true,
        }
    }
}

/// Specialized `Result` type for behavior operations.
pub type Result<T> = std::result::Result<T, BehaviorError>;
