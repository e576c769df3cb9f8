//! The switchboard: a durable, directory-backed work queue.
//!
//! Every pending piece of work is one file in one queue directory. Writes
//! go through a temp file and an atomic rename, claiming an item is an
//! atomic rename to a marker name, and deletion is terminal. Multiple
//! runner processes drain one queue without shared locks by partitioning
//! the keyspace with [`slice::slice_of`].

pub mod error;
pub mod file;
pub mod item;
pub mod memory;
pub mod slice;
pub mod store;
pub mod types;

pub use error::{Result, SwitchboardError};
pub use file::FileStore;
pub use item::WorkItem;
pub use memory::MemoryStore;
pub use store::Store;
pub use types::ItemKey;

/// Well-known queue names.
pub mod queues {
    /// Messages awaiting news-gateway posting.
    pub const NEWS: &str = "news";
    /// Posts awaiting digest accumulation.
    pub const DIGEST: &str = "digest";
    /// MTA bounce notices awaiting recognition.
    pub const BOUNCE: &str = "bounce";
    /// Fully rendered messages ready for outbound delivery.
    pub const VIRGIN: &str = "virgin";
    /// Quarantine for items that exhausted their retry budget or failed
    /// to parse; drained only by operator action.
    pub const SHUNT: &str = "shunt";
}
