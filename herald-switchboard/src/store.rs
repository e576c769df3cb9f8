use async_trait::async_trait;
use herald_common::{message::Message, metadata::Metadata};

use crate::{Result, item::WorkItem, types::ItemKey};

/// The switchboard contract.
///
/// Claiming is the only synchronization primitive: an item has exactly
/// one owner at a time, and a losing concurrent claim fails cleanly with
/// a claim-race error rather than handing the item out twice.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Persist a new item atomically and return its key. No reader ever
    /// observes a partially written item.
    async fn enqueue(&self, queue: &str, message: Message, metadata: Metadata)
    -> Result<ItemKey>;

    /// Snapshot of the currently enqueued keys, roughly oldest first.
    /// May race with concurrent enqueues and claims; callers re-derive
    /// membership on every pass.
    async fn list_keys(&self, queue: &str) -> Result<Vec<ItemKey>>;

    /// Atomically take ownership of an item and read it. A second
    /// concurrent claim on the same key fails with a claim-race error.
    async fn claim_and_read(&self, queue: &str, key: &ItemKey) -> Result<WorkItem>;

    /// Remove an item permanently. Idempotent: deleting a missing key is
    /// not an error.
    async fn delete(&self, queue: &str, key: &ItemKey) -> Result<()>;

    /// Re-publish a claimed item with its updated metadata and retry
    /// count. A single atomic overwrite, never delete-then-create, so a
    /// crash in between cannot lose the item.
    async fn requeue(&self, item: &WorkItem) -> Result<()>;

    /// Move an item into the shunt queue without interpreting its
    /// content. Used for exhausted retries and unparseable items alike.
    async fn shunt_raw(&self, queue: &str, key: &ItemKey) -> Result<()>;

    /// Startup pass: release claims orphaned by a crash so every
    /// claimed-but-uncommitted item becomes claimable again. Returns how
    /// many items were restored.
    async fn recover(&self, queue: &str) -> Result<usize>;
}
