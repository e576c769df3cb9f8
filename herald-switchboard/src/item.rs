use herald_common::{message::Message, metadata::Metadata};
use serde::{Deserialize, Serialize};

use crate::types::ItemKey;

/// One claimed unit of queued work: the message, its processing
/// metadata, and the retry count the runner maintains.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Unique key; doubles as the on-disk filename stem.
    pub key: ItemKey,
    /// The logical queue the item was claimed from.
    pub queue: String,
    /// The email message itself.
    pub message: Message,
    /// Processing state carried between requeues.
    pub metadata: Metadata,
    /// Times the item has been requeued after a failure.
    pub retry_count: u32,
}

/// What actually goes on disk: message and metadata in one record, so a
/// reader can never observe one without the other. Key and queue are
/// derivable from the file's location and are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    pub message: Message,
    pub metadata: Metadata,
    pub retry_count: u32,
}

impl WorkItem {
    pub(crate) fn from_record(key: ItemKey, queue: &str, record: ItemRecord) -> Self {
        Self {
            key,
            queue: queue.to_string(),
            message: record.message,
            metadata: record.metadata,
            retry_count: record.retry_count,
        }
    }

    pub(crate) fn to_record(&self) -> ItemRecord {
        ItemRecord {
            message: self.message.clone(),
            metadata: self.metadata.clone(),
            retry_count: self.retry_count,
        }
    }
}
