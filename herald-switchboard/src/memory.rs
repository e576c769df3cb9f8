//! In-memory switchboard for tests and transient work.
//!
//! Implements the same [`Store`] contract as the file store, including
//! single-owner claim semantics, on a concurrent map. Not durable;
//! production queues use [`crate::FileStore`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use herald_common::{message::Message, metadata::Metadata};

use crate::{
    Result, SwitchboardError,
    item::{ItemRecord, WorkItem},
    store::Store,
    types::ItemKey,
};

#[derive(Debug, Clone)]
struct Slot {
    record: ItemRecord,
    claimed: bool,
}

/// Map-backed [`Store`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<DashMap<(String, ItemKey), Slot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently held in `queue`, claimed or not.
    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.key().0 == queue)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn enqueue(
        &self,
        queue: &str,
        message: Message,
        metadata: Metadata,
    ) -> Result<ItemKey> {
        let key = ItemKey::generate();
        self.slots.insert(
            (queue.to_string(), key.clone()),
            Slot {
                record: ItemRecord {
                    message,
                    metadata,
                    retry_count: 0,
                },
                claimed: false,
            },
        );
        Ok(key)
    }

    async fn list_keys(&self, queue: &str) -> Result<Vec<ItemKey>> {
        let mut keys: Vec<ItemKey> = self
            .slots
            .iter()
            .filter(|entry| entry.key().0 == queue && !entry.value().claimed)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn claim_and_read(&self, queue: &str, key: &ItemKey) -> Result<WorkItem> {
        let map_key = (queue.to_string(), key.clone());
        let Some(mut slot) = self.slots.get_mut(&map_key) else {
            return Err(SwitchboardError::NotFound(key.clone()));
        };
        if slot.claimed {
            return Err(SwitchboardError::AlreadyClaimed(key.clone()));
        }
        slot.claimed = true;
        Ok(WorkItem::from_record(
            key.clone(),
            queue,
            slot.record.clone(),
        ))
    }

    async fn delete(&self, queue: &str, key: &ItemKey) -> Result<()> {
        self.slots.remove(&(queue.to_string(), key.clone()));
        Ok(())
    }

    async fn requeue(&self, item: &WorkItem) -> Result<()> {
        self.slots.insert(
            (item.queue.clone(), item.key.clone()),
            Slot {
                record: item.to_record(),
                claimed: false,
            },
        );
        Ok(())
    }

    async fn shunt_raw(&self, queue: &str, key: &ItemKey) -> Result<()> {
        let Some((_, slot)) = self.slots.remove(&(queue.to_string(), key.clone())) else {
            return Err(SwitchboardError::NotFound(key.clone()));
        };
        self.slots.insert(
            (crate::queues::SHUNT.to_string(), key.clone()),
            Slot {
                record: slot.record,
                claimed: false,
            },
        );
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize> {
        let mut restored = 0;
        for mut entry in self.slots.iter_mut() {
            if entry.key().0 == queue && entry.value().claimed {
                entry.value_mut().claimed = false;
                restored += 1;
            }
        }
        Ok(restored)
    }
}
