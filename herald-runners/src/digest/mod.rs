//! The digest batcher.
//!
//! Posts flow in one at a time; the batcher appends each to a per-list
//! accumulator persisted on disk, and once the accumulated volume
//! crosses the list's threshold (or a forced-send flag arrives) it
//! renders the batch as two digests into the virgin queue and starts the
//! next issue. The accumulator file is written with a temp file and an
//! atomic rename, the same discipline the switchboard uses, so a restart
//! never loses or corrupts a half-collected digest.

mod render;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use herald_common::{
    internal,
    list::{ListConfig, ListRegistry},
    metadata::{Metadata, Value, flag, keys},
};
use herald_switchboard::{Store, WorkItem, queues};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    error::{BehaviorError, Result},
    runner::{Behavior, Disposition},
};

/// Collected-but-unsent digest state for one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Accumulator {
    volume: u64,
    issue: u64,
    /// Raw bytes of each accumulated post, in arrival order.
    pending: Vec<Vec<u8>>,
    pending_bytes: u64,
}

impl Accumulator {
    fn fresh(config: &ListConfig) -> Self {
        Self {
            volume: config.digest_volume,
            issue: 1,
            pending: Vec::new(),
            pending_bytes: 0,
        }
    }
}

/// [`Behavior`] that batches list posts into periodic digests.
#[derive(Debug)]
pub struct DigestBatcher {
    state_dir: PathBuf,
    registry: Arc<ListRegistry>,
    store: Arc<dyn Store>,
}

impl DigestBatcher {
    /// # Errors
    /// If the state directory cannot be created.
    pub fn new(
        state_dir: impl Into<PathBuf>,
        registry: Arc<ListRegistry>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        Ok(Self {
            state_dir,
            registry,
            store,
        })
    }

    fn state_path(&self, list: &str) -> PathBuf {
        self.state_dir.join(format!("{list}.digest"))
    }

    async fn load(&self, config: &ListConfig) -> Result<Accumulator> {
        let path = self.state_path(&config.name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Accumulator::fresh(config));
            }
            Err(err) => return Err(err.into()),
        };

        match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
            Ok((accumulator, _)) => Ok(accumulator),
            Err(err) => {
                // Set the unreadable state aside for the operator and
                // start the next issue from nothing rather than wedging
                // the whole digest queue.
                internal!(
                    level = ERROR,
                    "Digest state for {} is unreadable ({err}), starting over",
                    config.name
                );
                let quarantined = path.with_extension("digest.corrupt");
                fs::rename(&path, &quarantined).await?;
                Ok(Accumulator::fresh(config))
            }
        }
    }

    async fn persist(&self, list: &str, accumulator: &Accumulator) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(accumulator, bincode::config::standard())
            .map_err(|err| BehaviorError::Decode(err.to_string()))?;

        let path = self.state_path(list);
        let tmp = self.state_dir.join(format!(".tmp_{list}.digest"));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }

    /// Render the batch and hand both digests to the outbound queue.
    async fn emit(&self, config: &ListConfig, accumulator: &Accumulator) -> Result<()> {
        let (mime, flat) = render::render(
            config,
            accumulator.volume,
            accumulator.issue,
            &accumulator.pending,
        );

        let mut metadata = Metadata::default();
        metadata.insert(keys::LIST.to_string(), Value::from(config.name.as_str()));
        metadata.insert(keys::IS_DIGEST.to_string(), Value::Bool(true));

        self.store
            .enqueue(queues::VIRGIN, mime, metadata.clone())
            .await?;
        self.store.enqueue(queues::VIRGIN, flat, metadata).await?;

        internal!(
            level = INFO,
            "Emitted {} digest volume {} issue {} ({} messages, {} bytes)",
            config.name,
            accumulator.volume,
            accumulator.issue,
            accumulator.pending.len(),
            accumulator.pending_bytes
        );

        Ok(())
    }
}

#[async_trait]
impl Behavior for DigestBatcher {
    fn name(&self) -> &'static str {
        "digest-batcher"
    }

    async fn process(&self, item: &mut WorkItem) -> Result<Disposition> {
        let list_name = item
            .metadata
            .get(keys::LIST)
            .and_then(Value::as_str)
            .ok_or_else(|| BehaviorError::Config("Item carries no list name".to_string()))?
            .to_string();

        let config = self
            .registry
            .get(&list_name)
            .ok_or_else(|| BehaviorError::Config(format!("Unknown list: {list_name}")))?;

        let mut accumulator = self.load(&config).await?;

        let raw = item.message.to_bytes();
        accumulator.pending_bytes += raw.len() as u64;
        accumulator.pending.push(raw);

        // The threshold is in kilobytes; zero means a digest per post.
        let threshold_bytes = config.digest_threshold_kb * 1024;
        let forced = flag(&item.metadata, keys::DIGEST_SEND);

        if forced || accumulator.pending_bytes >= threshold_bytes {
            self.emit(&config, &accumulator).await?;
            accumulator.pending.clear();
            accumulator.pending_bytes = 0;
            accumulator.issue += 1;
        }

        self.persist(&list_name, &accumulator).await?;

        Ok(Disposition::Done)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_common::message::Message;
    use herald_switchboard::{ItemKey, MemoryStore};
    use tempfile::TempDir;

    use super::*;

    fn list_with_threshold(kb: u64) -> ListConfig {
        let mut config = ListConfig::new("ant", "example.com");
        config.display_name = "Ant".to_string();
        config.digest_threshold_kb = kb;
        config
    }

    fn batcher(config: ListConfig) -> (TempDir, Arc<MemoryStore>, DigestBatcher) {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ListRegistry::new());
        registry.insert(config).unwrap();
        let store = Arc::new(MemoryStore::new());
        let batcher = DigestBatcher::new(
            dir.path(),
            registry,
            Arc::clone(&store) as Arc<dyn Store>,
        )
        .unwrap();
        (dir, store, batcher)
    }

    fn post_item(subject: &str, padding: usize) -> WorkItem {
        let raw = format!(
            "From: anne@example.org\r\n\
             Subject: {subject}\r\n\
             \r\n\
             {}\r\n",
            "x".repeat(padding)
        );
        let mut metadata = Metadata::default();
        metadata.insert(keys::LIST.to_string(), Value::from("ant"));
        WorkItem {
            key: ItemKey::generate(),
            queue: queues::DIGEST.to_string(),
            message: Message::parse(raw.as_bytes()).unwrap(),
            metadata,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_threshold_is_measured_in_kilobytes() {
        // Four ~300-byte posts: three stay under 1 KB, the fourth
        // crosses it.
        let (_dir, store, batcher) = batcher(list_with_threshold(1));

        for subject in ["one", "two", "three"] {
            let mut item = post_item(subject, 250);
            assert_eq!(batcher.process(&mut item).await.unwrap(), Disposition::Done);
            assert!(store.is_empty(queues::VIRGIN));
        }

        let mut item = post_item("four", 250);
        batcher.process(&mut item).await.unwrap();

        // Exactly one MIME and one flat digest.
        let keys_listed = store.list_keys(queues::VIRGIN).await.unwrap();
        assert_eq!(keys_listed.len(), 2);

        let mut subjects = Vec::new();
        let mut types = Vec::new();
        for key in &keys_listed {
            let digest = store.claim_and_read(queues::VIRGIN, key).await.unwrap();
            assert!(flag(&digest.metadata, keys::IS_DIGEST));
            subjects.push(digest.message.get("subject").unwrap().to_string());
            types.push(digest.message.content_type());
        }
        assert_eq!(subjects[0], "Ant Digest, Vol 1, Issue 1");
        assert_eq!(subjects[0], subjects[1]);
        assert!(types.contains(&"multipart/mixed".to_string()));
        assert!(types.contains(&"text/plain".to_string()));
    }

    #[tokio::test]
    async fn test_mime_digest_carries_original_bytes() {
        let (_dir, store, batcher) = batcher(list_with_threshold(0));

        let mut item = post_item("hello", 10);
        let original = item.message.to_bytes();
        batcher.process(&mut item).await.unwrap();

        let keys_listed = store.list_keys(queues::VIRGIN).await.unwrap();
        let mut found = false;
        for key in &keys_listed {
            let digest = store.claim_and_read(queues::VIRGIN, key).await.unwrap();
            if digest.message.content_type() == "multipart/mixed" {
                let parts = digest.message.parts().unwrap();
                let rfc822: Vec<_> = parts
                    .iter()
                    .filter(|part| part.content_type() == "message/rfc822")
                    .collect();
                assert_eq!(rfc822.len(), 1);
                assert_eq!(rfc822[0].body_bytes(), original);
                found = true;
            }
        }
        assert!(found);
    }

    #[tokio::test]
    async fn test_forced_send_ignores_the_threshold() {
        let (_dir, store, batcher) = batcher(list_with_threshold(1000));

        let mut item = post_item("urgent", 10);
        item.metadata
            .insert(keys::DIGEST_SEND.to_string(), Value::Bool(true));
        batcher.process(&mut item).await.unwrap();

        assert_eq!(store.len(queues::VIRGIN), 2);
    }

    #[tokio::test]
    async fn test_issue_advances_and_volume_stays() {
        let (_dir, store, batcher) = batcher(list_with_threshold(0));

        for round in 1..=3 {
            let mut item = post_item("post", 10);
            batcher.process(&mut item).await.unwrap();

            // Drain both digests of this round and check their subject.
            let keys_listed = store.list_keys(queues::VIRGIN).await.unwrap();
            assert_eq!(keys_listed.len(), 2);
            for key in keys_listed {
                let digest = store.claim_and_read(queues::VIRGIN, &key).await.unwrap();
                assert_eq!(
                    digest.message.get("subject").unwrap(),
                    format!("Ant Digest, Vol 1, Issue {round}")
                );
                store.delete(queues::VIRGIN, &key).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_accumulation_survives_a_restart() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());

        let registry = || {
            let registry = Arc::new(ListRegistry::new());
            registry.insert(list_with_threshold(1)).unwrap();
            registry
        };

        {
            let batcher = DigestBatcher::new(
                dir.path(),
                registry(),
                Arc::clone(&store) as Arc<dyn Store>,
            )
            .unwrap();
            for subject in ["one", "two", "three"] {
                batcher.process(&mut post_item(subject, 250)).await.unwrap();
            }
            assert!(store.is_empty(queues::VIRGIN));
        }

        // A fresh batcher picks up the pending posts from disk.
        let batcher = DigestBatcher::new(
            dir.path(),
            registry(),
            Arc::clone(&store) as Arc<dyn Store>,
        )
        .unwrap();
        batcher.process(&mut post_item("four", 250)).await.unwrap();

        assert_eq!(store.len(queues::VIRGIN), 2);
        let keys_listed = store.list_keys(queues::VIRGIN).await.unwrap();
        let mut rfc822_counts = Vec::new();
        for key in &keys_listed {
            let digest = store.claim_and_read(queues::VIRGIN, key).await.unwrap();
            if let Some(parts) = digest.message.parts() {
                rfc822_counts.push(
                    parts
                        .iter()
                        .filter(|part| part.content_type() == "message/rfc822")
                        .count(),
                );
            }
        }
        // All four posts made it into the MIME digest.
        assert_eq!(rfc822_counts, vec![4]);
    }

    #[tokio::test]
    async fn test_unknown_list_is_a_config_error() {
        let (_dir, _store, batcher) = batcher(list_with_threshold(1));

        let mut item = post_item("stray", 10);
        item.metadata
            .insert(keys::LIST.to_string(), Value::from("ghost"));

        let err = batcher.process(&mut item).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_set_aside() {
        let (dir, store, batcher) = batcher(list_with_threshold(0));

        std::fs::write(dir.path().join("ant.digest"), b"not bincode").unwrap();

        let mut item = post_item("hello", 10);
        assert_eq!(batcher.process(&mut item).await.unwrap(), Disposition::Done);
        assert_eq!(store.len(queues::VIRGIN), 2);
        assert!(dir.path().join("ant.digest.corrupt").exists());
    }
}
