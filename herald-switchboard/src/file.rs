//! File-backed switchboard.
//!
//! One subdirectory per logical queue, one bincode file per item:
//! `{key}.itm`. All writes go to a `.tmp_` file first and are published
//! with an atomic rename, so a crash never leaves a partial item visible.
//! Claiming renames the item to `{key}.itm.bak`; the rename either
//! succeeds for exactly one claimant or fails with `NotFound` for the
//! rest. Orphaned `.bak` markers from a crashed owner are restored by
//! [`Store::recover`] at startup, which is what makes delivery
//! at-least-once.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use herald_common::{internal, message::Message, metadata::Metadata};
use tokio::fs;

use crate::{
    Result, SwitchboardError,
    item::{ItemRecord, WorkItem},
    store::Store,
    types::ItemKey,
};

const CLAIM_SUFFIX: &str = ".bak";
const TMP_PREFIX: &str = ".tmp_";

/// Directory-backed [`Store`] implementation.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a switchboard rooted at `root`, creating the directory when
    /// it does not exist.
    ///
    /// # Errors
    /// If the path fails validation or cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::validate_root(&root)?;
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Reject queue roots that could escape or clobber the system.
    fn validate_root(path: &Path) -> Result<()> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(SwitchboardError::Validation(format!(
                "Queue root cannot contain '..' components: {}",
                path.display()
            )));
        }
        if !path.is_absolute() {
            return Err(SwitchboardError::Validation(format!(
                "Queue root must be absolute: {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn queue_dir(&self, queue: &str) -> Result<PathBuf> {
        if queue.is_empty()
            || queue.contains('/')
            || queue.contains('\\')
            || queue.contains("..")
        {
            return Err(SwitchboardError::Validation(format!(
                "Invalid queue name: {queue:?}"
            )));
        }
        Ok(self.root.join(queue))
    }

    async fn ensure_queue(&self, queue: &str) -> Result<PathBuf> {
        let dir = self.queue_dir(queue)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Publish a record under `key` in `queue` via temp file + rename.
    async fn publish(&self, dir: &Path, key: &ItemKey, record: &ItemRecord) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
        let tmp_path = dir.join(format!("{TMP_PREFIX}{}", key.filename()));
        let final_path = dir.join(key.filename());

        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &final_path).await?;

        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn enqueue(
        &self,
        queue: &str,
        message: Message,
        metadata: Metadata,
    ) -> Result<ItemKey> {
        let dir = self.ensure_queue(queue).await?;
        let key = ItemKey::generate();
        let record = ItemRecord {
            message,
            metadata,
            retry_count: 0,
        };
        self.publish(&dir, &key, &record).await?;

        internal!(level = DEBUG, "Enqueued item {key} into {queue}");

        Ok(key)
    }

    async fn list_keys(&self, queue: &str) -> Result<Vec<ItemKey>> {
        let dir = self.ensure_queue(queue).await?;
        let mut entries = fs::read_dir(&dir).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if !filename.starts_with(TMP_PREFIX)
                && let Some(key) = ItemKey::from_filename(&filename)
            {
                keys.push(key);
            }
        }

        // ULIDs sort lexicographically by creation time.
        keys.sort();

        Ok(keys)
    }

    async fn claim_and_read(&self, queue: &str, key: &ItemKey) -> Result<WorkItem> {
        let dir = self.queue_dir(queue)?;
        let live = dir.join(key.filename());
        let claimed = dir.join(format!("{}{CLAIM_SUFFIX}", key.filename()));

        // The rename is the claim: exactly one caller wins it.
        if let Err(e) = fs::rename(&live, &claimed).await {
            return Err(if e.kind() == std::io::ErrorKind::NotFound {
                SwitchboardError::NotFound(key.clone())
            } else {
                e.into()
            });
        }

        let bytes = fs::read(&claimed).await?;
        let (record, _): (ItemRecord, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| SwitchboardError::Malformed {
                    key: key.clone(),
                    reason: e.to_string(),
                },
            )?;

        Ok(WorkItem::from_record(key.clone(), queue, record))
    }

    async fn delete(&self, queue: &str, key: &ItemKey) -> Result<()> {
        let dir = self.queue_dir(queue)?;
        let claimed = dir.join(format!("{}{CLAIM_SUFFIX}", key.filename()));
        let live = dir.join(key.filename());

        for path in [claimed, live] {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    internal!(level = DEBUG, "Deleted item {key} from {queue}");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Deleting a missing key is not an error.
        Ok(())
    }

    async fn requeue(&self, item: &WorkItem) -> Result<()> {
        let dir = self.ensure_queue(&item.queue).await?;

        // A single atomic overwrite back to the live name; only then is
        // the claim marker dropped. A crash in between leaves both
        // files, which recover() resolves in favor of the newer one.
        self.publish(&dir, &item.key, &item.to_record()).await?;

        let claimed = dir.join(format!("{}{CLAIM_SUFFIX}", item.key.filename()));
        let _ = fs::remove_file(&claimed).await;

        internal!(
            level = DEBUG,
            "Requeued item {} into {} (retry {})",
            item.key,
            item.queue,
            item.retry_count
        );

        Ok(())
    }

    async fn shunt_raw(&self, queue: &str, key: &ItemKey) -> Result<()> {
        let dir = self.queue_dir(queue)?;
        let shunt_dir = self.ensure_queue(crate::queues::SHUNT).await?;
        let target = shunt_dir.join(key.filename());

        let claimed = dir.join(format!("{}{CLAIM_SUFFIX}", key.filename()));
        let live = dir.join(key.filename());

        for source in [claimed, live] {
            match fs::rename(&source, &target).await {
                Ok(()) => {
                    internal!(level = INFO, "Shunted item {key} from {queue}");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(SwitchboardError::NotFound(key.clone()))
    }

    async fn recover(&self, queue: &str) -> Result<usize> {
        let dir = self.ensure_queue(queue).await?;
        let mut entries = fs::read_dir(&dir).await?;
        let mut restored = 0;

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy().to_string();

            // Unfinished writes from a crashed process.
            if filename.starts_with(TMP_PREFIX) {
                fs::remove_file(entry.path()).await?;
                continue;
            }

            if let Some(stem) = filename.strip_suffix(CLAIM_SUFFIX) {
                let live = dir.join(stem);
                if fs::try_exists(&live).await.unwrap_or(false) {
                    // A requeue published the live file before the crash;
                    // the marker is stale.
                    fs::remove_file(entry.path()).await?;
                } else {
                    fs::rename(entry.path(), &live).await?;
                    restored += 1;
                }
            }
        }

        if restored > 0 {
            internal!(
                level = INFO,
                "Restored {restored} orphaned claims in queue {queue}"
            );
        }

        Ok(restored)
    }
}
