//! End-to-end switchboard behavior against a real directory tree.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use herald_common::{
    message::Message,
    metadata::{Metadata, Value, keys},
};
use herald_switchboard::{FileStore, Store, SwitchboardError, queues, slice};
use tempfile::TempDir;

const RAW: &[u8] = b"From: anne@example.org\r\n\
    To: test@example.com\r\n\
    Subject: queue me\r\n\
    \r\n\
    body text\r\n";

fn store() -> (TempDir, FileStore) {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    (dir, store)
}

fn sample_metadata() -> Metadata {
    let mut md = Metadata::default();
    md.insert(keys::LIST.to_string(), Value::from("ant"));
    md
}

#[tokio::test]
async fn test_enqueue_claim_round_trip() {
    let (_dir, store) = store();
    let message = Message::parse(RAW).unwrap();

    let key = store
        .enqueue(queues::NEWS, message.clone(), sample_metadata())
        .await
        .unwrap();

    let keys_listed = store.list_keys(queues::NEWS).await.unwrap();
    assert_eq!(keys_listed, vec![key.clone()]);

    let item = store.claim_and_read(queues::NEWS, &key).await.unwrap();
    assert_eq!(item.message, message);
    assert_eq!(item.metadata, sample_metadata());
    assert_eq!(item.retry_count, 0);

    // Claimed items disappear from the listing.
    assert!(store.list_keys(queues::NEWS).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_claim_loses_the_race() {
    let (_dir, store) = store();
    let message = Message::parse(RAW).unwrap();
    let key = store
        .enqueue(queues::NEWS, message, Metadata::default())
        .await
        .unwrap();

    store.claim_and_read(queues::NEWS, &key).await.unwrap();
    let err = store.claim_and_read(queues::NEWS, &key).await.unwrap_err();
    assert!(err.is_claim_race(), "got {err}");
}

#[tokio::test]
async fn test_crash_between_claim_and_commit_is_recovered() {
    let dir = TempDir::new().unwrap();
    let message = Message::parse(RAW).unwrap();

    let key = {
        let store = FileStore::new(dir.path()).unwrap();
        let key = store
            .enqueue(queues::DIGEST, message.clone(), sample_metadata())
            .await
            .unwrap();
        // Claim, then "crash" without delete or requeue.
        store.claim_and_read(queues::DIGEST, &key).await.unwrap();
        key
    };

    // A fresh process restores the orphaned claim intact.
    let store = FileStore::new(dir.path()).unwrap();
    assert_eq!(store.recover(queues::DIGEST).await.unwrap(), 1);

    let item = store.claim_and_read(queues::DIGEST, &key).await.unwrap();
    assert_eq!(item.message, message);
    assert_eq!(item.metadata, sample_metadata());
}

#[tokio::test]
async fn test_recover_discards_unfinished_writes() {
    let (dir, store) = store();
    let queue_dir = dir.path().join(queues::NEWS);
    store.recover(queues::NEWS).await.unwrap();

    std::fs::write(queue_dir.join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.itm"), b"partial").unwrap();
    assert_eq!(store.recover(queues::NEWS).await.unwrap(), 0);
    assert!(store.list_keys(queues::NEWS).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_requeue_preserves_item_and_bumps_retry() {
    let (_dir, store) = store();
    let message = Message::parse(RAW).unwrap();
    let key = store
        .enqueue(queues::NEWS, message.clone(), Metadata::default())
        .await
        .unwrap();

    let mut item = store.claim_and_read(queues::NEWS, &key).await.unwrap();
    item.retry_count += 1;
    item.metadata
        .insert(keys::PREPARED.to_string(), Value::Bool(true));
    store.requeue(&item).await.unwrap();

    // Requeued item is claimable again with the updated state.
    let again = store.claim_and_read(queues::NEWS, &key).await.unwrap();
    assert_eq!(again.retry_count, 1);
    assert_eq!(
        again.metadata.get(keys::PREPARED),
        Some(&Value::Bool(true))
    );
    assert_eq!(again.message, message);
}

#[tokio::test]
async fn test_shunt_moves_item_out_of_its_queue() {
    let (_dir, store) = store();
    let message = Message::parse(RAW).unwrap();
    let key = store
        .enqueue(queues::NEWS, message.clone(), sample_metadata())
        .await
        .unwrap();

    store.claim_and_read(queues::NEWS, &key).await.unwrap();
    store.shunt_raw(queues::NEWS, &key).await.unwrap();

    assert!(store.list_keys(queues::NEWS).await.unwrap().is_empty());

    // The quarantined item is readable from the shunt queue, bytes intact.
    let shunted = store.claim_and_read(queues::SHUNT, &key).await.unwrap();
    assert_eq!(shunted.message, message);
    assert_eq!(shunted.metadata, sample_metadata());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_dir, store) = store();
    let key = store
        .enqueue(queues::VIRGIN, Message::new(), Metadata::default())
        .await
        .unwrap();

    store.delete(queues::VIRGIN, &key).await.unwrap();
    store.delete(queues::VIRGIN, &key).await.unwrap();
    assert!(matches!(
        store.claim_and_read(queues::VIRGIN, &key).await,
        Err(SwitchboardError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_malformed_item_reports_its_key() {
    let (dir, store) = store();
    store.recover(queues::NEWS).await.unwrap();

    let filename = "01ARZ3NDEKTSV4RRFFQ69G5FAV.itm";
    std::fs::write(dir.path().join(queues::NEWS).join(filename), b"garbage").unwrap();

    let keys_listed = store.list_keys(queues::NEWS).await.unwrap();
    assert_eq!(keys_listed.len(), 1);

    let err = store
        .claim_and_read(queues::NEWS, &keys_listed[0])
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchboardError::Malformed { .. }));

    // The claim already renamed it; shunting quarantines the raw bytes.
    store.shunt_raw(queues::NEWS, &keys_listed[0]).await.unwrap();
    assert!(
        dir.path()
            .join(queues::SHUNT)
            .join(filename)
            .exists()
    );
}

#[tokio::test]
async fn test_listing_is_oldest_first() {
    let (_dir, store) = store();
    let mut enqueued = Vec::new();
    for _ in 0..5 {
        enqueued.push(
            store
                .enqueue(queues::DIGEST, Message::new(), Metadata::default())
                .await
                .unwrap(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    let listed = store.list_keys(queues::DIGEST).await.unwrap();
    assert_eq!(listed, enqueued);
}

#[test]
fn test_slices_cover_listed_keys() {
    let keys: Vec<_> = (0..64).map(|_| herald_switchboard::ItemKey::generate()).collect();
    let num_slices = 4;
    let total: usize = (0..num_slices)
        .map(|s| {
            keys.iter()
                .filter(|k| slice::in_slice(k, s, num_slices))
                .count()
        })
        .sum();
    assert_eq!(total, keys.len());
}
