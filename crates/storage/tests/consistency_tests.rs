// Consistency tests for concurrent writers against the filesystem backend
// Ensures create-only semantics hold when writers race for the same version

mod common;

use bomrepo_core::{Format, SpecVersion};
use bomrepo_storage::{BomStore, BomStoreExt, FilesystemBackend, StorageError};
use common::{fresh_serial, seeded_bytes};
use futures::TryStreamExt;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn backend() -> (TempDir, Arc<FilesystemBackend>) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();
    backend.initialize(&CancellationToken::new()).await.unwrap();
    (temp_dir, Arc::new(backend))
}

#[tokio::test]
async fn test_concurrent_stores_to_same_version_publish_once() {
    let (_temp_dir, backend) = backend().await;
    let serial = fresh_serial();

    let mut handles = Vec::new();
    for seed in 0..16u64 {
        let backend = backend.clone();
        let serial = serial.clone();
        handles.push(tokio::spawn(async move {
            let data = seeded_bytes(seed, 4096);
            let result = backend
                .store_bytes(&serial, 1, data.clone(), &CancellationToken::new())
                .await;
            (data, result)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (data, result) = handle.await.unwrap();
        match result {
            Ok(_) => winners.push(data),
            Err(StorageError::AlreadyExists(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one writer must win");
    let stored = backend
        .retrieve(&serial, 1, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, winners[0]);
}

#[tokio::test]
async fn test_concurrent_stores_to_distinct_versions_all_succeed() {
    let (_temp_dir, backend) = backend().await;
    let serial = fresh_serial();

    let mut handles = Vec::new();
    for version in 1..=20u32 {
        let backend = backend.clone();
        let serial = serial.clone();
        handles.push(tokio::spawn(async move {
            backend
                .store_bytes(
                    &serial,
                    version,
                    seeded_bytes(version as u64, 64),
                    &CancellationToken::new(),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let versions = backend
        .list_versions(&serial, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(versions, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_listing_while_deleting_sees_consistent_lineages() {
    let (_temp_dir, backend) = backend().await;
    let cancel = CancellationToken::new();

    let mut serials = Vec::new();
    for i in 0..30u64 {
        let serial = fresh_serial();
        backend
            .store_bytes(&serial, 1, seeded_bytes(i, 16), &cancel)
            .await
            .unwrap();
        serials.push(serial);
    }

    let deleter = {
        let backend = backend.clone();
        let doomed: Vec<String> = serials.iter().step_by(2).cloned().collect();
        tokio::spawn(async move {
            for serial in doomed {
                backend
                    .delete_all(&serial, &CancellationToken::new())
                    .await
                    .unwrap();
            }
        })
    };

    let listed: Vec<String> = backend
        .list_serial_numbers(&cancel)
        .try_collect()
        .await
        .unwrap();
    deleter.await.unwrap();

    // Every survivor is always listed; deleted lineages may or may not be.
    for serial in serials.iter().skip(1).step_by(2) {
        assert!(listed.contains(serial), "missing survivor {serial}");
    }
    for serial in &listed {
        assert!(serials.contains(serial));
    }
}

#[tokio::test]
async fn test_original_and_canonical_are_independent_keys() {
    let (_temp_dir, backend) = backend().await;
    let cancel = CancellationToken::new();
    let serial = fresh_serial();

    backend
        .store_original_bytes(
            &serial,
            1,
            Format::Json,
            SpecVersion::V1_3,
            seeded_bytes(1, 32),
            &cancel,
        )
        .await
        .unwrap();
    // An original alone does not make a version visible.
    assert!(backend.list_versions(&serial, &cancel).await.unwrap().is_empty());

    backend
        .store_bytes(&serial, 1, seeded_bytes(2, 32), &cancel)
        .await
        .unwrap();
    assert_eq!(backend.list_versions(&serial, &cancel).await.unwrap(), vec![1]);

    let original = backend
        .retrieve_original(&serial, 1, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.format, Format::Json);
    assert_eq!(original.data, seeded_bytes(1, 32));
}
