//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Concurrency tests for the registry facade

use form_schema_registry::{
    config::StorageBackendType, RegistryEventKind, SchemaDocument, SchemaRegistry,
    SchemaRegistryConfig, SchemaRegistryError,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const WRITERS: usize = 16;
const REVISIONS: u64 = 40;

fn revision(id: &str, n: u64) -> SchemaDocument {
    SchemaDocument::new(id)
        .with_field("title", json!(format!("revision {}", n)))
        .with_field("revision", json!(n))
        .with_field("fields", json!([{"name": format!("field_{}", n)}]))
}

fn assert_consistent(document: &SchemaDocument) -> u64 {
    let n = document.field("revision").and_then(|v| v.as_u64()).unwrap();
    assert_eq!(document.field("title"), Some(&json!(format!("revision {}", n))));
    assert_eq!(
        document.field("fields"),
        Some(&json!([{"name": format!("field_{}", n)}]))
    );
    n
}

async fn concurrent_register(registry: Arc<SchemaRegistry>) {
    let mut handles = Vec::new();
    for n in 0..WRITERS {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .register(&revision("contested", n as u64), &CancellationToken::new())
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(SchemaRegistryError::SchemaAlreadyExists(id)) => assert_eq!(id, "contested"),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(registry.metrics().schema_count, 1);
    let winner = registry
        .get("contested", &CancellationToken::new())
        .await
        .unwrap();
    assert_consistent(&winner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_single_winner_memory() {
    let registry = Arc::new(
        SchemaRegistry::new(SchemaRegistryConfig::default())
            .await
            .unwrap(),
    );
    concurrent_register(registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_single_winner_file() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = SchemaRegistryConfig::default();
    config.storage.backend = StorageBackendType::File;
    config.storage.backend_settings.insert(
        "base_path".to_string(),
        temp_dir.path().display().to_string(),
    );

    let registry = Arc::new(SchemaRegistry::new(config).await.unwrap());
    concurrent_register(registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_never_observe_torn_documents() {
    let registry = Arc::new(
        SchemaRegistry::new(SchemaRegistryConfig::default())
            .await
            .unwrap(),
    );
    let cancel = CancellationToken::new();
    registry.register(&revision("hot", 0), &cancel).await.unwrap();

    let writer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            for n in 1..=REVISIONS {
                registry.update(&revision("hot", n), &cancel).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        readers.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut last_seen = 0;
            for _ in 0..REVISIONS {
                let document = registry.get("hot", &cancel).await.unwrap();
                let n = assert_consistent(&document);
                // A single reader never goes back in time
                assert!(n >= last_seen, "saw {} after {}", n, last_seen);
                last_seen = n;
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let last = registry.get("hot", &cancel).await.unwrap();
    assert_eq!(assert_consistent(&last), REVISIONS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_follow_operation_order() {
    let registry = Arc::new(
        SchemaRegistry::new(SchemaRegistryConfig::default())
            .await
            .unwrap(),
    );
    let mut events = registry.subscribe_channel();
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for n in 0..8u64 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let id = format!("forms.f{}", n);
            registry.register(&revision(&id, 0), &cancel).await.unwrap();
            registry.update(&revision(&id, 1), &cancel).await.unwrap();
            registry.delete(&id, &cancel).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(registry.list_ids(None, &cancel).await.unwrap().is_empty());

    let mut per_id: std::collections::HashMap<String, Vec<RegistryEventKind>> =
        std::collections::HashMap::new();
    while let Ok(event) = events.try_recv() {
        per_id.entry(event.schema_id).or_default().push(event.kind);
    }

    assert_eq!(per_id.len(), 8);
    for kinds in per_id.values() {
        assert_eq!(
            kinds,
            &vec![
                RegistryEventKind::Registered,
                RegistryEventKind::Updated,
                RegistryEventKind::Deleted
            ]
        );
    }
}
