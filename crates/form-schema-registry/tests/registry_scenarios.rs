//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! End-to-end registry scenarios
//!
//! Exercises the public facade against the in-memory and filesystem
//! backends with the configured cache in front of them.

use base64::Engine;
use form_schema_registry::{
    config::StorageBackendType, SchemaDocument, SchemaRegistry, SchemaRegistryConfig,
    SchemaRegistryError, StorageFilter,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Helper function to build a registry over the given configuration
async fn create_registry(config: SchemaRegistryConfig) -> SchemaRegistry {
    SchemaRegistry::new(config).await.unwrap()
}

fn versioned_config(max_versions: usize) -> SchemaRegistryConfig {
    let mut config = SchemaRegistryConfig::default();
    config.features.enable_versioning = true;
    config.features.max_versions = max_versions;
    config
}

fn file_config(base: &Path) -> SchemaRegistryConfig {
    let mut config = SchemaRegistryConfig::default();
    config.storage.backend = StorageBackendType::File;
    config
        .storage
        .backend_settings
        .insert("base_path".to_string(), base.display().to_string());
    config
}

fn form(id: &str, title: &str) -> SchemaDocument {
    SchemaDocument::new(id)
        .with_field("title", json!(title))
        .with_field(
            "fields",
            json!([
                {"name": "email", "type": "email", "required": true},
                {"name": "display_name", "type": "text"}
            ]),
        )
}

#[tokio::test]
async fn test_register_get_round_trip() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    let document = SchemaDocument::new("user.profile")
        .with_version("1.0.0")
        .with_field("title", json!("User"));
    registry.register(&document, &cancel).await.unwrap();

    assert_eq!(registry.get("user.profile", &cancel).await.unwrap(), document);
    assert!(registry.exists("user.profile", &cancel).await.unwrap());

    // Second read is served from the cache and must be identical
    assert_eq!(registry.get("user.profile", &cancel).await.unwrap(), document);
}

#[tokio::test]
async fn test_duplicate_register_rejected() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    registry.register(&SchemaDocument::new("x"), &cancel).await.unwrap();
    let err = registry
        .register(&SchemaDocument::new("x"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SchemaRegistryError::SchemaAlreadyExists(ref id) if id == "x"));
}

#[tokio::test]
async fn test_update_retains_bounded_history() {
    let registry = create_registry(versioned_config(2)).await;
    let cancel = CancellationToken::new();

    registry.register(&form("x", "v1"), &cancel).await.unwrap();
    for title in ["v2", "v3", "v4"] {
        registry.update(&form("x", title), &cancel).await.unwrap();
    }

    assert_eq!(registry.get("x", &cancel).await.unwrap(), form("x", "v4"));

    let versions = registry.list_versions("x", &cancel).await.unwrap();
    assert_eq!(versions.len(), 2);

    let oldest = registry.get_version("x", &versions[0], &cancel).await.unwrap();
    assert_eq!(oldest, form("x", "v2"));
    let newest = registry.get_version("x", &versions[1], &cancel).await.unwrap();
    assert_eq!(newest, form("x", "v3"));
}

#[tokio::test]
async fn test_history_length_is_min_of_updates_and_limit() {
    let cancel = CancellationToken::new();

    for (updates, limit) in [(0usize, 3usize), (2, 3), (5, 3)] {
        let registry = create_registry(versioned_config(limit)).await;
        registry.register(&form("x", "v0"), &cancel).await.unwrap();
        for i in 1..=updates {
            registry
                .update(&form("x", &format!("v{}", i)), &cancel)
                .await
                .unwrap();
        }

        let versions = registry.list_versions("x", &cancel).await.unwrap();
        assert_eq!(versions.len(), updates.min(limit), "updates={}", updates);
        assert_eq!(
            registry.get("x", &cancel).await.unwrap(),
            form("x", &format!("v{}", updates))
        );
    }
}

#[tokio::test]
async fn test_zero_max_versions_keeps_no_history() {
    let registry = create_registry(versioned_config(0)).await;
    let cancel = CancellationToken::new();

    registry.register(&form("x", "v1"), &cancel).await.unwrap();
    registry.update(&form("x", "v2"), &cancel).await.unwrap();

    assert!(registry.list_versions("x", &cancel).await.unwrap().is_empty());
    assert_eq!(registry.get("x", &cancel).await.unwrap(), form("x", "v2"));
}

#[tokio::test]
async fn test_update_of_absent_schema_is_not_found() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    let err = registry.update(&form("ghost", "v1"), &cancel).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!registry.exists("ghost", &cancel).await.unwrap());
}

#[tokio::test]
async fn test_delete_semantics() {
    let registry = create_registry(versioned_config(5)).await;
    let cancel = CancellationToken::new();

    registry.register(&form("y", "v1"), &cancel).await.unwrap();
    registry.update(&form("y", "v2"), &cancel).await.unwrap();
    registry.get("y", &cancel).await.unwrap();

    registry.delete("y", &cancel).await.unwrap();

    assert!(!registry.exists("y", &cancel).await.unwrap());
    assert!(registry.get("y", &cancel).await.unwrap_err().is_not_found());
    assert!(registry.list_versions("y", &cancel).await.unwrap().is_empty());
    assert!(registry.delete("y", &cancel).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_list_with_pagination() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    for id in ["a", "b", "c", "d"] {
        registry.register(&form(id, id), &cancel).await.unwrap();
    }

    let all = registry.list_ids(None, &cancel).await.unwrap();
    assert_eq!(all, vec!["a", "b", "c", "d"]);

    let page = registry
        .list(Some(&StorageFilter::page(1, 2)), &cancel)
        .await
        .unwrap();
    let ids: Vec<&str> = page.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    let tail = registry
        .list_ids(Some(&StorageFilter::page(3, 10)), &cancel)
        .await
        .unwrap();
    assert_eq!(tail, vec!["d"]);
}

#[tokio::test]
async fn test_list_only_returns_live_records() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    for id in ["forms.login", "forms.signup", "pages.home"] {
        registry.register(&form(id, id), &cancel).await.unwrap();
    }
    registry.delete("forms.signup", &cancel).await.unwrap();

    let filter = StorageFilter::default().with_prefix("forms.");
    let listed = registry.list(Some(&filter), &cancel).await.unwrap();
    assert_eq!(listed, vec![form("forms.login", "forms.login")]);
}

#[tokio::test]
async fn test_update_invalidates_cached_document() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    registry.register(&form("z", "V1"), &cancel).await.unwrap();
    assert_eq!(registry.get("z", &cancel).await.unwrap(), form("z", "V1"));

    registry.update(&form("z", "V2"), &cancel).await.unwrap();
    assert_eq!(registry.get("z", &cancel).await.unwrap(), form("z", "V2"));
}

#[tokio::test]
async fn test_cache_maintenance_is_idempotent() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    registry.register(&form("z", "V1"), &cancel).await.unwrap();
    registry.get("z", &cancel).await.unwrap();

    registry.invalidate_cache("z", &cancel).await.unwrap();
    registry.invalidate_cache("z", &cancel).await.unwrap();
    registry.clear_cache(&cancel).await.unwrap();
    registry.clear_cache(&cancel).await.unwrap();

    assert_eq!(registry.get("z", &cancel).await.unwrap(), form("z", "V1"));
}

#[tokio::test]
async fn test_invalid_ids_rejected() {
    let registry = create_registry(SchemaRegistryConfig::default()).await;
    let cancel = CancellationToken::new();

    for id in ["", " padded", "a/b", "..\\x", "trailing "] {
        let err = registry
            .register(&SchemaDocument::new(id), &cancel)
            .await
            .unwrap_err();
        assert!(
            matches!(err, SchemaRegistryError::InvalidId { .. }),
            "id {:?} gave {:?}",
            id,
            err
        );
    }
    assert!(registry.list_ids(None, &cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_backend_persists_across_registries() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    {
        let registry = create_registry(file_config(temp_dir.path())).await;
        registry
            .register(&form("forms.checkout.address", "v1"), &cancel)
            .await
            .unwrap();
        registry
            .update(&form("forms.checkout.address", "v2"), &cancel)
            .await
            .unwrap();
        registry.shutdown().await.unwrap();
    }

    assert!(temp_dir.path().join("forms/checkout/address.json").is_file());
    assert!(temp_dir
        .path()
        .join(".versions/forms.checkout.address")
        .is_dir());

    let registry = create_registry(file_config(temp_dir.path())).await;
    assert_eq!(registry.metrics().schema_count, 1);
    assert_eq!(
        registry.get("forms.checkout.address", &cancel).await.unwrap(),
        form("forms.checkout.address", "v2")
    );

    let versions = registry
        .list_versions("forms.checkout.address", &cancel)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(
        registry
            .get_version("forms.checkout.address", &versions[0], &cancel)
            .await
            .unwrap(),
        form("forms.checkout.address", "v1")
    );
}

#[tokio::test]
async fn test_compressed_payloads_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let mut config = file_config(temp_dir.path());
    config.features.enable_compression = true;
    let registry = create_registry(config).await;

    registry.register(&form("signup", "Sign up"), &cancel).await.unwrap();

    let raw = std::fs::read(temp_dir.path().join("signup.json")).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    assert_eq!(
        registry.get("signup", &cancel).await.unwrap(),
        form("signup", "Sign up")
    );
}

#[tokio::test]
async fn test_encrypted_payloads_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let mut config = file_config(temp_dir.path());
    config.features.enable_compression = true;
    config.features.enable_encryption = true;
    config.features.encryption_key =
        Some(base64::engine::general_purpose::STANDARD.encode([7u8; 32]));
    let registry = create_registry(config).await;

    registry.register(&form("login", "Log in"), &cancel).await.unwrap();
    registry.invalidate_cache("login", &cancel).await.unwrap();

    let raw = std::fs::read(temp_dir.path().join("login.json")).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("Log in"));
    assert_eq!(
        registry.get("login", &cancel).await.unwrap(),
        form("login", "Log in")
    );

    // A registry holding a different key cannot read the record
    let mut other = file_config(temp_dir.path());
    other.features.enable_compression = true;
    other.features.enable_encryption = true;
    other.features.encryption_key =
        Some(base64::engine::general_purpose::STANDARD.encode([9u8; 32]));
    let registry = create_registry(other).await;
    let err = registry.get("login", &cancel).await.unwrap_err();
    assert!(matches!(err, SchemaRegistryError::Deserialization { .. }));
}

#[tokio::test]
async fn test_versioning_disabled_rejects_history_access() {
    let mut config = SchemaRegistryConfig::default();
    config.features.enable_versioning = false;
    let registry = create_registry(config).await;
    let cancel = CancellationToken::new();

    registry.register(&form("x", "v1"), &cancel).await.unwrap();
    registry.update(&form("x", "v2"), &cancel).await.unwrap();

    assert!(matches!(
        registry.list_versions("x", &cancel).await.unwrap_err(),
        SchemaRegistryError::FeatureDisabled { .. }
    ));
}
