//! Test fixtures for building documents and services.

use bomrepo_core::model::{Component, ComponentType, Metadata};
use bomrepo_core::{Bom, SerialNumber, SpecVersion};
use bomrepo_server::RepoService;
use bomrepo_storage::{BomStore, FilesystemBackend};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::memory::MemoryStore;

/// A new random `urn:uuid:` serial number.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn fresh_serial() -> String {
    SerialNumber::generate().into_string()
}

/// A latest-version document whose metadata component carries the given
/// search fields.
#[allow(dead_code)]
pub fn sample_bom(group: &str, name: &str, version: &str) -> Bom {
    let mut component = Component::new(ComponentType::Library, name);
    component.group = Some(group.to_string());
    component.version = Some(version.to_string());

    let mut bom = Bom::new(SpecVersion::LATEST);
    bom.metadata = Some(Metadata {
        component: Some(component),
        ..Default::default()
    });
    bom
}

/// `sample_bom` pinned to a serial number and version.
#[allow(dead_code)]
pub fn versioned_bom(serial: &str, version: u32) -> Bom {
    let mut bom = sample_bom("org.example", "acme", "1.0.0");
    bom.serial_number = Some(serial.to_string());
    bom.version = Some(version);
    bom
}

/// A repository over an in-memory store; the store handle is returned for
/// age manipulation.
#[allow(dead_code)]
pub fn memory_repo() -> (MemoryStore, RepoService) {
    let store = MemoryStore::new();
    let repo = RepoService::new(Arc::new(store.clone()));
    (store, repo)
}

/// A repository over an initialized filesystem backend in a temp dir.
#[allow(dead_code)]
pub async fn filesystem_repo() -> (TempDir, RepoService) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let backend = FilesystemBackend::new(temp_dir.path())
        .await
        .expect("Failed to create filesystem backend");
    backend
        .initialize(&CancellationToken::new())
        .await
        .expect("Failed to initialize filesystem backend");
    (temp_dir, RepoService::new(Arc::new(backend)))
}
