//! In-memory `BomStore` with settable document ages.

use async_stream::try_stream;
use async_trait::async_trait;
use bomrepo_core::{Format, SpecVersion};
use bomrepo_storage::{
    BomStore, BomUpload, OriginalBom, SerialStream, StorageError, StorageResult,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

type VersionKey = (String, u32);
type OriginalKey = (String, u32, Format, SpecVersion);

#[derive(Default)]
struct State {
    canonical: BTreeMap<VersionKey, (Bytes, OffsetDateTime)>,
    originals: BTreeMap<OriginalKey, Bytes>,
}

/// Shared-state store; clones see the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn check(cancel: &CancellationToken) -> StorageResult<()> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the recorded creation time of a canonical document.
    pub fn set_age(&self, serial_number: &str, version: u32, created: OffsetDateTime) {
        if let Some(entry) = self
            .state
            .lock()
            .canonical
            .get_mut(&(serial_number.to_string(), version))
        {
            entry.1 = created;
        }
    }

    /// Put raw bytes under a canonical key, bypassing create-only checks.
    pub fn insert_raw(&self, serial_number: &str, version: u32, data: Bytes) {
        self.state.lock().canonical.insert(
            (serial_number.to_string(), version),
            (data, OffsetDateTime::now_utc()),
        );
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().canonical.len()
    }
}

enum Target {
    Canonical(VersionKey),
    Original(OriginalKey),
}

struct MemoryUpload {
    state: Arc<Mutex<State>>,
    target: Target,
    buffer: BytesMut,
}

#[async_trait]
impl BomUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let MemoryUpload {
            state,
            target,
            buffer,
        } = *self;
        let size = buffer.len() as u64;
        let data = buffer.freeze();
        let mut state = state.lock();
        match target {
            Target::Canonical(key) => {
                if state.canonical.contains_key(&key) {
                    return Err(StorageError::AlreadyExists(format!("{}/{}", key.0, key.1)));
                }
                state
                    .canonical
                    .insert(key, (data, OffsetDateTime::now_utc()));
            }
            Target::Original(key) => {
                if state.originals.contains_key(&key) {
                    return Err(StorageError::AlreadyExists(format!(
                        "{}/{}/{}.{}",
                        key.0, key.1, key.3, key.2
                    )));
                }
                state.originals.insert(key, data);
            }
        }
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BomStore for MemoryStore {
    async fn initialize(&self, cancel: &CancellationToken) -> StorageResult<()> {
        check(cancel)
    }

    async fn store(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>> {
        check(cancel)?;
        let key = (serial_number.to_string(), version);
        if self.state.lock().canonical.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "{serial_number}/{version}"
            )));
        }
        Ok(Box::new(MemoryUpload {
            state: self.state.clone(),
            target: Target::Canonical(key),
            buffer: BytesMut::new(),
        }))
    }

    async fn retrieve(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Bytes>> {
        check(cancel)?;
        Ok(self
            .state
            .lock()
            .canonical
            .get(&(serial_number.to_string(), version))
            .map(|(data, _)| data.clone()))
    }

    async fn list_versions(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<u32>> {
        check(cancel)?;
        Ok(self
            .state
            .lock()
            .canonical
            .keys()
            .filter(|(serial, _)| serial == serial_number)
            .map(|(_, version)| *version)
            .collect())
    }

    fn list_serial_numbers<'a>(&'a self, cancel: &'a CancellationToken) -> SerialStream<'a> {
        Box::pin(try_stream! {
            let serials: BTreeSet<String> = {
                let state = self.state.lock();
                state
                    .canonical
                    .keys()
                    .map(|(serial, _)| serial.clone())
                    .chain(state.originals.keys().map(|key| key.0.clone()))
                    .collect()
            };
            for serial in serials {
                check(cancel)?;
                yield serial;
            }
        })
    }

    async fn delete(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        check(cancel)?;
        let mut state = self.state.lock();
        state
            .canonical
            .remove(&(serial_number.to_string(), version));
        state
            .originals
            .retain(|key, _| !(key.0 == serial_number && key.1 == version));
        Ok(())
    }

    async fn delete_all(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        check(cancel)?;
        let mut state = self.state.lock();
        state.canonical.retain(|key, _| key.0 != serial_number);
        state.originals.retain(|key, _| key.0 != serial_number);
        Ok(())
    }

    async fn age(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<OffsetDateTime> {
        check(cancel)?;
        self.state
            .lock()
            .canonical
            .get(&(serial_number.to_string(), version))
            .map(|(_, created)| *created)
            .ok_or_else(|| StorageError::NotFound(format!("{serial_number}/{version}")))
    }

    async fn store_original(
        &self,
        serial_number: &str,
        version: u32,
        format: Format,
        spec_version: SpecVersion,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>> {
        check(cancel)?;
        Ok(Box::new(MemoryUpload {
            state: self.state.clone(),
            target: Target::Original((serial_number.to_string(), version, format, spec_version)),
            buffer: BytesMut::new(),
        }))
    }

    async fn retrieve_original(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<OriginalBom>> {
        check(cancel)?;
        Ok(self
            .state
            .lock()
            .originals
            .iter()
            .find(|(key, _)| key.0 == serial_number && key.1 == version)
            .map(|(key, data)| OriginalBom {
                format: key.2,
                spec_version: key.3,
                data: data.clone(),
            }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
