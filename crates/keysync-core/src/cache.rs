//! File-backed local caches.
//!
//! These are passive stores: the flows in `keysync-client` decide what to
//! write and when. Each store is one JSON file under the store root, written
//! atomically (staging file + rename) so a crash never leaves a torn record.
//!
//! Nothing here holds key material. The device-wrap cache mirrors ciphertext
//! the server already has; the message cache mirrors decrypted messages so
//! reads keep working offline.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StoreError;

const DEVICE_WRAPS_FILE: &str = "device_wraps.json";
const MESSAGES_FILE: &str = "messages.json";
const DEVICE_ID_FILE: &str = "device_id";

/// Local mirror of a device's wrapped UMK, used when the server is
/// unreachable. Refreshed on every successful online restoration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedDeviceWrap {
    pub device_id: String,
    pub user_id: String,
    pub wrapped_umk: String,
    pub cached_at: DateTime<Utc>,
}

/// Local mirror of a decrypted+encrypted message pair, partitioned by user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMessageRecord {
    pub id: String,
    pub user_id: String,
    pub encrypted_content: String,
    pub nonce: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

/// Cache of device-wrap records, keyed by device id.
pub struct DeviceWrapCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, CachedDeviceWrap>>,
}

impl DeviceWrapCache {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(DEVICE_WRAPS_FILE);
        Ok(Self {
            entries: RwLock::new(load_json(&path)?.unwrap_or_default()),
            path,
        })
    }

    pub fn insert(&self, wrap: CachedDeviceWrap) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        entries.insert(wrap.device_id.clone(), wrap);
        write_json_atomic(&self.path, &*entries)
    }

    pub fn get(&self, device_id: &str) -> Option<CachedDeviceWrap> {
        self.entries.read().get(device_id).cloned()
    }

    /// Drop every cached wrap belonging to `user_id`.
    pub fn remove_for_user(&self, user_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        entries.retain(|_, wrap| wrap.user_id != user_id);
        write_json_atomic(&self.path, &*entries)
    }
}

/// Cache of decrypted messages, partitioned by user.
pub struct MessageCache {
    path: PathBuf,
    by_user: RwLock<HashMap<String, Vec<CachedMessageRecord>>>,
}

impl MessageCache {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(MESSAGES_FILE);
        Ok(Self {
            by_user: RwLock::new(load_json(&path)?.unwrap_or_default()),
            path,
        })
    }

    /// Overwrite the cache for `user_id` to exactly `records`: entries absent
    /// from the new set are deleted, the rest upserted.
    pub fn replace_for_user(
        &self,
        user_id: &str,
        records: Vec<CachedMessageRecord>,
    ) -> Result<(), StoreError> {
        let mut by_user = self.by_user.write();
        by_user.insert(user_id.to_string(), records);
        write_json_atomic(&self.path, &*by_user)
    }

    /// Cached records for `user_id`, sorted by creation time ascending.
    pub fn records_for_user(&self, user_id: &str) -> Vec<CachedMessageRecord> {
        let mut records = self
            .by_user
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|record| record.created_at);
        records
    }

    pub fn remove_for_user(&self, user_id: &str) -> Result<(), StoreError> {
        let mut by_user = self.by_user.write();
        by_user.remove(user_id);
        write_json_atomic(&self.path, &*by_user)
    }
}

/// The locally persisted device id, one per store root.
pub struct DeviceIdStore {
    path: PathBuf,
}

impl DeviceIdStore {
    pub fn open(root: &Path) -> Self {
        Self {
            path: root.join(DEVICE_ID_FILE),
        }
    }

    pub fn save(&self, device_id: &str) -> Result<(), StoreError> {
        write_atomic(&self.path, device_id.as_bytes())
    }

    pub fn get(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(id) if id.trim().is_empty() => Ok(None),
            Ok(id) => Ok(Some(id.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = path.with_extension(format!("staging-{}", Uuid::new_v4()));
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}
