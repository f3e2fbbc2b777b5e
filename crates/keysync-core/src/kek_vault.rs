//! Local KEK storage.
//!
//! The local KEK must never leave the device, so it lives in the OS keychain
//! rather than in app storage. [`MemoryKekVault`] backs tests and ephemeral
//! profiles with the same interface.

use base64::{engine::general_purpose, Engine as _};
use keyring::Entry;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::crypto::KEY_LEN;
use crate::error::StoreError;
use crate::keys::LocalKek;

const SERVICE_NAME: &str = "KeySync";
const LOCAL_KEK_PREFIX: &str = "local-kek";

fn entry_name(user_id: &str) -> String {
    format!("{LOCAL_KEK_PREFIX}:{user_id}")
}

/// Storage for per-user local KEKs. One entry per (user, device); the device
/// dimension is implicit because the vault itself is device-local.
pub trait KekVault: Send + Sync {
    fn store(&self, user_id: &str, kek: &LocalKek) -> Result<(), StoreError>;
    fn load(&self, user_id: &str) -> Result<Option<LocalKek>, StoreError>;
    fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

/// OS keychain backend.
pub struct KeyringKekVault;

impl KeyringKekVault {
    fn entry(user_id: &str) -> Result<Entry, StoreError> {
        Entry::new(SERVICE_NAME, &entry_name(user_id))
            .map_err(|e| StoreError::Keyring(format!("keyring init: {e}")))
    }
}

impl KekVault for KeyringKekVault {
    fn store(&self, user_id: &str, kek: &LocalKek) -> Result<(), StoreError> {
        let encoded = general_purpose::STANDARD.encode(kek.expose());
        Self::entry(user_id)?
            .set_password(&encoded)
            .map_err(|e| StoreError::Keyring(format!("store local kek: {e}")))
    }

    fn load(&self, user_id: &str) -> Result<Option<LocalKek>, StoreError> {
        let encoded = match Self::entry(user_id)?.get_password() {
            Ok(encoded) => encoded,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(StoreError::Keyring(format!("load local kek: {e}"))),
        };
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| StoreError::Corrupt(format!("decode local kek: {e}")))?;
        let bytes: [u8; KEY_LEN] = decoded
            .try_into()
            .map_err(|_| StoreError::Corrupt("local kek length invalid".to_string()))?;
        Ok(Some(LocalKek::from_bytes(bytes)))
    }

    fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        match Self::entry(user_id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keyring(format!("delete local kek: {e}"))),
        }
    }
}

/// In-memory backend for tests and ephemeral profiles.
#[derive(Default)]
pub struct MemoryKekVault {
    entries: Mutex<HashMap<String, [u8; KEY_LEN]>>,
}

impl MemoryKekVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KekVault for MemoryKekVault {
    fn store(&self, user_id: &str, kek: &LocalKek) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(user_id.to_string(), *kek.expose());
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<LocalKek>, StoreError> {
        Ok(self
            .entries
            .lock()
            .get(user_id)
            .copied()
            .map(LocalKek::from_bytes))
    }

    fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(user_id);
        Ok(())
    }
}
