//! Key custody core for KeySync.
//!
//! Owns the key hierarchy (User Master Key, per-device local KEK, passphrase
//! recovery envelopes) and the local secure stores that back it: an OS
//! keychain vault for local KEKs and file-backed offline caches for device
//! wraps and decrypted messages. Raw UMK bytes exist only in memory and are
//! zeroized on drop; everything persisted is either wrapped or public.

pub mod cache;
pub mod crypto;
pub mod error;
pub mod kek_vault;
pub mod keys;
pub mod paths;

pub use error::{CryptoError, StoreError};
pub use keys::{LocalKek, RecoveryPayload, UserMasterKey};
