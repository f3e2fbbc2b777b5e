use thiserror::Error;

use keysync_core::{CryptoError, StoreError};

/// Directory-service failures, split so the flows can tell "the server said
/// no" from "the server could not be reached". Only the latter is eligible
/// for offline-cache fallback.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory unreachable: {0}")]
    Unreachable(String),

    #[error("directory returned {code}: {message}")]
    Status { code: u16, message: String },
}

impl DirectoryError {
    /// True for reachability failures that may be substituted by cached data.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Unreachable(_) => true,
            Self::Status { .. } => false,
        }
    }
}

/// Failures surfaced by the login, restoration and sync flows.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("no registered device found and no recovery passphrase has been set for this account")]
    NoRecoveryAvailable,

    #[error("device id missing locally; please log in again")]
    DeviceIdMissing,

    #[error("local encryption key not found; please re-register this device")]
    LocalKeyMissing,

    #[error("cached device wrap not available for offline restore")]
    NoCachedWrap,

    #[error("stored device does not match the active session")]
    DeviceUserMismatch,

    #[error("cached device does not match the active session")]
    CacheUserMismatch,

    #[error("user master key not available; please log in again")]
    MissingKey,

    #[error("passphrase must be at least 8 characters")]
    PassphraseTooShort,

    #[error("passphrases do not match")]
    PassphraseMismatch,
}

impl ClientError {
    pub(crate) fn is_connectivity(&self) -> bool {
        matches!(self, Self::Directory(e) if e.is_connectivity())
    }
}
