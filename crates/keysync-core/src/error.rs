use thiserror::Error;

/// Failures in the key hierarchy. Messages stay short and human-readable;
/// authentication failures never say which check rejected the input.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("key wrap failed")]
    Wrap,

    #[error("key unwrap failed: wrong key or mismatched context")]
    Unwrap,

    #[error("recovery failed: wrong passphrase or corrupted payload")]
    Recovery,
}

/// Failures in the local secure stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("keyring: {0}")]
    Keyring(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}
