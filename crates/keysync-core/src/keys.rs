//! Key hierarchy manager.
//!
//! The User Master Key (UMK) is the only secret that ever exists as raw
//! bytes, and only in volatile memory. On disk and on the wire it appears
//! exclusively wrapped: under a per-device local KEK (AAD-bound to the owning
//! user id) or under a passphrase-derived key inside a recovery payload.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::crypto::{
    self, aead_decrypt, aead_decrypt_detached, aead_encrypt, aead_encrypt_detached,
    derive_passphrase_key, KEY_LEN, NONCE_LEN,
};
use crate::error::CryptoError;

/// 32-byte User Master Key. Zeroized on drop; no byte accessor is exposed
/// outside this module, so the key can only be used through wrap/unwrap and
/// the message seal/open operations.
#[derive(ZeroizeOnDrop)]
pub struct UserMasterKey([u8; KEY_LEN]);

impl UserMasterKey {
    /// Generate a fresh UMK from the OS RNG.
    pub fn generate() -> Self {
        Self(crypto::random_bytes())
    }

    /// Encrypt message content under this key, AAD-bound to `aad` (the user
    /// id). Returns ciphertext and the fresh nonce separately.
    pub fn seal_detached(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
        aead_encrypt_detached(&self.0, plaintext, aad)
    }

    /// Decrypt message content produced by [`Self::seal_detached`].
    pub fn open_detached(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(aead_decrypt_detached(&self.0, nonce, ciphertext, aad)?.to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::Unwrap)?;
        Ok(Self(bytes))
    }
}

impl PartialEq for UserMasterKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for UserMasterKey {}

impl std::fmt::Debug for UserMasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserMasterKey(..)")
    }
}

/// Per-device key-encryption key. The handle never exposes its bytes; only
/// the KEK vault (same crate) can serialize it into the OS keychain.
#[derive(ZeroizeOnDrop)]
pub struct LocalKek([u8; KEY_LEN]);

impl LocalKek {
    /// Generate a fresh local KEK.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(crypto::random_bytes()))
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for LocalKek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LocalKek(..)")
    }
}

/// Wrap the UMK under a local KEK, binding the ciphertext to `user_id`.
/// Returns base64(nonce || ciphertext+tag).
pub fn wrap_umk(umk: &UserMasterKey, kek: &LocalKek, user_id: &str) -> Result<String, CryptoError> {
    let sealed = aead_encrypt(kek.expose(), &umk.0, user_id.as_bytes())?;
    Ok(general_purpose::STANDARD.encode(sealed))
}

/// Inverse of [`wrap_umk`]. Fails with [`CryptoError::Unwrap`] on any
/// authentication failure, including an AAD (user id) mismatch.
pub fn unwrap_umk(
    wrapped: &str,
    kek: &LocalKek,
    user_id: &str,
) -> Result<UserMasterKey, CryptoError> {
    let sealed = general_purpose::STANDARD
        .decode(wrapped)
        .map_err(|_| CryptoError::Unwrap)?;
    let plaintext = aead_decrypt(kek.expose(), &sealed, user_id.as_bytes())?;
    UserMasterKey::from_bytes(&plaintext)
}

/// Passphrase-derived recovery envelope for the UMK. Salt and nonce are
/// single-use, generated fresh per payload; the passphrase itself is never
/// stored or transmitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryPayload {
    pub wrapped_umk: String,
    pub salt: String,
    pub nonce: String,
}

impl RecoveryPayload {
    /// Encrypt the UMK under a key derived from `passphrase`.
    pub fn create(passphrase: &str, umk: &UserMasterKey) -> Result<Self, CryptoError> {
        let salt = crypto::generate_salt();
        let key = derive_passphrase_key(passphrase, &salt)?;
        let (ciphertext, nonce) = aead_encrypt_detached(&key, &umk.0, &[])?;
        Ok(Self {
            wrapped_umk: general_purpose::STANDARD.encode(ciphertext),
            salt: general_purpose::STANDARD.encode(salt),
            nonce: general_purpose::STANDARD.encode(nonce),
        })
    }

    /// Re-derive the passphrase key and decrypt. A wrong passphrase and a
    /// corrupted payload fail identically.
    pub fn recover(&self, passphrase: &str) -> Result<UserMasterKey, CryptoError> {
        let salt = general_purpose::STANDARD
            .decode(&self.salt)
            .map_err(|_| CryptoError::Recovery)?;
        let nonce = general_purpose::STANDARD
            .decode(&self.nonce)
            .map_err(|_| CryptoError::Recovery)?;
        let ciphertext = general_purpose::STANDARD
            .decode(&self.wrapped_umk)
            .map_err(|_| CryptoError::Recovery)?;
        let key = derive_passphrase_key(passphrase, &salt)?;
        let plaintext = aead_decrypt_detached(&key, &nonce, &ciphertext, &[])
            .map_err(|_| CryptoError::Recovery)?;
        UserMasterKey::from_bytes(&plaintext).map_err(|_| CryptoError::Recovery)
    }
}
