//! Primitive adapter over the platform crypto crates.
//!
//! AEAD is XChaCha20-Poly1305 (32-byte key, random 24-byte nonce, 16-byte
//! tag). The combined wire format prepends the nonce:
//!   [ nonce (24 bytes) | ciphertext + tag ]
//! The detached variants carry the nonce separately, for records that store
//! it as its own field. Passphrase keys come from Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const SALT_LEN: usize = 16;

/// Argon2id parameters, tuned for interactive use.
pub const KDF_MEMORY_COST: u32 = 64 * 1024; // 64 MiB
pub const KDF_TIME_COST: u32 = 3;
pub const KDF_PARALLELISM: u32 = 1;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    random_bytes()
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    random_bytes()
}

/// Encrypt `plaintext`, prepending a fresh random nonce.
pub fn aead_encrypt(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let nonce = generate_nonce();
    let ciphertext = aead_encrypt_with_nonce(key, &nonce, plaintext, aad)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt combined wire-format bytes (nonce || ciphertext+tag).
pub fn aead_decrypt(
    key: &[u8; KEY_LEN],
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Unwrap);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    aead_decrypt_detached(key, nonce, ciphertext, aad)
}

/// Encrypt with a fresh nonce, returning ciphertext and nonce separately.
pub fn aead_encrypt_detached(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
    let nonce = generate_nonce();
    let ciphertext = aead_encrypt_with_nonce(key, &nonce, plaintext, aad)?;
    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext whose nonce is carried out of band.
pub fn aead_decrypt_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Unwrap);
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::Unwrap)?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Unwrap)?;
    Ok(Zeroizing::new(plaintext))
}

/// Derive a 32-byte passphrase key with Argon2id and the stored salt.
pub fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(
        KDF_MEMORY_COST,
        KDF_TIME_COST,
        KDF_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

fn aead_encrypt_with_nonce(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::Wrap)?;
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Wrap)
}
