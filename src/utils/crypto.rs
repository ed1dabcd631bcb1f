//! At-rest encryption for the stored credential blob.
//!
//! AES-256-GCM with a random 12-byte nonce prepended to the ciphertext, the
//! whole thing base64 encoded. The key lives in the same preferences file as
//! the data, so this only keeps the blob from casual inspection.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::{Error, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

fn cipher_from(key_b64: &str) -> Result<Aes256Gcm> {
    let key = STANDARD.decode(key_b64.trim())?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| Error::Crypto(format!("expected a {}-byte key, got {}", KEY_LEN, key.len())))
}

pub fn encrypt(plain: &str, key_b64: &str) -> Result<String> {
    let cipher = cipher_from(key_b64)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plain.as_bytes())
        .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

    let mut out = nonce_bytes.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

pub fn decrypt(encoded: &str, key_b64: &str) -> Result<String> {
    let cipher = cipher_from(key_b64)?;
    let data = STANDARD.decode(encoded.trim())?;
    if data.len() <= NONCE_LEN {
        return Err(Error::Crypto("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| Error::Crypto(format!("decryption failed: {}", e)))?;

    String::from_utf8(plain).map_err(|e| Error::Crypto(format!("decrypted data is not UTF-8: {}", e)))
}
