//! AES-256-GCM at-rest encryption for DNS provider config and workspace
//! account keys (spec.md §4.1). Nonce is a fresh random 12 bytes prepended
//! to the ciphertext; the combined blob is what gets persisted, optionally
//! base64-encoded by the caller for storage in a text column.

use crate::error::{AcmeError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with `key` (32 bytes). Returns `nonce || ciphertext || tag`.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| AcmeError::crypto("AES-GCM encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`seal`].
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(AcmeError::crypto("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| AcmeError::crypto("AES-GCM decryption failed".to_string()))
}

/// Parse a 32-byte key from a lowercase hex string (the form the
/// `security.encryption_key` setting is stored in).
pub fn key_from_hex(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| AcmeError::crypto(format!("invalid encryption key hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| AcmeError::crypto("encryption key must be exactly 32 bytes".to_string()))
}

/// Seal `plaintext` and base64-encode the result, for storage in a text
/// column (e.g. DnsProvider.config, Workspace.account_key).
pub fn seal_to_string(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    use base64::Engine;
    Ok(base64::engine::general_purpose::STANDARD.encode(seal(key, plaintext)?))
}

/// Inverse of [`seal_to_string`].
pub fn open_from_string(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    let sealed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| AcmeError::crypto(format!("invalid base64 ciphertext: {}", e)))?;
    open(key, &sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = test_key();
        for plaintext in [b"".as_slice(), b"hello".as_slice(), &[0u8; 1024]] {
            let sealed = seal(&key, plaintext).unwrap();
            let opened = open(&key, &sealed).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_open_rejects_short_ciphertext() {
        let key = test_key();
        assert!(open(&key, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let key = test_key();
        let mut sealed = seal(&key, b"secret config").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(open(&key, &sealed).is_err());
    }

    #[test]
    fn test_seal_to_string_round_trip() {
        let key = test_key();
        let encoded = seal_to_string(&key, b"{\"api_token\":\"x\"}").unwrap();
        let decoded = open_from_string(&key, &encoded).unwrap();
        assert_eq!(decoded, b"{\"api_token\":\"x\"}");
    }

    #[test]
    fn test_key_from_hex() {
        let hex_key = "00".repeat(32);
        let key = key_from_hex(&hex_key).unwrap();
        assert_eq!(key, [0u8; 32]);
        assert!(key_from_hex("not-hex").is_err());
        assert!(key_from_hex("00").is_err());
    }
}
