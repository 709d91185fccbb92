/// Account credentials and key pair management.
///
/// The ACME account key is always EC P-256 (spec step 1 of the account
/// provisioning flow in §4.4); leaf certificate keys may vary and are
/// generated separately via `crypto::keypair::KeyPairGenerator`.
use crate::error::Result;
use crate::protocol::jwk::Jwk;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rcgen::KeyPair as RcgenKeyPair;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// KeyPair wrapper around an EC P-256 key (from rcgen)
pub struct KeyPair(pub RcgenKeyPair);

impl KeyPair {
    /// Generate a new EC P-256 account key pair
    pub fn generate() -> Result<Self> {
        let key_pair = RcgenKeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).map_err(|e| {
            crate::error::AcmeError::crypto(format!("Failed to generate key pair: {}", e))
        })?;
        Ok(Self(key_pair))
    }

    /// Create from PEM encoded string
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let key_pair = RcgenKeyPair::from_pem(pem_str)
            .map_err(|e| crate::error::AcmeError::pem(format!("Failed to parse PEM: {}", e)))?;
        Ok(Self(key_pair))
    }

    /// Save key pair to PEM file with mode 0600 (process-global account key,
    /// per spec.md §6 persisted state layout).
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let pem_str = self.0.serialize_pem();
        fs::write(&path, pem_str)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Load key pair from PEM file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_pem(&content)
    }

    /// Serialize to PEM format
    pub fn serialize_pem(&self) -> String {
        self.0.serialize_pem()
    }

    /// Get public key bytes (uncompressed EC point: 0x04 || X || Y)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.0.public_key_raw().to_vec()
    }

    /// Build the JWK representation of this key's public half (EC P-256).
    pub fn jwk(&self) -> Result<Jwk> {
        let raw = self.public_key_bytes();
        if raw.len() != 65 || raw[0] != 0x04 {
            return Err(crate::error::AcmeError::crypto(
                "expected uncompressed P-256 point (65 bytes, 0x04 prefix)".to_string(),
            ));
        }
        let x = URL_SAFE_NO_PAD.encode(&raw[1..33]);
        let y = URL_SAFE_NO_PAD.encode(&raw[33..65]);
        Ok(Jwk::new_ec("P-256", x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair() {
        let keypair = KeyPair::generate();
        assert!(keypair.is_ok());
    }

    #[test]
    fn test_from_pem() {
        let keypair1 = KeyPair::generate().expect("Failed to generate key pair");
        let pem_content = keypair1.serialize_pem();

        let keypair2 = KeyPair::from_pem(&pem_content).expect("Failed to parse from PEM");
        assert_eq!(
            keypair1.serialize_pem(),
            keypair2.serialize_pem(),
            "PEM should match after round trip"
        );
    }
}
