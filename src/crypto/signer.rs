//! HMAC signing — used for the agent uuid/signature mutual-recognition
//! scheme (spec.md §3 Agent, §4.7) via a single process-wide secret.

use crate::error::{AcmeError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A computed signature, independent of the algorithm that produced it.
#[derive(Debug, Clone)]
pub struct Signature {
    pub data: Vec<u8>,
    pub algorithm: String,
}

impl Signature {
    pub fn new(data: Vec<u8>, algorithm: String) -> Self {
        Self { data, algorithm }
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&self.data)
    }

    /// Lowercase hex encoding, the form spec.md's Agent.signature uses.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}

/// Unified signing interface.
pub trait Signer: Send + Sync {
    fn sign(&self, data: &[u8]) -> Result<Signature>;
    fn algorithm(&self) -> &str;
    fn verify(&self, _data: &[u8], _signature: &[u8]) -> Result<bool> {
        Ok(false)
    }
}

/// HMAC-SHA256 signer over a shared secret key.
pub struct HmacSigner {
    key: Vec<u8>,
    algorithm: String,
}

impl HmacSigner {
    pub fn new(key: Vec<u8>, algorithm: String) -> Self {
        Self { key, algorithm }
    }

    pub fn sha256(key: Vec<u8>) -> Self {
        Self::new(key, "HMAC-SHA256".to_string())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AcmeError::crypto(format!("invalid HMAC key: {}", e)))
    }
}

impl Signer for HmacSigner {
    fn sign(&self, data: &[u8]) -> Result<Signature> {
        let mut mac = self.mac()?;
        mac.update(data);
        let tag = mac.finalize().into_bytes().to_vec();
        Ok(Signature::new(tag, self.algorithm.clone()))
    }

    fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Constant-time verification via `Mac::verify_slice` — never
    /// short-circuits on the first mismatched byte (spec.md §8 property 4).
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.verify_slice(signature).is_ok())
    }
}

/// Sign `uuid` with the process-wide agent secret and return lowercase hex,
/// matching spec.md §3's `Agent.signature = HMAC-SHA256(uuid, agent_secret)`.
pub fn sign_agent_uuid(uuid: &str, secret: &[u8]) -> Result<String> {
    let signer = HmacSigner::sha256(secret.to_vec());
    Ok(signer.sign(uuid.as_bytes())?.to_hex())
}

/// Verify an agent's claimed `(uuid, signature)` pair in constant time.
pub fn verify_agent_signature(uuid: &str, signature_hex: &str, secret: &[u8]) -> Result<bool> {
    let Ok(signature) = hex::decode(signature_hex) else {
        return Ok(false);
    };
    let signer = HmacSigner::sha256(secret.to_vec());
    signer.verify(uuid.as_bytes(), &signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_base64() {
        let sig = Signature::new(vec![1, 2, 3, 4], "test".to_string());
        assert!(!sig.to_base64().is_empty());
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let secret = b"process-wide-agent-secret".to_vec();
        let signer = HmacSigner::sha256(secret);
        let sig = signer.sign(b"some-uuid").unwrap();
        assert!(signer.verify(b"some-uuid", &sig.data).unwrap());
        assert!(!signer.verify(b"other-uuid", &sig.data).unwrap());
    }

    #[test]
    fn test_agent_signature_roundtrip() {
        let secret = b"shared-secret".to_vec();
        let uuid = "11111111-1111-4111-8111-111111111111";
        let sig = sign_agent_uuid(uuid, &secret).unwrap();
        assert!(verify_agent_signature(uuid, &sig, &secret).unwrap());
        assert!(!verify_agent_signature("other-uuid", &sig, &secret).unwrap());
    }

    #[test]
    fn test_regenerate_invalidates_old_signature() {
        let secret = b"shared-secret".to_vec();
        let old_uuid = "11111111-1111-4111-8111-111111111111";
        let new_uuid = "22222222-2222-4222-8222-222222222222";
        let old_sig = sign_agent_uuid(old_uuid, &secret).unwrap();
        let new_sig = sign_agent_uuid(new_uuid, &secret).unwrap();

        assert!(verify_agent_signature(old_uuid, &old_sig, &secret).unwrap());
        assert!(!verify_agent_signature(new_uuid, &old_sig, &secret).unwrap());
        assert!(verify_agent_signature(new_uuid, &new_sig, &secret).unwrap());
    }
}
