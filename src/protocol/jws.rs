/// JWS (JSON Web Signature) signing for ACME.
///
/// The ACME account key is always EC P-256 (spec.md §4.4 step 1), so this
/// signer produces ES256 signatures exclusively: `rcgen::KeyPair::sign`
/// returns a DER-encoded ECDSA-Sig-Value for EC keys, which is converted to
/// the fixed-width `r || s` encoding JWS requires (RFC 7518 §3.4).
use crate::error::{AcmeError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rcgen::KeyPair;
use serde_json::Value;

/// Field width in bytes of a P-256 coordinate / signature component.
const P256_FIELD_BYTES: usize = 32;

/// JWS Signer for signing ACME requests
pub struct JwsSigner<'a> {
    key_pair: &'a KeyPair,
}

impl<'a> JwsSigner<'a> {
    /// Create a new JWS signer with a KeyPair reference
    pub fn new(key_pair: &'a KeyPair) -> Self {
        Self { key_pair }
    }

    /// Sign a JWS with the given header and payload
    pub fn sign(&self, header: &Value, payload: &Value) -> Result<String> {
        let payload_json = payload.to_string();
        let payload_encoded = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());
        self.sign_encoded_payload(header, &payload_encoded)
    }

    /// Sign empty payload (for some ACME operations, e.g. POST-as-GET)
    pub fn sign_empty(&self, header: &Value) -> Result<String> {
        self.sign_encoded_payload(header, "")
    }

    fn sign_encoded_payload(&self, header: &Value, payload_encoded: &str) -> Result<String> {
        let header_json = header.to_string();
        let header_encoded = URL_SAFE_NO_PAD.encode(header_json.as_bytes());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);
        let der_signature = self
            .key_pair
            .sign(signing_input.as_bytes())
            .map_err(|e| AcmeError::crypto(format!("Failed to sign JWS: {}", e)))?;
        let raw_signature = der_to_raw_ecdsa(&der_signature, P256_FIELD_BYTES)?;
        let signature_encoded = URL_SAFE_NO_PAD.encode(raw_signature);

        Ok(format!(
            "{}.{}.{}",
            header_encoded, payload_encoded, signature_encoded
        ))
    }

    /// Get reference to the key pair
    pub fn key_pair(&self) -> &KeyPair {
        self.key_pair
    }
}

/// Convert a DER-encoded `ECDSA-Sig-Value ::= SEQUENCE { r INTEGER, s INTEGER }`
/// into the fixed-width big-endian `r || s` concatenation JWS expects.
fn der_to_raw_ecdsa(der: &[u8], field_bytes: usize) -> Result<Vec<u8>> {
    let bad = || AcmeError::crypto("malformed DER ECDSA signature".to_string());

    if der.first() != Some(&0x30) {
        return Err(bad());
    }
    let (seq_len, mut pos) = read_der_length(der, 1).ok_or_else(bad)?;
    if pos + seq_len > der.len() {
        return Err(bad());
    }

    let (r, next) = read_der_integer(der, pos).ok_or_else(bad)?;
    pos = next;
    let (s, next) = read_der_integer(der, pos).ok_or_else(bad)?;
    pos = next;
    let _ = pos;

    let mut out = Vec::with_capacity(field_bytes * 2);
    out.extend(left_pad(&r, field_bytes));
    out.extend(left_pad(&s, field_bytes));
    Ok(out)
}

fn read_der_length(buf: &[u8], pos: usize) -> Option<(usize, usize)> {
    let first = *buf.get(pos)?;
    if first & 0x80 == 0 {
        Some((first as usize, pos + 1))
    } else {
        let num_bytes = (first & 0x7f) as usize;
        if num_bytes == 0 || num_bytes > 4 {
            return None;
        }
        let mut len = 0usize;
        for i in 0..num_bytes {
            len = (len << 8) | (*buf.get(pos + 1 + i)? as usize);
        }
        Some((len, pos + 1 + num_bytes))
    }
}

fn read_der_integer(buf: &[u8], pos: usize) -> Option<(Vec<u8>, usize)> {
    if *buf.get(pos)? != 0x02 {
        return None;
    }
    let (len, data_start) = read_der_length(buf, pos + 1)?;
    let data = buf.get(data_start..data_start + len)?;
    // Strip a single leading 0x00 sign-disambiguation byte, if present.
    let trimmed = if data.len() > 1 && data[0] == 0x00 {
        &data[1..]
    } else {
        data
    };
    Some((trimmed.to_vec(), data_start + len))
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    if bytes.len() >= width {
        return bytes[bytes.len() - width..].to_vec();
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec_keypair() -> KeyPair {
        KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
            .expect("Failed to generate EC P-256 key pair")
    }

    #[test]
    fn test_jws_sign() {
        let key_pair = ec_keypair();
        let signer = JwsSigner::new(&key_pair);

        let header = serde_json::json!({
            "alg": "ES256",
            "nonce": "test-nonce",
            "url": "https://example.com/acme/new-account"
        });

        let payload = serde_json::json!({
            "termsOfServiceAgreed": true
        });

        let jws = signer.sign(&header, &payload).expect("Failed to sign JWS");
        let parts: Vec<&str> = jws.split('.').collect();
        assert_eq!(parts.len(), 3, "JWS should have 3 parts");

        for part in &parts {
            let decoded = URL_SAFE_NO_PAD.decode(part);
            assert!(decoded.is_ok(), "JWS part should be valid base64url");
        }

        // ES256 signatures are always 64 raw bytes (two 32-byte coordinates).
        let sig_bytes = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        assert_eq!(sig_bytes.len(), 64);
    }

    #[test]
    fn test_jws_sign_empty() {
        let key_pair = ec_keypair();
        let signer = JwsSigner::new(&key_pair);

        let header = serde_json::json!({
            "alg": "ES256",
            "nonce": "test-nonce",
            "url": "https://example.com/acme/new-nonce"
        });

        let jws = signer
            .sign_empty(&header)
            .expect("Failed to sign empty JWS");
        let parts: Vec<&str> = jws.split('.').collect();
        assert_eq!(parts.len(), 3, "JWS should have 3 parts");
        assert_eq!(parts[1], "", "Payload part should be empty");
    }

    #[test]
    fn test_left_pad() {
        assert_eq!(left_pad(&[1, 2], 4), vec![0, 0, 1, 2]);
        assert_eq!(left_pad(&[1, 2, 3, 4], 4), vec![1, 2, 3, 4]);
    }
}
