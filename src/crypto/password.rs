//! bcrypt hashing for the admin password (spec.md §4.1, §4.11).

use crate::error::{AcmeError, Result};

/// Default bcrypt cost factor, overridable via settings (spec.md §4.11).
pub const DEFAULT_COST: u32 = 12;

/// Hash a plaintext password at the given cost.
pub fn hash(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| AcmeError::crypto(format!("bcrypt hash failed: {}", e)))
}

/// Compare a plaintext password against a stored bcrypt hash.
pub fn verify(password: &str, hashed: &str) -> Result<bool> {
    bcrypt::verify(password, hashed)
        .map_err(|e| AcmeError::crypto(format!("bcrypt verify failed: {}", e)))
}

/// Password complexity policy (spec.md §4.11: min length, independent
/// upper/lower/digit/special requirements).
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    /// Returns `Ok(())` if `password` satisfies the policy, otherwise an
    /// `AcmeError::invalid_input` describing the first failed rule.
    pub fn check(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(AcmeError::invalid_input(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if self.require_upper && !password.chars().any(|c| c.is_uppercase()) {
            return Err(AcmeError::invalid_input(
                "password must contain an uppercase letter".to_string(),
            ));
        }
        if self.require_lower && !password.chars().any(|c| c.is_lowercase()) {
            return Err(AcmeError::invalid_input(
                "password must contain a lowercase letter".to_string(),
            ));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AcmeError::invalid_input(
                "password must contain a digit".to_string(),
            ));
        }
        if self.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(AcmeError::invalid_input(
                "password must contain a special character".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash("correct horse battery staple", 4).unwrap();
        assert!(verify("correct horse battery staple", &hashed).unwrap());
        assert!(!verify("wrong password", &hashed).unwrap());
    }

    #[test]
    fn test_policy_rejects_weak_passwords() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("short1A").is_err());
        assert!(policy.check("nouppercase1").is_err());
        assert!(policy.check("NOLOWERCASE1").is_err());
        assert!(policy.check("NoDigitsHere").is_err());
        assert!(policy.check("GoodPass1").is_ok());
    }
}
