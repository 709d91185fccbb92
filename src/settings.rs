//! Runtime settings cache over [`crate::store::SettingRepo`] (spec §2, §3).
//!
//! `security.*` keys carry the agent signing secret, the AES encryption key,
//! the JWT signing secret, and the bcrypt admin password hash. On first boot
//! any of these left empty are filled with freshly generated random values
//! so the control plane never ships with a hardcoded secret.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::SettingRepo;

/// `security.*` keys that must hold a non-empty value after first boot.
const SECURITY_DEFAULTS: &[(&str, &str)] = &[
    ("security.agent_secret", "hex32"),
    ("security.encryption_key", "hex32"),
    ("security.jwt_secret", "hex32"),
    ("security.admin_password", "bcrypt"),
];

/// In-memory mirror of the `settings` table, refreshed on demand. Kept
/// behind an `RwLock` since the admin boundary and scheduler both read it
/// concurrently while config-change handlers write it occasionally.
pub struct SettingsCache {
    repo: SettingRepo,
    cache: RwLock<HashMap<String, String>>,
}

impl SettingsCache {
    /// Load the cache from the database, generating any missing
    /// `security.*` secret on first boot (spec §3: "first boot generates
    /// random secrets for empty-value keys").
    pub async fn load(repo: SettingRepo) -> Result<Arc<Self>> {
        for (key, kind) in SECURITY_DEFAULTS {
            if *kind == "bcrypt" {
                // admin_password starts empty; first-run detection in the
                // admin boundary depends on it staying empty until the
                // operator sets it (spec §4.11).
                repo.ensure_default(key, "", "string", "security", None).await?;
                continue;
            }
            let generated = random_hex32();
            repo.ensure_default(key, &generated, "string", "security", None)
                .await?;
        }

        let rows = repo.list().await?;
        let cache = rows.into_iter().map(|s| (s.key, s.value)).collect();
        Ok(Arc::new(Self {
            repo,
            cache: RwLock::new(cache),
        }))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.cache.read().await.get(key).cloned()
    }

    /// Update a setting in both the database and the in-memory cache.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.repo.set(key, value).await?;
        self.cache.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub async fn agent_secret(&self) -> Vec<u8> {
        self.get("security.agent_secret")
            .await
            .map(|s| s.into_bytes())
            .unwrap_or_default()
    }

    pub async fn encryption_key(&self) -> Result<[u8; 32]> {
        let hex_key = self.get("security.encryption_key").await.unwrap_or_default();
        crate::crypto::aead::key_from_hex(&hex_key)
    }

    /// True until an operator sets `security.admin_password` for the first
    /// time (spec §4.11 first-run detection).
    pub async fn is_first_run(&self) -> bool {
        self.get("security.admin_password")
            .await
            .map(|v| v.is_empty())
            .unwrap_or(true)
    }
}

fn random_hex32() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_generates_security_defaults() {
        let store = crate::store::Store::open_in_memory([1u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let settings = SettingsCache::load(store.settings.clone()).await.unwrap();

        assert!(!settings.agent_secret().await.is_empty());
        assert!(settings.encryption_key().await.is_ok());
        assert!(settings.is_first_run().await);
    }

    #[tokio::test]
    async fn test_set_admin_password_clears_first_run() {
        let store = crate::store::Store::open_in_memory([1u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let settings = SettingsCache::load(store.settings.clone()).await.unwrap();
        settings
            .set("security.admin_password", "$2b$12$examplehash")
            .await
            .unwrap();
        assert!(!settings.is_first_run().await);
    }
}
