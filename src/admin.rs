//! Admin boundary (spec §4.11): only the contracts the core consumes.
//! Full CRUD, the web UI, and generic login HTTP handlers live outside this
//! crate; this module provides password verification, a sliding-window
//! login lockout tracker, and JWT-shaped session token issuance, built from
//! small single-purpose security primitives (`crypto::password`,
//! `crypto::signer`) rather than a general-purpose rate limiter.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::crypto::password::PasswordPolicy;
use crate::error::{AcmeError, Result};
use crate::settings::SettingsCache;

/// Failed attempts within this window trigger a lockout (spec §4.11).
const LOCKOUT_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Attempts allowed within the window before locking out.
const LOCKOUT_THRESHOLD: usize = 5;
/// How long an IP stays locked out once the threshold is crossed.
const LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);

/// Tracks failed login attempts per client IP with a fixed sliding window,
/// intentionally simpler than a general-purpose multi-tier rate limiter
/// (spec §4.11: "a simple fixed-window counter").
pub struct LoginLockout {
    attempts: RwLock<HashMap<IpAddr, Vec<Instant>>>,
}

impl LoginLockout {
    pub fn new() -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns an error if `ip` is currently locked out.
    pub async fn check(&self, ip: IpAddr) -> Result<()> {
        let attempts = self.attempts.read().await;
        if let Some(history) = attempts.get(&ip) {
            let now = Instant::now();
            let recent = history
                .iter()
                .filter(|t| now.duration_since(**t) < LOCKOUT_DURATION)
                .count();
            if recent >= LOCKOUT_THRESHOLD {
                return Err(AcmeError::too_many_attempts(format!(
                    "too many failed login attempts from {ip}, try again later"
                )));
            }
        }
        Ok(())
    }

    /// Record a failed attempt, pruning entries outside the sliding window.
    pub async fn record_failure(&self, ip: IpAddr) {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        let history = attempts.entry(ip).or_default();
        history.retain(|t| now.duration_since(*t) < LOCKOUT_DURATION.max(LOCKOUT_WINDOW));
        history.push(now);
    }

    /// Clear an IP's failure history after a successful login.
    pub async fn record_success(&self, ip: IpAddr) {
        self.attempts.write().await.remove(&ip);
    }
}

impl Default for LoginLockout {
    fn default() -> Self {
        Self::new()
    }
}

/// A JWT-shaped session token: header/payload/signature joined with `.`,
/// base64url-encoded, HMAC-SHA256 signed with `security.jwt_secret`
/// (spec §4.11). Not a general JWT implementation — just enough structure
/// for the admin surface's own verifier to check.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    sub: &'static str,
    iat: i64,
    exp: i64,
}

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign(secret: &[u8], signing_input: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| AcmeError::crypto(format!("invalid jwt secret: {e}")))?;
    mac.update(signing_input.as_bytes());
    Ok(b64(&mac.finalize().into_bytes()))
}

/// Issue a session token valid for `jwt_expires_hours` hours.
pub fn issue_session_token(jwt_secret: &[u8], jwt_expires_hours: i64) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims {
        sub: "admin",
        iat: now,
        exp: now + jwt_expires_hours * 3600,
    };
    let payload = serde_json::to_vec(&claims)?;

    let signing_input = format!("{}.{}", b64(TOKEN_HEADER.as_bytes()), b64(&payload));
    let signature = sign(jwt_secret, &signing_input)?;
    Ok(format!("{signing_input}.{signature}"))
}

/// Verify a session token's signature and expiry.
pub fn verify_session_token(jwt_secret: &[u8], token: &str) -> Result<()> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(AcmeError::unauthorized("malformed session token"));
    };
    if parts.next().is_some() {
        return Err(AcmeError::unauthorized("malformed session token"));
    }

    let signing_input = format!("{header_b64}.{payload_b64}");
    let expected_signature = sign(jwt_secret, &signing_input)?;
    if expected_signature != signature_b64 {
        return Err(AcmeError::unauthorized("session token signature mismatch"));
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AcmeError::unauthorized("malformed session token payload"))?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload_bytes).map_err(|_| AcmeError::unauthorized("malformed session token payload"))?;

    if chrono::Utc::now().timestamp() > claims.exp {
        return Err(AcmeError::unauthorized("session token expired"));
    }
    Ok(())
}

/// Whether the admin surface is in its pre-setup state (spec §4.11:
/// `security.admin_password == ""`).
pub async fn is_first_run(settings: &SettingsCache) -> bool {
    settings.is_first_run().await
}

/// Attempt a login: checks the lockout window, verifies the password
/// against the stored bcrypt hash, and on success issues a session token.
/// On failure, records the attempt against `client_ip` (spec §4.11).
pub async fn login(
    settings: &SettingsCache,
    lockout: &LoginLockout,
    client_ip: IpAddr,
    password: &str,
    jwt_expires_hours: i64,
) -> Result<String> {
    lockout.check(client_ip).await?;

    let stored_hash = settings.get("security.admin_password").await.unwrap_or_default();
    let matches = !stored_hash.is_empty() && crate::crypto::password::verify(password, &stored_hash)?;
    if !matches {
        lockout.record_failure(client_ip).await;
        return Err(AcmeError::unauthorized("invalid password"));
    }

    lockout.record_success(client_ip).await;
    let jwt_secret = settings.get("security.jwt_secret").await.unwrap_or_default();
    issue_session_token(jwt_secret.as_bytes(), jwt_expires_hours)
}

/// Set the admin password for the first time, after checking it against
/// the complexity policy (spec §4.11 first-run flow).
pub async fn set_initial_password(settings: &SettingsCache, policy: &PasswordPolicy, password: &str) -> Result<()> {
    if !is_first_run(settings).await {
        return Err(AcmeError::invalid_input("admin password has already been set"));
    }
    policy.check(password)?;
    let hashed = crate::crypto::password::hash(password, crate::crypto::password::DEFAULT_COST)?;
    settings.set("security.admin_password", &hashed).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_lockout_allows_attempts_under_threshold() {
        let lockout = LoginLockout::new();
        for _ in 0..LOCKOUT_THRESHOLD - 1 {
            lockout.record_failure(local_ip()).await;
        }
        assert!(lockout.check(local_ip()).await.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_blocks_after_threshold() {
        let lockout = LoginLockout::new();
        for _ in 0..LOCKOUT_THRESHOLD {
            lockout.record_failure(local_ip()).await;
        }
        assert!(lockout.check(local_ip()).await.is_err());
    }

    #[tokio::test]
    async fn test_lockout_resets_on_success() {
        let lockout = LoginLockout::new();
        for _ in 0..LOCKOUT_THRESHOLD {
            lockout.record_failure(local_ip()).await;
        }
        lockout.record_success(local_ip()).await;
        assert!(lockout.check(local_ip()).await.is_ok());
    }

    #[test]
    fn test_session_token_round_trips() {
        let secret = b"test-jwt-secret";
        let token = issue_session_token(secret, 1).unwrap();
        assert!(verify_session_token(secret, &token).is_ok());
    }

    #[test]
    fn test_session_token_rejects_tampered_signature() {
        let secret = b"test-jwt-secret";
        let token = issue_session_token(secret, 1).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_session_token(secret, &tampered).is_err());
    }

    #[test]
    fn test_session_token_rejects_wrong_secret() {
        let token = issue_session_token(b"secret-a", 1).unwrap();
        assert!(verify_session_token(b"secret-b", &token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let secret = b"test-jwt-secret";
        let token = issue_session_token(secret, -1).unwrap();
        assert!(verify_session_token(secret, &token).is_err());
    }

    #[tokio::test]
    async fn test_first_run_and_password_setup() {
        let store = crate::store::Store::open_in_memory([4u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let settings = SettingsCache::load(store.settings.clone()).await.unwrap();
        assert!(is_first_run(&settings).await);

        let policy = PasswordPolicy::default();
        set_initial_password(&settings, &policy, "Sup3rSecret!").await.unwrap();
        assert!(!is_first_run(&settings).await);

        assert!(set_initial_password(&settings, &policy, "Another1Pass!").await.is_err());
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_is_rejected() {
        let store = crate::store::Store::open_in_memory([4u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let settings = SettingsCache::load(store.settings.clone()).await.unwrap();
        let policy = PasswordPolicy::default();
        set_initial_password(&settings, &policy, "Sup3rSecret!").await.unwrap();

        let lockout = LoginLockout::new();
        let result = login(&settings, &lockout, local_ip(), "wrong-password", 12).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_login_with_correct_password_issues_token() {
        let store = crate::store::Store::open_in_memory([4u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let settings = SettingsCache::load(store.settings.clone()).await.unwrap();
        let policy = PasswordPolicy::default();
        set_initial_password(&settings, &policy, "Sup3rSecret!").await.unwrap();

        let lockout = LoginLockout::new();
        let token = login(&settings, &lockout, local_ip(), "Sup3rSecret!", 12).await.unwrap();
        let jwt_secret = settings.get("security.jwt_secret").await.unwrap();
        assert!(verify_session_token(jwt_secret.as_bytes(), &token).is_ok());
    }
}
