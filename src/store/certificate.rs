//! `CertificateRepo`: persistence for [`Certificate`] rows, including the
//! lazy expiry update spec §3 requires ("expires_at <= now() implies
//! eventual status=expired, applied on read").

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::error::{AcmeError, Result};
use crate::store::models::{Certificate, CertificateStatus};

#[derive(Clone)]
pub struct CertificateRepo {
    pool: SqlitePool,
}

fn parse_ts(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(col).map_err(AcmeError::Database)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AcmeError::storage(format!("bad timestamp in {col}: {e}")))
    })
    .transpose()
}

fn row_to_certificate(row: SqliteRow) -> Result<Certificate> {
    let san_json: String = row.try_get("san").map_err(AcmeError::Database)?;
    let san: Vec<String> = serde_json::from_str(&san_json).unwrap_or_default();
    let status_str: String = row.try_get("status").map_err(AcmeError::Database)?;

    Ok(Certificate {
        id: row.try_get("id").map_err(AcmeError::Database)?,
        domain: row.try_get("domain").map_err(AcmeError::Database)?,
        san,
        challenge_type: row.try_get("challenge_type").map_err(AcmeError::Database)?,
        dns_provider_id: row.try_get("dns_provider_id").map_err(AcmeError::Database)?,
        workspace_id: row.try_get("workspace_id").map_err(AcmeError::Database)?,
        cert_pem: row.try_get("cert_pem").map_err(AcmeError::Database)?,
        key_pem: row.try_get("key_pem").map_err(AcmeError::Database)?,
        issuer_pem: row.try_get("issuer_pem").map_err(AcmeError::Database)?,
        fullchain_pem: row.try_get("fullchain_pem").map_err(AcmeError::Database)?,
        fingerprint: row.try_get("fingerprint").map_err(AcmeError::Database)?,
        issued_at: parse_ts(&row, "issued_at")?,
        expires_at: parse_ts(&row, "expires_at")?,
        status: status_str.parse()?,
        renew_fail_count: row.try_get("renew_fail_count").map_err(AcmeError::Database)?,
        next_retry_at: parse_ts(&row, "next_retry_at")?,
        last_renew_attempt: parse_ts(&row, "last_renew_attempt")?,
    })
}

impl CertificateRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending certificate row for a not-yet-issued domain.
    pub async fn create_pending(
        &self,
        domain: &str,
        san: &[String],
        challenge_type: &str,
        dns_provider_id: Option<i64>,
        workspace_id: Option<i64>,
    ) -> Result<i64> {
        let san_json = serde_json::to_string(san)?;
        let id = sqlx::query(
            "INSERT INTO certificates (domain, san, challenge_type, dns_provider_id, workspace_id, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
        )
        .bind(domain)
        .bind(san_json)
        .bind(challenge_type)
        .bind(dns_provider_id)
        .bind(workspace_id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();
        Ok(id)
    }

    /// Fetch one certificate, applying the lazy expiry transition first.
    pub async fn get(&self, id: i64) -> Result<Option<Certificate>> {
        self.expire_if_due(id).await?;
        let row = sqlx::query("SELECT * FROM certificates WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(row_to_certificate).transpose()
    }

    /// List all certificates, applying the lazy expiry transition to each first.
    pub async fn list(&self) -> Result<Vec<Certificate>> {
        self.expire_all_due().await?;
        let rows = sqlx::query("SELECT * FROM certificates ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_certificate).collect()
    }

    /// Candidate selection for the scheduler's renewal sweep (spec §4.5
    /// steps 1-2): certificates within `renew_before_days` of expiry that
    /// aren't already mid-backoff, unioned with certificates whose
    /// `next_retry_at` has passed.
    pub async fn due_for_renewal(&self, now: DateTime<Utc>, renew_before_days: i64) -> Result<Vec<Certificate>> {
        self.expire_all_due().await?;
        let renew_horizon = now + chrono::Duration::days(renew_before_days);
        let rows = sqlx::query(
            "SELECT * FROM certificates
             WHERE (status = 'valid' AND expires_at IS NOT NULL AND expires_at <= ?1
                    AND (renew_fail_count = 0 OR next_retry_at IS NULL))
                OR (next_retry_at IS NOT NULL AND next_retry_at <= ?2)
             ORDER BY id",
        )
        .bind(renew_horizon.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_certificate).collect()
    }

    async fn expire_if_due(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE certificates SET status = 'expired'
             WHERE id = ?1 AND status = 'valid' AND expires_at IS NOT NULL AND expires_at <= ?2",
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    async fn expire_all_due(&self) -> Result<()> {
        sqlx::query(
            "UPDATE certificates SET status = 'expired'
             WHERE status = 'valid' AND expires_at IS NOT NULL AND expires_at <= ?1",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Record a successful issuance/renewal: stores the new material, resets
    /// the failure counter, and clears `next_retry_at` (spec §7).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_issued(
        &self,
        id: i64,
        cert_pem: &[u8],
        key_pem: &[u8],
        issuer_pem: &[u8],
        fullchain_pem: &[u8],
        fingerprint: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE certificates SET
                cert_pem = ?1, key_pem = ?2, issuer_pem = ?3, fullchain_pem = ?4,
                fingerprint = ?5, issued_at = ?6, expires_at = ?7, status = 'valid',
                renew_fail_count = 0, next_retry_at = NULL, last_renew_attempt = ?8
             WHERE id = ?9",
        )
        .bind(cert_pem)
        .bind(key_pem)
        .bind(issuer_pem)
        .bind(fullchain_pem)
        .bind(fingerprint)
        .bind(issued_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Record a failed renewal attempt and compute the next retry time:
    /// `now + min(2^fail_count * 1h, 24h)` (spec §4.4, §8 S2). The certificate
    /// stays `valid` and keeps serving its last-issued material while the
    /// backoff retries.
    pub async fn record_renew_failure(&self, id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT renew_fail_count FROM certificates WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        let fail_count: i64 = row.try_get("renew_fail_count").map_err(AcmeError::Database)?;
        let new_count = fail_count + 1;
        let backoff_hours = if new_count >= 5 {
            24
        } else {
            (1i64 << new_count).min(24)
        };
        let next_retry = Utc::now() + chrono::Duration::hours(backoff_hours);

        sqlx::query(
            "UPDATE certificates SET
                renew_fail_count = ?1, next_retry_at = ?2, last_renew_attempt = ?3
             WHERE id = ?4",
        )
        .bind(new_count)
        .bind(next_retry.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(new_count)
    }

    /// Delete a certificate, refused if any agent binding still references it
    /// (spec §3 invariant).
    pub async fn delete(&self, id: i64) -> Result<()> {
        let bound: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agent_certs WHERE certificate_id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        if bound > 0 {
            return Err(AcmeError::invalid_input(
                "cannot delete a certificate that is still bound to an agent".to_string(),
            ));
        }
        sqlx::query("DELETE FROM certificates WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_formula_matches_spec_bounds() {
        // next_retry_at = now + min(2^fail_count * 1h, 24h); after 3 failures
        // that's 2^3=8h, comfortably under the 24h cap (spec §8 S2).
        let backoff = |n: i64| if n >= 5 { 24 } else { (1i64 << n).min(24) };
        assert_eq!(backoff(3), 8);
        assert_eq!(backoff(10), 24);
    }
}
