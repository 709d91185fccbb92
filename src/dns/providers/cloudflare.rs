/// CloudFlare DNS provider
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::challenge::DnsProvider;
use crate::error::{AcmeError, Result};

/// CloudFlare DNS provider configuration. Accepts either `api_token` or the
/// legacy `api_key` + `email` pair (spec.md §4.3 config table); `zone_id` is
/// optional and resolved on first use if absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudFlareConfig {
    pub api_token: Option<String>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
}

/// CloudFlare DNS provider
pub struct CloudFlareDnsProvider {
    config: CloudFlareConfig,
    http_client: reqwest::Client,
}

impl CloudFlareDnsProvider {
    pub fn new(config: CloudFlareConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from decrypted provider config JSON (spec.md §4.3 DI construction).
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let config: CloudFlareConfig = serde_json::from_value(config.clone())
            .map_err(|e| AcmeError::configuration(format!("invalid cloudflare config: {e}")))?;
        if config.api_token.is_none() && (config.api_key.is_none() || config.email.is_none()) {
            return Err(AcmeError::configuration(
                "cloudflare requires either api_token or api_key+email",
            ));
        }
        Ok(Self::new(config))
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.config.api_token {
            builder.bearer_auth(token)
        } else {
            builder
                .header("X-Auth-Email", self.config.email.clone().unwrap_or_default())
                .header("X-Auth-Key", self.config.api_key.clone().unwrap_or_default())
        }
    }

    /// Resolve the zone owning `domain` when `zone_id` wasn't configured
    /// explicitly, by matching the longest registrable suffix.
    async fn zone_id_for(&self, domain: &str) -> Result<String> {
        if let Some(zone_id) = &self.config.zone_id {
            return Ok(zone_id.clone());
        }
        let labels: Vec<&str> = domain.trim_start_matches("_acme-challenge.").split('.').collect();
        for start in 0..labels.len().saturating_sub(1) {
            let candidate = labels[start..].join(".");
            let url = format!("https://api.cloudflare.com/client/v4/zones?name={candidate}");
            let response = self
                .apply_auth(self.http_client.get(&url))
                .send()
                .await
                .map_err(|e| AcmeError::transport(format!("CloudFlare zone lookup failed: {e}")))?;
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| AcmeError::storage(format!("CloudFlare zone response parse failed: {e}")))?;
            if let Some(id) = body["result"][0]["id"].as_str() {
                return Ok(id.to_string());
            }
        }
        Err(AcmeError::configuration(format!(
            "no CloudFlare zone found owning {domain}"
        )))
    }
}

#[derive(Debug, Serialize)]
struct CloudFlareRecordCreateRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct CloudFlareRecordResponse {
    result: CloudFlareRecordResult,
}

#[derive(Debug, Deserialize)]
struct CloudFlareRecordResult {
    id: String,
}

#[async_trait]
impl DnsProvider for CloudFlareDnsProvider {
    fn type_tag(&self) -> &'static str {
        "cloudflare"
    }

    async fn create_txt_record(&self, domain: &str, value: &str) -> Result<String> {
        let zone_id = self.zone_id_for(domain).await?;
        let url = format!("https://api.cloudflare.com/client/v4/zones/{zone_id}/dns_records");

        let payload = CloudFlareRecordCreateRequest {
            r#type: "TXT",
            name: domain,
            content: value,
            ttl: 60,
        };

        let response = self
            .apply_auth(self.http_client.post(url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("CloudFlare create record failed: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AcmeError::storage(format!(
                "CloudFlare create record failed: {}",
                text
            )));
        }

        let body: CloudFlareRecordResponse = response
            .json()
            .await
            .map_err(|e| AcmeError::storage(format!("CloudFlare parse response failed: {}", e)))?;

        Ok(body.result.id)
    }

    async fn delete_txt_record(&self, domain: &str, record_id: &str) -> Result<()> {
        let zone_id = self.zone_id_for(domain).await?;
        let url = format!("https://api.cloudflare.com/client/v4/zones/{zone_id}/dns_records/{record_id}");

        let response = self
            .apply_auth(self.http_client.delete(url))
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("CloudFlare delete record failed: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AcmeError::storage(format!(
                "CloudFlare delete record failed: {}",
                text
            )));
        }

        Ok(())
    }

    async fn verify_record(&self, domain: &str, value: &str) -> Result<bool> {
        let zone_id = self.zone_id_for(domain).await?;
        let url = format!(
            "https://api.cloudflare.com/client/v4/zones/{zone_id}/dns_records?type=TXT&name={domain}"
        );

        let response = self
            .apply_auth(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("CloudFlare verify record failed: {}", e)))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let text = response.text().await.unwrap_or_default();
        Ok(text.contains(value))
    }
}

/// Pre-flight cleanup: list every `_acme-challenge.<domain>` TXT record in
/// the owning zone and delete it (spec.md §4.3). Failures here are warnings,
/// never fatal — the subsequent ACME run is the source of truth.
pub async fn preflight_cleanup(provider: &CloudFlareDnsProvider, domains: &[String]) {
    for domain in domains {
        let challenge_name = format!("_acme-challenge.{domain}");
        let zone_id = match provider.zone_id_for(&challenge_name).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("CloudFlare pre-flight: zone lookup failed for {domain}: {e}");
                continue;
            }
        };
        let url = format!(
            "https://api.cloudflare.com/client/v4/zones/{zone_id}/dns_records?type=TXT&name={challenge_name}"
        );
        let response = match provider.apply_auth(provider.http_client.get(&url)).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("CloudFlare pre-flight list failed for {domain}: {e}");
                continue;
            }
        };
        let body: serde_json::Value = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("CloudFlare pre-flight parse failed for {domain}: {e}");
                continue;
            }
        };
        if let Some(records) = body["result"].as_array() {
            for record in records {
                if let Some(id) = record["id"].as_str()
                    && let Err(e) = provider.delete_txt_record(&challenge_name, id).await
                {
                    tracing::warn!("CloudFlare pre-flight delete failed for {domain}: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_credentials() {
        let config = serde_json::json!({"zone_id": "z1"});
        assert!(CloudFlareDnsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_accepts_api_token() {
        let config = serde_json::json!({"api_token": "tok", "zone_id": "z1"});
        assert!(CloudFlareDnsProvider::from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_accepts_key_and_email() {
        let config = serde_json::json!({"api_key": "k", "email": "a@b.com"});
        assert!(CloudFlareDnsProvider::from_config(&config).is_ok());
    }
}
