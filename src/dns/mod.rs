/// DNS provider implementations and the factory that builds them from a
/// DNS provider record's type tag + decrypted config (spec.md §4.3).
pub mod providers;

use std::sync::Arc;
use std::sync::LazyLock;

use tokio::sync::Mutex;

pub use providers::{
    AlibabaCloudDnsProvider, CloudFlareDnsProvider, GodaddyDnsProvider, Route53Config,
    Route53DnsProvider, TencentCloudDnsProvider,
};

use crate::challenge::DnsProvider;
use crate::error::{AcmeError, Result};

/// Process-wide lock serializing DNS provider construction. Route53's AWS
/// SDK client reads credentials from ambient env vars, so building one
/// provider at a time avoids one workspace's credentials leaking into
/// another's client (spec.md §4.3, §5).
static CONSTRUCTION_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Build a [`DnsProvider`] for the given type tag from its decrypted config
/// JSON. Type tags match the data model's `dns_providers.type` column:
/// `cloudflare`, `alidns`, `tencentcloud` (alias `dnspod`), `route53`,
/// `godaddy`.
pub async fn build_provider(
    type_tag: &str,
    config: &serde_json::Value,
) -> Result<Arc<dyn DnsProvider>> {
    let _guard = CONSTRUCTION_LOCK.lock().await;
    match type_tag {
        "cloudflare" => Ok(Arc::new(CloudFlareDnsProvider::from_config(config)?)),
        "alidns" | "aliyun" => Ok(Arc::new(AlibabaCloudDnsProvider::from_config(config)?)),
        "tencentcloud" | "dnspod" => Ok(Arc::new(TencentCloudDnsProvider::from_config(config)?)),
        "route53" => Ok(Arc::new(Route53DnsProvider::from_config(config).await?)),
        "godaddy" => Ok(Arc::new(GodaddyDnsProvider::from_config(config)?)),
        other => Err(AcmeError::configuration(format!(
            "unknown DNS provider type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_provider_rejects_unknown_type() {
        let result = build_provider("unknown", &serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_provider_cloudflare() {
        let config = serde_json::json!({"api_token": "tok"});
        assert!(build_provider("cloudflare", &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_provider_alidns() {
        let config = serde_json::json!({"access_key_id": "id", "access_key_secret": "secret"});
        assert!(build_provider("alidns", &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_provider_dnspod() {
        let config = serde_json::json!({"api_id": "id", "api_token": "token"});
        assert!(build_provider("dnspod", &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_provider_godaddy() {
        let config = serde_json::json!({"api_key": "k", "api_secret": "s"});
        assert!(build_provider("godaddy", &config).await.is_ok());
    }
}
