//! Process-level configuration for the control-plane binary (spec §2).
//!
//! Runtime settings that an operator changes through the admin surface
//! (renew-before-days, notification channels, DNS providers, ...) live in
//! the `settings` table behind [`crate::settings::SettingsCache`], not
//! here. This module only covers what must be known before the database
//! can even be opened: where the database file lives, what addresses to
//! bind, and the default cron schedule. TOML file plus env-var overrides.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AcmeError, Result};

/// Top-level process configuration, loadable from a TOML file with
/// environment variable overrides (spec §2 ambient config layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("letsync.db")
}

/// Addresses the control plane binds to (spec §4.6, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Agent control plane + task-log SSE bridge (spec §4.7, §4.6).
    #[serde(default = "default_agent_listen")]
    pub agent_listen: SocketAddr,

    /// HTTP-01 challenge responder, used by the ACME engine (spec §4.4).
    #[serde(default = "default_http01_listen")]
    pub http01_listen: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            agent_listen: default_agent_listen(),
            http01_listen: default_http01_listen(),
        }
    }
}

fn default_agent_listen() -> SocketAddr {
    "0.0.0.0:8443".parse().expect("valid default socket address")
}

fn default_http01_listen() -> SocketAddr {
    "0.0.0.0:80".parse().expect("valid default socket address")
}

/// Defaults for the cron-driven renewal sweep (spec §4.5); both are
/// overridable at runtime via the `settings` table once the store is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_cron")]
    pub cron: String,

    #[serde(default = "default_renew_before_days")]
    pub renew_before_days: i64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            renew_before_days: default_renew_before_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_cron() -> String {
    "0 3 * * *".to_string()
}

fn default_renew_before_days() -> i64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            server: ServerSettings::default(),
            scheduler: SchedulerSettings::default(),
            log_level: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AcmeError::configuration(format!("failed to read config file: {e}")))?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AcmeError::configuration(format!("failed to parse TOML: {e}")))
    }

    /// Overlay `LETSYNC_*` environment variables on top of whatever the
    /// config file set (spec §2: env overrides take precedence).
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var("LETSYNC_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(addr) = env::var("LETSYNC_AGENT_LISTEN") {
            self.server.agent_listen = addr
                .parse()
                .map_err(|e| AcmeError::configuration(format!("invalid LETSYNC_AGENT_LISTEN: {e}")))?;
        }
        if let Ok(addr) = env::var("LETSYNC_HTTP01_LISTEN") {
            self.server.http01_listen = addr
                .parse()
                .map_err(|e| AcmeError::configuration(format!("invalid LETSYNC_HTTP01_LISTEN: {e}")))?;
        }
        if let Ok(cron) = env::var("LETSYNC_SCHEDULER_CRON") {
            self.scheduler.cron = cron;
        }
        if let Ok(days) = env::var("LETSYNC_RENEW_BEFORE_DAYS")
            && let Ok(days) = days.parse()
        {
            self.scheduler.renew_before_days = days;
        }
        if let Ok(level) = env::var("LETSYNC_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("letsync.db"));
        assert_eq!(config.scheduler.cron, "0 3 * * *");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[database]
path = "/var/lib/letsync/letsync.db"

[scheduler]
cron = "0 4 * * *"
renew_before_days = 14
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/letsync/letsync.db"));
        assert_eq!(config.scheduler.cron, "0 4 * * *");
        assert_eq!(config.scheduler.renew_before_days, 14);
    }

    #[test]
    fn test_env_override_takes_precedence() {
        temp_env::with_var("LETSYNC_SCHEDULER_CRON", Some("*/5 * * * *"), || {
            let mut config = Config::default();
            config.apply_env_overrides().unwrap();
            assert_eq!(config.scheduler.cron, "*/5 * * * *");
        });
    }
}
