//! Configuration loading for the BASTION CLI.

use anyhow::{Context, Result};
use bastion_connectors::{
    AuthConfig, CalderaConfig, ConnectorConfig, SecureString, WazuhIndexerConfig,
    WazuhManagerConfig,
};
use bastion_core::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Wazuh indexer (alert search).
    #[serde(default)]
    pub indexer: IndexerSettings,

    /// Wazuh manager (health and authentication).
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Caldera server.
    #[serde(default)]
    pub caldera: CalderaSettings,

    /// Correlation tuning.
    #[serde(default)]
    pub correlation: CorrelationSettings,

    /// HTTP server.
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("WAZUH_MANAGER_URL") {
            self.manager.url = url;
        }
        if let Some(url) = get("WAZUH_INDEXER_URL") {
            self.indexer.url = url;
        }
        if let Some(user) = get("WAZUH_USERNAME") {
            self.manager.username = user;
        }
        if let Some(password) = get("WAZUH_PASSWORD") {
            self.manager.password = password.into();
        }
        if let Some(user) = get("WAZUH_INDEXER_USERNAME") {
            self.indexer.username = user;
        }
        if let Some(password) = get("WAZUH_INDEXER_PASSWORD") {
            self.indexer.password = password.into();
        }
        if let Some(verify) = get("WAZUH_VERIFY_SSL") {
            let verify = matches!(verify.to_lowercase().as_str(), "1" | "true" | "yes");
            self.indexer.verify_ssl = verify;
            self.manager.verify_ssl = verify;
        }
        if let Some(url) = get("CALDERA_URL") {
            self.caldera.url = url;
        }
        if let Some(key) = get("CALDERA_API_KEY") {
            self.caldera.api_key = key.into();
        }
        if let Some(port) = get("BASTION_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        self
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();

        for secret in [
            &mut config.indexer.password,
            &mut config.manager.password,
            &mut config.caldera.api_key,
        ] {
            if !secret.is_empty() {
                *secret = SecureString::from(REDACTED);
            }
        }

        config
    }

    pub fn indexer_config(&self) -> WazuhIndexerConfig {
        WazuhIndexerConfig {
            connector: ConnectorConfig {
                name: "wazuh-indexer".to_string(),
                base_url: self.indexer.url.clone(),
                auth: AuthConfig::Basic {
                    username: self.indexer.username.clone(),
                    password: self.indexer.password.clone(),
                },
                timeout_secs: self.indexer.query_timeout_secs,
                max_retries: self.indexer.max_retries,
                verify_tls: self.indexer.verify_ssl,
                headers: HashMap::new(),
            },
            index_pattern: self.indexer.index.clone(),
            requests_per_minute: self.indexer.requests_per_minute,
        }
    }

    pub fn manager_config(&self) -> WazuhManagerConfig {
        WazuhManagerConfig {
            connector: ConnectorConfig {
                name: "wazuh-manager".to_string(),
                base_url: self.manager.url.clone(),
                auth: AuthConfig::Basic {
                    username: self.manager.username.clone(),
                    password: self.manager.password.clone(),
                },
                timeout_secs: self.manager.timeout_secs,
                max_retries: 1,
                verify_tls: self.manager.verify_ssl,
                headers: HashMap::new(),
            },
        }
    }

    pub fn caldera_config(&self) -> CalderaConfig {
        CalderaConfig {
            base_url: self.caldera.url.clone(),
            api_key: self.caldera.api_key.clone(),
            timeout_secs: self.caldera.timeout_secs,
            max_retries: 1,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            window_secs: self.correlation.window_secs,
            clock_skew_secs: self.correlation.clock_skew_secs,
            default_range_minutes: self.correlation.default_range_minutes,
            summary_hours: self.correlation.summary_hours,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation.cache_ttl_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.indexer.query_timeout_secs)
    }
}

/// Wazuh indexer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    #[serde(default = "default_indexer_url")]
    pub url: String,

    #[serde(default = "default_indexer_username")]
    pub username: String,

    #[serde(default)]
    pub password: SecureString,

    /// Alert index pattern.
    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default)]
    pub verify_ssl: bool,

    /// Per-query timeout in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Upper bound on alerts fetched for one correlation.
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_indexer_url() -> String {
    "https://wazuh.indexer:9200".to_string()
}

fn default_indexer_username() -> String {
    "admin".to_string()
}

fn default_index() -> String {
    bastion_connectors::wazuh::DEFAULT_ALERT_INDEX.to_string()
}

fn default_query_timeout() -> u64 {
    10
}

fn default_max_alerts() -> usize {
    2000
}

fn default_retries() -> u32 {
    2
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            url: default_indexer_url(),
            username: default_indexer_username(),
            password: SecureString::default(),
            index: default_index(),
            verify_ssl: false,
            query_timeout_secs: default_query_timeout(),
            max_alerts: default_max_alerts(),
            max_retries: default_retries(),
            requests_per_minute: None,
        }
    }
}

/// Wazuh manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(default = "default_manager_url")]
    pub url: String,

    #[serde(default = "default_manager_username")]
    pub username: String,

    #[serde(default)]
    pub password: SecureString,

    #[serde(default)]
    pub verify_ssl: bool,

    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,
}

fn default_manager_url() -> String {
    "https://wazuh.manager:55000".to_string()
}

fn default_manager_username() -> String {
    "wazuh".to_string()
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            url: default_manager_url(),
            username: default_manager_username(),
            password: SecureString::default(),
            verify_ssl: false,
            timeout_secs: default_query_timeout(),
        }
    }
}

/// Caldera settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalderaSettings {
    #[serde(default = "default_caldera_url")]
    pub url: String,

    /// Red or blue API key, sent as the `KEY` header.
    #[serde(default)]
    pub api_key: SecureString,

    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,
}

fn default_caldera_url() -> String {
    "http://localhost:8888".to_string()
}

impl Default for CalderaSettings {
    fn default() -> Self {
        Self {
            url: default_caldera_url(),
            api_key: SecureString::default(),
            timeout_secs: default_query_timeout(),
        }
    }
}

/// Correlation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSettings {
    #[serde(default = "default_window")]
    pub window_secs: i64,

    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,

    #[serde(default = "default_range")]
    pub default_range_minutes: i64,

    #[serde(default = "default_summary_hours")]
    pub summary_hours: i64,

    /// How long a loaded operation chain stays cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_window() -> i64 {
    bastion_core::service::DEFAULT_WINDOW_SECS
}

fn default_clock_skew() -> i64 {
    bastion_core::DEFAULT_CLOCK_SKEW_SECS
}

fn default_range() -> i64 {
    bastion_core::service::DEFAULT_RANGE_MINUTES
}

fn default_summary_hours() -> i64 {
    bastion_core::service::DEFAULT_SUMMARY_HOURS
}

fn default_cache_ttl() -> u64 {
    bastion_core::DEFAULT_CHAIN_TTL.as_secs()
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            clock_skew_secs: default_clock_skew(),
            default_range_minutes: default_range(),
            summary_hours: default_summary_hours(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format.
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.indexer.index, "wazuh-alerts-*");
        assert_eq!(config.indexer.max_alerts, 2000);
        assert_eq!(config.indexer.query_timeout_secs, 10);
        assert_eq!(config.correlation.window_secs, 60);
        assert_eq!(config.correlation.clock_skew_secs, 5);
        assert_eq!(config.correlation.default_range_minutes, 60);
        assert_eq!(config.correlation.cache_ttl_secs, 60);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
indexer:
  url: https://10.0.0.5:9200
  password: idx-secret
  index: wazuh-alerts-4.x-*
  verify_ssl: true

caldera:
  url: http://caldera.lab:8888
  api_key: ADMIN123

correlation:
  window_secs: 120
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.indexer.url, "https://10.0.0.5:9200");
        assert_eq!(config.indexer.username, "admin");
        assert_eq!(config.indexer.password.expose_secret(), "idx-secret");
        assert!(config.indexer.verify_ssl);
        assert_eq!(config.caldera.api_key.expose_secret(), "ADMIN123");
        assert_eq!(config.correlation.window_secs, 120);
        assert_eq!(config.correlation.clock_skew_secs, 5);
        assert_eq!(config.manager.url, "https://wazuh.manager:55000");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 9090").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("WAZUH_MANAGER_URL", "https://manager.lab:55000"),
            ("WAZUH_USERNAME", "wazuh-wui"),
            ("WAZUH_PASSWORD", "mgr-secret"),
            ("WAZUH_INDEXER_PASSWORD", "idx-secret"),
            ("WAZUH_VERIFY_SSL", "true"),
            ("CALDERA_API_KEY", "BLUE456"),
            ("BASTION_PORT", "9443"),
            ("CALDERA_URL", ""),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.manager.url, "https://manager.lab:55000");
        assert_eq!(config.manager.username, "wazuh-wui");
        assert_eq!(config.manager.password.expose_secret(), "mgr-secret");
        assert_eq!(config.indexer.password.expose_secret(), "idx-secret");
        assert!(config.indexer.verify_ssl);
        assert!(config.manager.verify_ssl);
        assert_eq!(config.caldera.api_key.expose_secret(), "BLUE456");
        assert_eq!(config.caldera.url, "http://localhost:8888");
        assert_eq!(config.server.port, 9443);
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let config = AppConfig::default()
            .with_overrides(|k| (k == "BASTION_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("WAZUH_INDEXER_URL", "https://indexer.env:9200");
        let config = AppConfig::default().with_env_overrides();
        std::env::remove_var("WAZUH_INDEXER_URL");

        assert_eq!(config.indexer.url, "https://indexer.env:9200");
    }

    #[test]
    fn test_redact_secrets() {
        let mut config = AppConfig::default();
        config.indexer.password = "idx-secret".into();
        config.caldera.api_key = "ADMIN123".into();

        let redacted = config.redact_secrets();
        assert_eq!(redacted.indexer.password.expose_secret(), REDACTED);
        assert_eq!(redacted.caldera.api_key.expose_secret(), REDACTED);
        assert!(redacted.manager.password.is_empty());

        let yaml = serde_yaml::to_string(&redacted).unwrap();
        assert!(!yaml.contains("idx-secret"));
        assert!(!yaml.contains("ADMIN123"));
    }

    #[test]
    fn test_connector_configs() {
        let mut config = AppConfig::default();
        config.indexer.password = "pw".into();
        config.indexer.verify_ssl = true;

        let indexer = config.indexer_config();
        assert_eq!(indexer.index_pattern, "wazuh-alerts-*");
        assert!(indexer.connector.verify_tls);
        assert!(matches!(
            indexer.connector.auth,
            AuthConfig::Basic { ref username, .. } if username == "admin"
        ));

        let service = config.service_config();
        assert_eq!(service.window_secs, 60);
        assert_eq!(service.clock_skew_secs, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }
}
