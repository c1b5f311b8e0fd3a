//! Configuration management with TOML, environment variables, and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_DIR: &str = "surugaya-sync";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// FlareSolverr rendering proxy
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Catalog synchronization pacing
    #[serde(default)]
    pub sync: SyncSettings,

    /// Letao account and cart retry policy
    #[serde(default)]
    pub letao: LetaoSettings,

    /// JSON store location; defaults to the user data directory
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

/// Rendering proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// FlareSolverr `/v1` endpoint
    #[serde(default = "default_proxy_endpoint")]
    pub endpoint: String,

    /// Render budget handed to the proxy as `maxTimeout`
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
}

/// Politeness and run-limit settings for the synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Lower bound of the random pause between items
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the random pause between items
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Items per batch; a longer pause follows each full batch (0 disables)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause after each full batch
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Base pause after a failed item, multiplied by consecutive failures
    #[serde(default = "default_failure_delay_ms")]
    pub failure_delay_ms: u64,

    /// Whole-run limit
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,

    /// Origin for resolving relative image links
    #[serde(default = "default_marketplace_url")]
    pub marketplace_url: String,
}

/// Letao account, session cache and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetaoSettings {
    /// Login e-mail
    #[serde(default)]
    pub email: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// Merchant origin
    #[serde(default = "default_letao_base_url")]
    pub base_url: String,

    /// Session cache lifetime; kept at or under the server-declared expiry
    #[serde(default = "default_cookie_cache_hours")]
    pub cookie_cache_hours: u64,

    /// Cart-add attempts, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between cart-add attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pause between visiting the login page and posting credentials
    #[serde(default = "default_login_delay_ms")]
    pub login_delay_ms: u64,
}

fn default_proxy_endpoint() -> String {
    "http://localhost:8191/v1".to_string()
}

fn default_proxy_timeout_ms() -> u64 {
    60_000
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    3000
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    10_000
}

fn default_failure_delay_ms() -> u64 {
    5000
}

fn default_timeout_minutes() -> u64 {
    60
}

fn default_marketplace_url() -> String {
    "https://www.suruga-ya.jp".to_string()
}

fn default_letao_base_url() -> String {
    "https://www.letao.com.tw".to_string()
}

fn default_cookie_cache_hours() -> u64 {
    23
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_login_delay_ms() -> u64 {
    500
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self { endpoint: default_proxy_endpoint(), timeout_ms: default_proxy_timeout_ms() }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            failure_delay_ms: default_failure_delay_ms(),
            timeout_minutes: default_timeout_minutes(),
            marketplace_url: default_marketplace_url(),
        }
    }
}

impl SyncSettings {
    /// Returns the whole-run limit.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }
}

impl Default for LetaoSettings {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            base_url: default_letao_base_url(),
            cookie_cache_hours: default_cookie_cache_hours(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            login_delay_ms: default_login_delay_ms(),
        }
    }
}

impl LetaoSettings {
    /// Returns the session cache lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cookie_cache_hours.saturating_mul(3600))
    }

    /// Returns true when both credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join(APP_DIR).join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("SURUGA_PROXY") {
            self.proxy.endpoint = endpoint;
        }

        if let Ok(store) = std::env::var("SURUGA_STORE") {
            self.store_path = Some(PathBuf::from(store));
        }

        if let Ok(email) = std::env::var("LETAO_EMAIL") {
            self.letao.email = email;
        }

        if let Ok(password) = std::env::var("LETAO_PASSWORD") {
            self.letao.password = password;
        }

        if let Ok(base_url) = std::env::var("LETAO_BASE_URL") {
            self.letao.base_url = base_url;
        }

        self
    }

    /// Returns the store file, falling back to the user data directory.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("store.json")
        })
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.proxy.endpoint, "http://localhost:8191/v1");
        assert_eq!(config.proxy.timeout_ms, 60_000);
        assert_eq!(config.sync.min_delay_ms, 1000);
        assert_eq!(config.sync.max_delay_ms, 3000);
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.batch_delay_ms, 10_000);
        assert_eq!(config.sync.failure_delay_ms, 5000);
        assert_eq!(config.sync.timeout_minutes, 60);
        assert_eq!(config.letao.base_url, "https://www.letao.com.tw");
        assert_eq!(config.letao.cookie_cache_hours, 23);
        assert_eq!(config.letao.max_retries, 2);
        assert_eq!(config.letao.retry_delay_ms, 1000);
        assert_eq!(config.letao.login_delay_ms, 500);
        assert!(config.store_path.is_none());
        assert_eq!(config.format, OutputFormat::Table);
    }

    #[test]
    fn test_durations() {
        let config = Config::new();
        assert_eq!(config.sync.run_timeout(), Duration::from_secs(3600));
        assert_eq!(config.letao.cache_ttl(), Duration::from_secs(23 * 3600));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let mut config = Config::new();
        config.sync.timeout_minutes = u64::MAX;
        config.letao.cookie_cache_hours = u64::MAX;
        assert_eq!(config.sync.run_timeout(), Duration::from_secs(u64::MAX));
        assert_eq!(config.letao.cache_ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_has_credentials() {
        let mut settings = LetaoSettings::default();
        assert!(!settings.has_credentials());
        settings.email = "me@example.com".to_string();
        assert!(!settings.has_credentials());
        settings.password = "secret".to_string();
        assert!(settings.has_credentials());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);

        let err = "invalid".parse::<OutputFormat>().unwrap_err();
        assert!(err.contains("Unknown format"));
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Markdown.to_string(), "markdown");
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_config_from_toml_partial_sections() {
        let toml = r#"
            format = "json"

            [sync]
            min_delay_ms = 200
            batch_size = 5

            [letao]
            max_retries = 4
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.sync.min_delay_ms, 200);
        assert_eq!(config.sync.batch_size, 5);
        // Unset keys keep their defaults
        assert_eq!(config.sync.max_delay_ms, 3000);
        assert_eq!(config.letao.max_retries, 4);
        assert_eq!(config.letao.cookie_cache_hours, 23);
        assert_eq!(config.proxy.timeout_ms, 60_000);
    }

    #[test]
    fn test_config_from_toml_all_fields() {
        let toml = r#"
            store_path = "/tmp/store.json"
            format = "csv"

            [proxy]
            endpoint = "http://flaresolverr:8191/v1"
            timeout_ms = 90000

            [sync]
            min_delay_ms = 500
            max_delay_ms = 800
            batch_size = 20
            batch_delay_ms = 30000
            failure_delay_ms = 7000
            timeout_minutes = 15
            marketplace_url = "https://mirror.example"

            [letao]
            email = "me@example.com"
            password = "secret"
            base_url = "https://letao.example"
            cookie_cache_hours = 12
            max_retries = 3
            retry_delay_ms = 250
            login_delay_ms = 100
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/store.json")));
        assert_eq!(config.format, OutputFormat::Csv);
        assert_eq!(config.proxy.endpoint, "http://flaresolverr:8191/v1");
        assert_eq!(config.proxy.timeout_ms, 90_000);
        assert_eq!(config.sync.max_delay_ms, 800);
        assert_eq!(config.sync.batch_delay_ms, 30_000);
        assert_eq!(config.sync.failure_delay_ms, 7000);
        assert_eq!(config.sync.timeout_minutes, 15);
        assert_eq!(config.sync.marketplace_url, "https://mirror.example");
        assert_eq!(config.letao.email, "me@example.com");
        assert_eq!(config.letao.base_url, "https://letao.example");
        assert_eq!(config.letao.cookie_cache_hours, 12);
        assert_eq!(config.letao.max_retries, 3);
        assert_eq!(config.letao.retry_delay_ms, 250);
        assert_eq!(config.letao.login_delay_ms, 100);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [proxy]
            endpoint = "http://proxy.local/v1"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.proxy.endpoint, "http://proxy.local/v1");
    }

    #[test]
    fn test_config_from_file_not_found() {
        let result = Config::from_file("/nonexistent/path/config.toml");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to read config file"));
    }

    #[test]
    fn test_config_from_file_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();

        let result = Config::from_file(file.path());
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [sync]
            batch_size = 3
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.sync.batch_size, 3);
    }

    #[test]
    fn test_config_with_env() {
        let orig_proxy = std::env::var("SURUGA_PROXY").ok();
        let orig_email = std::env::var("LETAO_EMAIL").ok();

        std::env::set_var("SURUGA_PROXY", "http://env-proxy:8191/v1");
        std::env::set_var("LETAO_EMAIL", "env@example.com");

        let config = Config::new().with_env();
        assert_eq!(config.proxy.endpoint, "http://env-proxy:8191/v1");
        assert_eq!(config.letao.email, "env@example.com");

        match orig_proxy {
            Some(v) => std::env::set_var("SURUGA_PROXY", v),
            None => std::env::remove_var("SURUGA_PROXY"),
        }
        match orig_email {
            Some(v) => std::env::set_var("LETAO_EMAIL", v),
            None => std::env::remove_var("LETAO_EMAIL"),
        }
    }

    #[test]
    fn test_resolved_store_path() {
        let mut config = Config::new();
        assert!(config.resolved_store_path().ends_with("surugaya-sync/store.json"));

        config.store_path = Some(PathBuf::from("/data/wishlist.json"));
        assert_eq!(config.resolved_store_path(), PathBuf::from("/data/wishlist.json"));
    }
}
