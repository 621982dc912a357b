use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub glossgraph: GlossgraphConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub closure: ClosureConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Server-side store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GlossgraphConfig {
    pub db_path: PathBuf,
    /// Root of the migration tree; `server/` and `local/` live below it.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Client-side local store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_db_path")]
    pub db_path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            db_path: default_local_db_path(),
        }
    }
}

/// Closure-fetch client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClosureConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Hard ceiling on remote fetches per closure run.
    #[serde(default = "default_max_fetches")]
    pub max_fetches: usize,
    /// In-flight requests per wave.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fetched-record LRU capacity; 0 disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_fetches: default_max_fetches(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_local_db_path() -> PathBuf {
    PathBuf::from("glossgraph-local.db")
}

fn default_base_url() -> String {
    "http://localhost:3333".to_string()
}

fn default_max_fetches() -> usize {
    5000
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3333
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in GLOSSGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GLOSSGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.glossgraph.db_path.as_os_str().is_empty() {
            anyhow::bail!("glossgraph.db_path must not be empty");
        }

        if self.local.db_path == self.glossgraph.db_path {
            anyhow::bail!(
                "local.db_path must differ from glossgraph.db_path: {}",
                self.local.db_path.display()
            );
        }

        url::Url::parse(&self.closure.base_url).with_context(|| {
            format!("closure.base_url is not a valid URL: {}", self.closure.base_url)
        })?;

        if self.closure.max_fetches == 0 {
            anyhow::bail!("closure.max_fetches must be greater than 0");
        }

        if self.closure.concurrency == 0 {
            anyhow::bail!("closure.concurrency must be greater than 0");
        }

        if self.closure.timeout_secs == 0 {
            anyhow::bail!("closure.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get server database path
    pub fn db_path(&self) -> &Path {
        &self.glossgraph.db_path
    }

    /// Get local (client) database path
    pub fn local_db_path(&self) -> &Path {
        &self.local.db_path
    }

    /// Migrations for the server store
    pub fn server_migrations(&self) -> PathBuf {
        self.glossgraph.migrations_dir.join("server")
    }

    /// Migrations for the local store
    pub fn local_migrations(&self) -> PathBuf {
        self.glossgraph.migrations_dir.join("local")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[glossgraph]
db_path = "./server.db"
log_level = "debug"

[local]
db_path = "./local.db"

[closure]
base_url = "http://127.0.0.1:4000"
max_fetches = 200
concurrency = 4
timeout_secs = 10
cache_capacity = 0

[http_server]
port = 4000
allowed_origins = ["http://localhost:5173"]
"#;

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_config_load_success() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, FULL_CONFIG);
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.glossgraph.log_level, "debug");
        assert_eq!(config.closure.max_fetches, 200);
        assert_eq!(config.closure.concurrency, 4);
        assert_eq!(config.http_server.port, 4000);
        assert_eq!(config.server_migrations(), PathBuf::from("migrations/server"));
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "[glossgraph]\ndb_path = \"./server.db\"\n");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.glossgraph.log_level, "info");
        assert_eq!(config.closure.base_url, "http://localhost:3333");
        assert_eq!(config.closure.max_fetches, 5000);
        assert_eq!(config.http_server.port, 3333);
        assert_eq!(config.http_server.host, "127.0.0.1");
        assert!(config.http_server.allowed_origins.is_empty());
    }

    #[test]
    fn test_config_rejects_zero_budget() {
        let temp_dir = TempDir::new().unwrap();
        let content = FULL_CONFIG.replace("max_fetches = 200", "max_fetches = 0");
        let path = write_config(&temp_dir, &content);
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_fetches"));
    }

    #[test]
    fn test_config_rejects_bad_url() {
        let temp_dir = TempDir::new().unwrap();
        let content = FULL_CONFIG.replace("http://127.0.0.1:4000", "not a url");
        let path = write_config(&temp_dir, &content);
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_config_rejects_shared_db_path() {
        let temp_dir = TempDir::new().unwrap();
        let content = FULL_CONFIG.replace("./local.db", "./server.db");
        let path = write_config(&temp_dir, &content);
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("local.db_path"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("GLOSSGRAPH_CONFIG").ok();
        std::env::set_var("GLOSSGRAPH_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("GLOSSGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("GLOSSGRAPH_CONFIG", v);
        }
    }
}
