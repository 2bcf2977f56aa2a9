use crate::constants::{
    get_supported_sources, BILLETTO_OSLO_URL, DESKTOP_CHROME_USER_AGENT, ROCKEFELLER_BASE_URL,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub browser: BrowserConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Single process: concurrent callers share the in-flight cycle's stream
    Memory,
    /// Several processes share a SQLite file holding the event set and the cycle lease
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub ttl_secs: u64,
    /// 0 disables the cycle-level deadline
    pub cycle_timeout_secs: u64,
    pub lease_secs: u64,
    pub join_wait_secs: u64,
    pub join_poll_ms: u64,
    pub stale_retention_factor: u32,
    pub sqlite_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Memory,
            ttl_secs: 3600,
            cycle_timeout_secs: 180,
            lease_secs: 600,
            join_wait_secs: 10,
            join_poll_ms: 500,
            stale_retention_factor: 24,
            sqlite_path: PathBuf::from("data/cache.db"),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cycle_timeout(&self) -> Option<Duration> {
        (self.cycle_timeout_secs > 0).then(|| Duration::from_secs(self.cycle_timeout_secs))
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn join_wait(&self) -> Duration {
        Duration::from_secs(self.join_wait_secs)
    }

    pub fn join_poll_interval(&self) -> Duration {
        Duration::from_millis(self.join_poll_ms.max(10))
    }

    /// How long the shared store keeps an event set around after it went stale
    pub fn retention(&self) -> Duration {
        self.ttl() * self.stale_retention_factor.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    /// Headless Chrome through a WebDriver endpoint (chromedriver)
    Webdriver,
    /// Plain HTTP fetch of the server-rendered HTML, no scripting
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub backend: BrowserBackend,
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            backend: BrowserBackend::Webdriver,
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: DESKTOP_CHROME_USER_AGENT.to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl BrowserConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub enabled: Vec<String>,
    pub rockefeller: RockefellerSettings,
    pub billetto: BillettoSettings,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: get_supported_sources().into_iter().map(String::from).collect(),
            rockefeller: RockefellerSettings::default(),
            billetto: BillettoSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RockefellerSettings {
    pub url: String,
    pub wait_timeout_secs: u64,
    pub max_scrolls: usize,
    pub scroll_settle_ms: u64,
    pub materialize_images: bool,
    pub image_settle_ms: u64,
}

impl Default for RockefellerSettings {
    fn default() -> Self {
        Self {
            url: ROCKEFELLER_BASE_URL.to_string(),
            wait_timeout_secs: 20,
            max_scrolls: 30,
            scroll_settle_ms: 750,
            materialize_images: true,
            image_settle_ms: 25,
        }
    }
}

impl RockefellerSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn image_settle(&self) -> Duration {
        Duration::from_millis(self.image_settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillettoSettings {
    pub url: String,
    pub wait_timeout_secs: u64,
    pub cookie_timeout_secs: u64,
    pub max_pages: usize,
    pub page_settle_ms: u64,
}

impl Default for BillettoSettings {
    fn default() -> Self {
        Self {
            url: BILLETTO_OSLO_URL.to_string(),
            wait_timeout_secs: 20,
            cookie_timeout_secs: 5,
            max_pages: 4,
            page_settle_ms: 3000,
        }
    }
}

impl BillettoSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn cookie_timeout(&self) -> Duration {
        Duration::from_secs(self.cookie_timeout_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }
}

impl Config {
    /// Load configuration: explicit path, then `OSLO_EVENTS_CONFIG`, then `config.toml`
    /// if it exists, otherwise built-in defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("OSLO_EVENTS_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    ScraperError::Config(format!(
                        "Failed to read config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml(&content)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(bind) = std::env::var("BIND_ADDR") {
            self.server.bind = bind;
        }
        if let Ok(url) = std::env::var("WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Ok(ttl) = std::env::var("CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl
                .parse()
                .map_err(|_| ScraperError::Config(format!("CACHE_TTL_SECS is not a number: {ttl}")))?;
        }
        if let Ok(mode) = std::env::var("CACHE_MODE") {
            self.cache.mode = match mode.to_lowercase().as_str() {
                "memory" => CacheMode::Memory,
                "sqlite" => CacheMode::Sqlite,
                other => {
                    return Err(ScraperError::Config(format!("Unknown CACHE_MODE '{other}'")))
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(ScraperError::Config("cache.ttl_secs must be positive".into()));
        }
        if self.cache.mode == CacheMode::Sqlite {
            // A lease shorter than a cycle could let a second process start scraping
            let worst_case = self.cache.cycle_timeout_secs;
            if worst_case == 0 || self.cache.lease_secs <= worst_case {
                return Err(ScraperError::Config(format!(
                    "cache.lease_secs ({}) must exceed cache.cycle_timeout_secs ({}) in sqlite mode",
                    self.cache.lease_secs, worst_case
                )));
            }
        }
        let supported = get_supported_sources();
        for source in &self.sources.enabled {
            if !supported.contains(&source.as_str()) {
                return Err(ScraperError::Config(format!(
                    "Unknown source '{}'. Available: {}",
                    source,
                    supported.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:3001");
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.sources.enabled, vec!["rockefeller", "billetto"]);
        assert_eq!(config.sources.rockefeller.max_scrolls, 30);
        assert_eq!(config.sources.billetto.max_pages, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [cache]
            ttl_secs = 60
            mode = "sqlite"

            [browser]
            backend = "static"

            [sources]
            enabled = ["billetto"]

            [sources.billetto]
            max_pages = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.mode, CacheMode::Sqlite);
        assert_eq!(config.cache.lease_secs, 600);
        assert_eq!(config.browser.backend, BrowserBackend::Static);
        assert_eq!(config.sources.enabled, vec!["billetto"]);
        assert_eq!(config.sources.billetto.max_pages, 2);
        assert_eq!(config.sources.billetto.wait_timeout_secs, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_lease_in_sqlite_mode() {
        let mut config = Config::default();
        config.cache.mode = CacheMode::Sqlite;
        config.cache.lease_secs = 100;
        config.cache.cycle_timeout_secs = 180;
        assert!(matches!(config.validate(), Err(ScraperError::Config(_))));

        config.cache.cycle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_source() {
        let mut config = Config::default();
        config.sources.enabled.push("ticketmaster".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ticketmaster"));
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let result = Config::from_toml("[browser]\nbackend = \"firefox\"\n");
        assert!(matches!(result, Err(ScraperError::Toml(_))));
    }

    #[test]
    fn test_retention_scales_ttl() {
        let cache = CacheConfig {
            ttl_secs: 10,
            stale_retention_factor: 6,
            ..CacheConfig::default()
        };
        assert_eq!(cache.retention(), Duration::from_secs(60));
        assert_eq!(CacheConfig { cycle_timeout_secs: 0, ..cache }.cycle_timeout(), None);
    }
}
