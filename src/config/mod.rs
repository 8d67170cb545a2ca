use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::SproutlyError;
use crate::scraper::retry::{Backoff, RetryPolicy};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraping: ScrapingConfig,
    pub retry: RetryConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub base_url: String,
    pub discovery_url: String,
    pub engine: FetchEngine,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Seconds to wait after a page loads
    pub initial_wait: f64,
    /// Seconds to wait after each scroll step
    pub scroll_wait: f64,
    pub scroll_step_divisor: f64,
    pub request_timeout_seconds: u64,
    pub default_delay_ms: u64,
    pub concurrency: usize,
    pub user_agent: String,
    pub max_products: Option<usize>,
    pub max_products_per_category: Option<usize>,
    pub max_categories: Option<usize>,
    pub max_collections: Option<usize>,
    pub max_occasions: Option<usize>,
    pub fetch_details: bool,
}

/// Which page fetcher backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEngine {
    Browser,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_file: PathBuf,
    pub jsonl: bool,
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub log_directory: PathBuf,
    pub max_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraping: ScrapingConfig::default(),
            retry: RetryConfig::default(),
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://urbanstems.com".to_string(),
            discovery_url: "https://urbanstems.com/".to_string(),
            engine: if cfg!(feature = "browser") {
                FetchEngine::Browser
            } else {
                FetchEngine::Http
            },
            headless: false,
            viewport_width: 1280,
            viewport_height: 800,
            initial_wait: 0.2,
            scroll_wait: 0.2,
            scroll_step_divisor: 1.6,
            request_timeout_seconds: 30,
            default_delay_ms: 500,
            concurrency: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            max_products: None,
            max_products_per_category: None,
            max_categories: None,
            max_collections: None,
            max_occasions: None,
            fetch_details: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("products.json"),
            jsonl: false,
            pretty: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_enabled: true,
            file_enabled: false,
            log_directory: get_data_directory().join("logs"),
            max_files: 5,
        }
    }
}

impl ScrapingConfig {
    /// Pixels scrolled per step while loading lazy listing cards
    pub fn scroll_step(&self) -> u32 {
        (self.viewport_height as f64 / self.scroll_step_divisor) as u32
    }

    pub fn initial_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_wait).unwrap_or_default()
    }

    pub fn scroll_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.scroll_wait).unwrap_or_default()
    }
}

impl RetryConfig {
    /// Build the retry policy consumed by the fetchers
    pub fn policy(&self) -> RetryPolicy {
        let backoff = match self.strategy {
            BackoffStrategy::Fixed => Backoff::Fixed(Duration::from_millis(self.base_delay_ms)),
            BackoffStrategy::Exponential => Backoff::Exponential {
                base: Duration::from_millis(self.base_delay_ms),
                multiplier: self.multiplier,
                max: Duration::from_millis(self.max_delay_ms),
            },
        };

        RetryPolicy::new(self.max_retries, backoff).with_jitter(Duration::from_millis(self.jitter_ms))
    }
}

/// Named configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Visible browser, small product limits
    Development,
    /// Headless, very small limits
    Testing,
    /// Headless, comprehensive, more retries
    Production,
    /// Headless, short waits
    Fast,
}

impl AppConfig {
    /// Build a configuration from a preset
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        let scraping = &mut config.scraping;

        match preset {
            Preset::Development => {
                scraping.headless = false;
                scraping.initial_wait = 2.0;
                scraping.scroll_wait = 1.5;
                scraping.max_products = Some(10);
                scraping.max_products_per_category = Some(5);
                config.export.output_file = PathBuf::from("dev_products.json");
            }
            Preset::Testing => {
                scraping.headless = true;
                scraping.initial_wait = 1.0;
                scraping.scroll_wait = 1.0;
                scraping.max_products = Some(6);
                scraping.max_products_per_category = Some(3);
                config.retry.max_retries = 2;
                config.export.output_file = PathBuf::from("test_products.json");
            }
            Preset::Production => {
                scraping.headless = true;
                scraping.initial_wait = 3.0;
                scraping.scroll_wait = 2.0;
                config.retry.max_retries = 5;
                config.export.output_file = PathBuf::from("products.json");
            }
            Preset::Fast => {
                scraping.headless = true;
                scraping.initial_wait = 1.0;
                scraping.scroll_wait = 1.0;
                scraping.max_products_per_category = Some(20);
                config.retry.max_retries = 2;
                config.export.output_file = PathBuf::from("fast_products.json");
            }
        }

        config
    }

    /// Load configuration from the default location, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            tracing::error!("Failed to parse {}: {}", path.display(), e);
            SproutlyError::InvalidConfig { path: path.display().to_string() }
        })?;

        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), SproutlyError> {
        let scraping = &self.scraping;

        if !scraping.scroll_wait.is_finite() || scraping.scroll_wait < 0.2 {
            return Err(SproutlyError::config("scroll_wait should be at least 0.2 seconds"));
        }

        if !scraping.initial_wait.is_finite() || scraping.initial_wait < 0.0 {
            return Err(SproutlyError::config("initial_wait must be a finite, non-negative number of seconds"));
        }

        if self.retry.max_retries < 1 {
            return Err(SproutlyError::config("max_retries should be at least 1"));
        }

        if scraping.viewport_width < 800 || scraping.viewport_height < 600 {
            return Err(SproutlyError::config("Viewport should be at least 800x600"));
        }

        if scraping.concurrency == 0 {
            return Err(SproutlyError::config("concurrency must be > 0"));
        }

        if !scraping.scroll_step_divisor.is_finite() || scraping.scroll_step_divisor <= 0.0 {
            return Err(SproutlyError::config("scroll_step_divisor must be > 0"));
        }

        if self.retry.strategy == BackoffStrategy::Exponential
            && (!self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0)
        {
            return Err(SproutlyError::config("retry multiplier must be >= 1.0"));
        }

        url::Url::parse(&scraping.base_url)
            .map_err(|e| SproutlyError::config(format!("Invalid base_url '{}': {}", scraping.base_url, e)))?;
        url::Url::parse(&scraping.discovery_url).map_err(|e| {
            SproutlyError::config(format!("Invalid discovery_url '{}': {}", scraping.discovery_url, e))
        })?;

        if self.export.output_file.as_os_str().is_empty() {
            return Err(SproutlyError::config("output_file must not be empty"));
        }

        Ok(())
    }
}

/// Get the default data directory
fn get_data_directory() -> PathBuf {
    directories::ProjectDirs::from("com", "sproutly", "sproutly")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "sproutly", "sproutly")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("sproutly.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`
    pub fn apply_from<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("SPROUTLY_BASE_URL") {
            config.scraping.discovery_url = format!("{}/", base_url.trim_end_matches('/'));
            config.scraping.base_url = base_url;
        }

        if let Some(concurrency) = lookup("SPROUTLY_CONCURRENCY").and_then(|v| v.parse().ok()) {
            config.scraping.concurrency = concurrency;
        }

        if let Some(headless) = lookup("SPROUTLY_HEADLESS") {
            config.scraping.headless = headless.to_lowercase() == "true";
        }

        if let Some(retries) = lookup("SPROUTLY_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            config.retry.max_retries = retries;
        }

        if let Some(output) = lookup("SPROUTLY_OUTPUT") {
            config.export.output_file = PathBuf::from(output);
        }

        if let Some(log_level) = lookup("SPROUTLY_LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }
}
