use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::config::{AppConfig, ConfigOverrides, Preset};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sproutly")]
#[command(about = "Extract the product catalog of a florist storefront into JSON")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[arg(long, help = "Short waits, headless browser")]
    pub fast: bool,

    #[arg(long, help = "Run the browser without a window")]
    pub headless: bool,

    #[arg(long, value_name = "N", help = "Stop admitting products after N")]
    pub max_products: Option<usize>,

    #[arg(long, value_name = "N", help = "Products kept per category page")]
    pub max_per_category: Option<usize>,

    #[arg(long, value_name = "N", help = "Category pages to visit (0 skips categories)")]
    pub max_categories: Option<usize>,

    #[arg(long, value_name = "N", help = "Collection pages to visit (0 skips collections)")]
    pub max_collections: Option<usize>,

    #[arg(long, value_name = "N", help = "Occasion pages to visit (0 skips occasions)")]
    pub max_occasions: Option<usize>,

    #[arg(short, long, value_name = "FILE", help = "Output file path")]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", help = "Wait after each page load")]
    pub initial_wait: Option<f64>,

    #[arg(long, value_name = "SECONDS", help = "Wait between scroll steps")]
    pub scroll_wait: Option<f64>,

    #[arg(long, value_name = "N", help = "Attempts per page before giving up")]
    pub max_retries: Option<u32>,

    #[arg(long, value_name = "N", help = "Pages fetched at once")]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub viewport_width: Option<u32>,

    #[arg(long)]
    pub viewport_height: Option<u32>,

    #[arg(long, value_name = "URL", help = "Storefront root URL")]
    pub base_url: Option<String>,

    #[arg(long, value_enum, help = "Start from a named preset")]
    pub preset: Option<Preset>,

    #[arg(short, long, value_name = "FILE", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Log filter, e.g. info or sproutly=debug")]
    pub log_level: Option<String>,

    #[arg(long, value_name = "DIR", help = "Also write daily log files to DIR")]
    pub log_file: Option<PathBuf>,

    #[arg(long, help = "Write one product per line instead of a JSON array")]
    pub jsonl: bool,

    #[arg(long, help = "Do not visit product detail pages")]
    pub skip_details: bool,
}

impl Cli {
    /// Resolve the effective configuration.
    ///
    /// Precedence, lowest first: preset or config file or defaults,
    /// then `SPROUTLY_*` environment variables, then flags.
    pub async fn load_config(&self) -> Result<AppConfig> {
        let mut config = match (&self.config, self.preset) {
            (Some(path), _) => AppConfig::load_from_file(path).await?,
            (None, Some(preset)) => {
                info!("Using {:?} preset", preset);
                AppConfig::preset(preset)
            }
            (None, None) => AppConfig::load().await?,
        };

        ConfigOverrides::apply(&mut config);
        self.apply_to(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Apply command-line flags on top of `config`
    pub fn apply_to(&self, config: &mut AppConfig) {
        let scraping = &mut config.scraping;

        if self.fast {
            scraping.initial_wait = 1.0;
            scraping.scroll_wait = 1.0;
            scraping.headless = true;
        }
        if self.headless {
            scraping.headless = true;
        }

        if let Some(max) = self.max_products {
            scraping.max_products = Some(max);
        }
        if let Some(max) = self.max_per_category {
            scraping.max_products_per_category = Some(max);
        }
        if let Some(max) = self.max_categories {
            scraping.max_categories = Some(max);
        }
        if let Some(max) = self.max_collections {
            scraping.max_collections = Some(max);
        }
        if let Some(max) = self.max_occasions {
            scraping.max_occasions = Some(max);
        }
        if let Some(wait) = self.initial_wait {
            scraping.initial_wait = wait;
        }
        if let Some(wait) = self.scroll_wait {
            scraping.scroll_wait = wait;
        }
        if let Some(concurrency) = self.concurrency {
            scraping.concurrency = concurrency;
        }
        if let Some(width) = self.viewport_width {
            scraping.viewport_width = width;
        }
        if let Some(height) = self.viewport_height {
            scraping.viewport_height = height;
        }
        if let Some(base_url) = &self.base_url {
            scraping.base_url = base_url.clone();
            scraping.discovery_url = base_url.clone();
        }
        if self.skip_details {
            scraping.fetch_details = false;
        }

        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }

        if let Some(output) = &self.output {
            config.export.output_file = output.clone();
        }
        if self.jsonl {
            config.export.jsonl = true;
        }

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.log_file {
            config.logging.file_enabled = true;
            config.logging.log_directory = dir.clone();
        }
    }
}
