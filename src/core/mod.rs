use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub mod pipeline;

pub use pipeline::{ExtractionPipeline, FetchFailure, PipelineOptions, PipelineOutput, RunSummary, StageInfo};

use crate::catalog::ProductRecord;
use crate::config::AppConfig;
use crate::export::{ExportManager, ExportStats};
use crate::logging::{new_run_id, LogContext, PerformanceLogger};
use crate::scraper::{build_fetcher, PageFetcher};

/// Result of a completed run
#[derive(Debug)]
pub struct RunReport {
    pub products: Vec<ProductRecord>,
    pub summary: RunSummary,
    pub export: ExportStats,
}

/// Core application: one configured extraction run from landing page to output file
pub struct Sproutly {
    config: AppConfig,
    run_id: String,
    export_manager: Arc<ExportManager>,
    fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Sproutly {
    pub fn new(config: AppConfig) -> Self {
        let run_id = new_run_id();
        info!("Initializing sproutly run {}", run_id);

        let export_manager = Arc::new(ExportManager::new(&config.export));
        info!("Export manager initialized ({})", export_manager.format());

        Self {
            config,
            run_id,
            export_manager,
            fetcher: None,
        }
    }

    /// Use `fetcher` instead of the engine named in the configuration.
    /// The caller is responsible for closing it.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        info!("Using {} fetcher", fetcher.engine());
        self.fetcher = Some(fetcher);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Scrape the storefront and write the merged catalog.
    ///
    /// The output path is checked before anything is fetched.
    pub async fn run(&self) -> Result<RunReport> {
        self.export_manager.ensure_writable().await?;

        let options = PipelineOptions::from_config(&self.config, self.run_id.clone())?;

        let PipelineOutput { products, summary } = match &self.fetcher {
            Some(fetcher) => ExtractionPipeline::new(fetcher.clone(), options)?.run().await,
            None => {
                let fetcher = build_fetcher(&self.config).await?;
                info!("Page fetcher initialized ({})", fetcher.engine());

                // only engines built here are closed here
                let output = match ExtractionPipeline::new(fetcher.clone(), options) {
                    Ok(pipeline) => Ok(pipeline.run().await),
                    Err(e) => Err(e),
                };
                fetcher.close().await;
                output?
            }
        };

        if !summary.failed_pages.is_empty() {
            warn!("{} page(s) could not be fetched", summary.failed_pages.len());
        }

        let perf = PerformanceLogger::new(LogContext::new("export", "write").with_run_id(self.run_id.clone()));
        let export = match self.export_manager.export(&products).await {
            Ok(stats) => {
                perf.finish(&format!("Wrote {}", stats.file_path));
                stats
            }
            Err(e) => {
                perf.finish_with_error("Export failed", &e);
                return Err(e.into());
            }
        };

        info!(
            "Run {} finished: {} products ({} enriched, {} partial) in {}ms",
            summary.run_id, summary.products, summary.enriched_products, summary.partial_products, summary.duration_ms
        );

        Ok(RunReport {
            products,
            summary,
            export,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::error::SproutlyError;
    use crate::scraper::StaticFetcher;
    use tempfile::TempDir;

    fn config(output: std::path::PathBuf) -> AppConfig {
        let mut config = AppConfig::default();
        config.scraping.base_url = "https://shop.test/".to_string();
        config.scraping.discovery_url = "https://shop.test/".to_string();
        config.export = ExportConfig {
            output_file: output,
            jsonl: false,
            pretty: false,
        };
        config
    }

    #[tokio::test]
    async fn test_run_writes_catalog() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("products.json");
        let fetcher = StaticFetcher::new()
            .with_page(
                "https://shop.test/",
                r#"<div class="menu__col"><strong class="nav__menu-headline">Categories</strong>
                   <a class="hover-u" href="/collections/flowers">Flowers</a></div>"#,
            )
            .with_page(
                "https://shop.test/collections/flowers",
                r#"<div id="products"><div class="product-card"><a class="cover" href="/products/peony"></a>
                   <span class="product-card__title">Peony</span>
                   <span data-product-card-price-regular>$40</span></div></div>"#,
            );

        let fetcher = Arc::new(fetcher);
        let app = Sproutly::new(config(output.clone())).with_fetcher(fetcher.clone());
        let report = app.run().await.unwrap();

        assert_eq!(report.products.len(), 1);
        assert_eq!(report.export.record_count, 1);
        // detail page missing from the fixture, so the product stays partial
        assert_eq!(report.summary.partial_products, 1);
        assert!(!fetcher.is_closed());

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written[0]["id"], "peony");
        assert_eq!(written[0]["partial"], true);
    }

    #[tokio::test]
    async fn test_unwritable_output_fails_before_fetching() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new());

        let app = Sproutly::new(config(dir.path().to_path_buf())).with_fetcher(fetcher.clone());
        let err = app.run().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SproutlyError>(),
            Some(SproutlyError::OutputNotWritable { .. })
        ));
        assert_eq!(fetcher.total_calls().await, 0);
    }
}
