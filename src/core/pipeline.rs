use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{Aggregator, Observation, PageRef, ProductRecord};
use crate::config::AppConfig;
use crate::error::{FetchError, SproutlyError, SproutlyResult};
use crate::extract::{self, DiscoveryLimits, ListingPage, SiteSelectors};
use crate::logging::{LogContext, PerformanceLogger};
use crate::scraper::PageFetcher;
use crate::{log_info, log_warn};

/// Knobs for one extraction run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub base_url: Url,
    pub discovery_url: String,
    pub limits: DiscoveryLimits,
    pub max_products: Option<usize>,
    pub max_per_category: Option<usize>,
    pub concurrency: usize,
    pub wait_budget: Duration,
    pub fetch_details: bool,
    /// Reference date for delivery lead times
    pub today: NaiveDate,
    pub run_id: String,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig, run_id: impl Into<String>) -> SproutlyResult<Self> {
        let scraping = &config.scraping;
        let base_url = Url::parse(&scraping.base_url)
            .map_err(|e| SproutlyError::config(format!("Invalid base_url '{}': {}", scraping.base_url, e)))?;

        Ok(Self {
            base_url,
            discovery_url: scraping.discovery_url.clone(),
            limits: DiscoveryLimits {
                max_categories: scraping.max_categories,
                max_collections: scraping.max_collections,
                max_occasions: scraping.max_occasions,
            },
            max_products: scraping.max_products,
            max_per_category: scraping.max_products_per_category,
            concurrency: scraping.concurrency.max(1),
            wait_budget: scraping.initial_wait(),
            fetch_details: scraping.fetch_details,
            today: chrono::Local::now().date_naive(),
            run_id: run_id.into(),
        })
    }
}

/// Statistics for one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    pub stage_name: String,
    pub items_in: usize,
    pub items_out: usize,
    pub processing_time_ms: u64,
}

/// A page or product whose fetch failed
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub transient: bool,
    pub reason: String,
}

impl From<&FetchError> for FetchFailure {
    fn from(err: &FetchError) -> Self {
        Self {
            url: err.url().to_string(),
            transient: err.is_transient(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pages_discovered: usize,
    pub pages_scraped: usize,
    pub pages_skipped: usize,
    pub failed_pages: Vec<FetchFailure>,
    pub parse_warnings: usize,
    pub products: usize,
    pub merged_observations: usize,
    pub rejected_products: usize,
    pub enriched_products: usize,
    pub partial_products: usize,
    pub stages: Vec<StageInfo>,
    pub duration_ms: u64,
}

pub struct PipelineOutput {
    pub products: Vec<ProductRecord>,
    pub summary: RunSummary,
}

enum ListingOutcome {
    Parsed(ListingPage),
    Failed(FetchError),
    Skipped,
}

/// Discovery, listing extraction, detail enrichment and aggregation
pub struct ExtractionPipeline {
    fetcher: Arc<dyn PageFetcher>,
    selectors: Arc<SiteSelectors>,
    options: PipelineOptions,
}

impl ExtractionPipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, options: PipelineOptions) -> SproutlyResult<Self> {
        Ok(Self {
            fetcher,
            selectors: Arc::new(SiteSelectors::new()?),
            options,
        })
    }

    fn context(&self, operation: &str) -> LogContext {
        LogContext::new("pipeline", operation).with_run_id(self.options.run_id.clone())
    }

    pub async fn run(&self) -> PipelineOutput {
        let started = Instant::now();
        let aggregator = Aggregator::new(self.options.max_products);
        let mut summary = RunSummary {
            run_id: self.options.run_id.clone(),
            ..RunSummary::default()
        };

        let pages = self.discover(&mut summary).await;
        self.scrape_listings(&pages, &aggregator, &mut summary).await;
        if self.options.fetch_details {
            self.enrich_details(&aggregator, &mut summary).await;
        } else {
            debug!("Detail enrichment disabled");
        }

        let finalize = Instant::now();
        let products = aggregator.finalize().await;
        let stats = aggregator.stats().await;
        summary.stages.push(StageInfo {
            stage_name: "finalize".to_string(),
            items_in: stats.products,
            items_out: products.len(),
            processing_time_ms: finalize.elapsed().as_millis() as u64,
        });

        summary.products = products.len();
        summary.merged_observations = stats.merged;
        summary.rejected_products = stats.rejected;
        summary.enriched_products = stats.enriched;
        summary.partial_products = products.iter().filter(|p| p.partial).count();
        summary.duration_ms = started.elapsed().as_millis() as u64;

        PipelineOutput { products, summary }
    }

    /// Fetch the landing page and enumerate listing pages
    async fn discover(&self, summary: &mut RunSummary) -> Vec<PageRef> {
        let limits = &self.options.limits;
        let perf = PerformanceLogger::new(self.context("discover"));

        let nothing_wanted = limits.max_categories == Some(0)
            && limits.max_collections == Some(0)
            && limits.max_occasions == Some(0);
        if nothing_wanted || self.options.max_products == Some(0) {
            info!("No listing pages requested, skipping discovery");
            perf.finish_with_status("Discovery skipped", "skipped");
            return Vec::new();
        }

        let url = &self.options.discovery_url;
        let pages = match self.fetcher.fetch(url, self.options.wait_budget).await {
            Ok(html) => extract::discover_pages(&self.selectors, &html, &self.options.base_url, limits),
            Err(err) => {
                let context = self.context("discover").with_url(url.clone()).with_error_category("network");
                log_warn!(context, "Landing page could not be loaded, nothing to scrape");
                summary.failed_pages.push(FetchFailure::from(&err));
                Vec::new()
            }
        };

        summary.pages_discovered = pages.len();
        summary.stages.push(StageInfo {
            stage_name: "discover".to_string(),
            items_in: 1,
            items_out: pages.len(),
            processing_time_ms: perf.elapsed().as_millis() as u64,
        });
        perf.finish(&format!("Discovered {} listing pages", pages.len()));

        pages
    }

    /// Fetch listing pages in discovery order and merge their products
    async fn scrape_listings(&self, pages: &[PageRef], aggregator: &Aggregator, summary: &mut RunSummary) {
        let perf = PerformanceLogger::new(self.context("listing"));
        let stop = AtomicBool::new(aggregator.is_full().await);
        let mut observed = 0usize;

        let mut outcomes = stream::iter(pages)
            .map(|page| {
                let stop = &stop;
                async move {
                    if stop.load(Ordering::SeqCst) {
                        return (page, ListingOutcome::Skipped);
                    }
                    match self.fetcher.fetch(&page.url, self.options.wait_budget).await {
                        Ok(html) => {
                            let listing = extract::extract_listing(
                                &self.selectors,
                                &html,
                                page,
                                &self.options.base_url,
                                self.options.today,
                                self.options.max_per_category,
                            );
                            (page, ListingOutcome::Parsed(listing))
                        }
                        Err(err) => (page, ListingOutcome::Failed(err)),
                    }
                }
            })
            .buffered(self.options.concurrency);

        while let Some((page, outcome)) = outcomes.next().await {
            match outcome {
                ListingOutcome::Parsed(listing) => {
                    summary.pages_scraped += 1;
                    summary.parse_warnings += listing.warnings.len();
                    for warning in &listing.warnings {
                        warn!("Skipped {}", warning);
                    }

                    let mut new_products = 0;
                    for record in listing.items {
                        observed += 1;
                        if aggregator.observe(page, record).await == Observation::New {
                            new_products += 1;
                        }
                    }

                    let context = self
                        .context("listing")
                        .with_url(page.url.clone())
                        .with_string_field("kind", page.kind.to_string())
                        .with_number_field("new_products", new_products as i64);
                    log_info!(context, "Listing page merged");
                }
                ListingOutcome::Failed(err) => {
                    let context = self
                        .context("listing")
                        .with_url(page.url.clone())
                        .with_status("failed")
                        .with_error_category(if err.is_transient() { "transient" } else { "permanent" });
                    log_warn!(context, "Listing page failed, continuing");
                    summary.failed_pages.push(FetchFailure::from(&err));
                }
                ListingOutcome::Skipped => summary.pages_skipped += 1,
            }

            if !stop.load(Ordering::SeqCst) && aggregator.is_full().await {
                info!("Product cap reached, no further listing pages will be fetched");
                stop.store(true, Ordering::SeqCst);
            }
        }

        summary.stages.push(StageInfo {
            stage_name: "listing".to_string(),
            items_in: pages.len(),
            items_out: observed,
            processing_time_ms: perf.elapsed().as_millis() as u64,
        });
        perf.finish(&format!(
            "Scraped {} of {} listing pages",
            summary.pages_scraped,
            pages.len()
        ));
    }

    /// Visit detail pages of products that have not been enriched
    async fn enrich_details(&self, aggregator: &Aggregator, summary: &mut RunSummary) {
        let perf = PerformanceLogger::new(self.context("detail"));
        let pending = aggregator.pending_enrichment().await;
        let total = pending.len();
        info!("Fetching {} detail pages", total);

        let mut results = stream::iter(pending)
            .map(|product| async move {
                let result = self
                    .fetcher
                    .fetch(&product.url, self.options.wait_budget)
                    .await
                    .map(|html| {
                        extract::extract_detail(&self.selectors, &html, &self.options.base_url, self.options.today)
                    });
                (product, result)
            })
            .buffer_unordered(self.options.concurrency);

        let mut enriched = 0usize;
        while let Some((product, result)) = results.next().await {
            match result {
                Ok(enrichment) => {
                    if aggregator.enrich(&product.id, enrichment).await {
                        enriched += 1;
                        debug!("Enriched {} ({})", product.name, product.id);
                    }
                }
                Err(err) => {
                    let context = self
                        .context("detail")
                        .with_url(product.url.clone())
                        .with_product_id(product.id.to_string())
                        .with_status("partial");
                    log_warn!(context, "Detail page failed, keeping listing data");
                    aggregator.mark_partial(&product.id, &err.to_string()).await;
                }
            }
        }

        summary.stages.push(StageInfo {
            stage_name: "detail".to_string(),
            items_in: total,
            items_out: enriched,
            processing_time_ms: perf.elapsed().as_millis() as u64,
        });
        perf.finish(&format!("Enriched {} of {} products", enriched, total));
    }
}
