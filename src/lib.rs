//! Sproutly - product catalog extraction for a florist storefront
//!
//! The crate discovers listing pages from the storefront navigation,
//! extracts product cards, merges repeated sightings into one record per
//! product, enriches records from their detail pages and writes the result
//! as JSON.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod extract;
pub mod logging;
pub mod scraper;

// Re-export main types for convenience
pub use crate::catalog::{Aggregator, ProductId, ProductRecord};
pub use crate::config::AppConfig;
pub use crate::core::{RunReport, Sproutly};
pub use crate::error::{FetchError, SproutlyError, SproutlyResult};
pub use crate::scraper::PageFetcher;
