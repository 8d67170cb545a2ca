//! HTML extraction for the storefront pages.
//!
//! All functions here are synchronous and take the page HTML as `&str`;
//! parsed documents never live across an await point.

pub mod detail;
pub mod listing;
pub mod navigation;
pub mod selectors;

pub use detail::{extract_detail, Enrichment};
pub use listing::{extract_listing, ListingPage};
pub use navigation::{discover_pages, DiscoveryLimits};
pub use selectors::SiteSelectors;
