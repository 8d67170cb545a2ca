use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::{DetailStatus, PageRef, ProductId, ProductRecord, DETAIL_IMAGE_RANK};
use crate::extract::detail::Enrichment;

/// Outcome of observing one listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting of this product
    New,
    /// Folded into an existing record
    Merged,
    /// Product cap reached, record dropped
    Rejected,
}

/// A product still waiting for its detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDetail {
    pub id: ProductId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub products: usize,
    pub merged: usize,
    pub rejected: usize,
    pub enriched: usize,
    pub failed: usize,
}

#[derive(Default)]
struct AggregatorState {
    products: BTreeMap<ProductId, ProductRecord>,
    merged: usize,
    rejected: usize,
}

/// Merges partial product observations into one record per product
pub struct Aggregator {
    state: Mutex<AggregatorState>,
    max_products: Option<usize>,
}

impl Aggregator {
    pub fn new(max_products: Option<usize>) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            max_products,
        }
    }

    /// Merge `record`, seen on `page`, into the catalog
    pub async fn observe(&self, page: &PageRef, mut record: ProductRecord) -> Observation {
        record.associate(page);

        let mut state = self.state.lock().await;
        if let Some(existing) = state.products.get_mut(&record.id) {
            existing.merge(&record);
            state.merged += 1;
            return Observation::Merged;
        }

        if self.max_products.is_some_and(|max| state.products.len() >= max) {
            debug!("Product cap reached, rejecting {}", record.id);
            state.rejected += 1;
            return Observation::Rejected;
        }

        state.products.insert(record.id.clone(), record);
        Observation::New
    }

    /// Whether the product cap has been reached
    pub async fn is_full(&self) -> bool {
        match self.max_products {
            Some(max) => self.state.lock().await.products.len() >= max,
            None => false,
        }
    }

    /// Products whose detail page has not been visited yet, ordered by id
    pub async fn pending_enrichment(&self) -> Vec<PendingDetail> {
        self.state
            .lock()
            .await
            .products
            .values()
            .filter(|record| record.detail_status == DetailStatus::Pending)
            .map(|record| PendingDetail {
                id: record.id.clone(),
                name: record.name.clone(),
                url: record.url.clone(),
            })
            .collect()
    }

    /// Apply detail-page data. Returns false for unknown products.
    pub async fn enrich(&self, id: &ProductId, enrichment: Enrichment) -> bool {
        let mut observation = ProductRecord::new(id.clone(), "", "");
        observation.description = enrichment.description;
        observation.care_instructions = enrichment.care_instructions;
        if let Some(video) = enrichment.video {
            observation.images.insert(video, DETAIL_IMAGE_RANK);
        }
        for (index, image) in enrichment.images.into_iter().enumerate() {
            observation.images.insert(image, DETAIL_IMAGE_RANK + 1 + index as u32);
        }
        if let Some(delivery) = enrichment.delivery {
            observation.set_delivery(Some(delivery.from_detail_page()));
        }
        observation.variants = enrichment
            .variants
            .into_iter()
            .filter(|variant| variant != id)
            .collect();
        observation.detail_status = DetailStatus::Enriched;

        let mut state = self.state.lock().await;
        match state.products.get_mut(id) {
            Some(record) => {
                record.merge(&observation);
                true
            }
            None => {
                warn!("Enrichment for unknown product {}", id);
                false
            }
        }
    }

    /// Flag a product whose detail page could not be loaded
    pub async fn mark_partial(&self, id: &ProductId, reason: &str) -> bool {
        let mut observation = ProductRecord::new(id.clone(), "", "");
        observation.detail_status = DetailStatus::Failed;
        observation.partial = true;

        let mut state = self.state.lock().await;
        match state.products.get_mut(id) {
            Some(record) => {
                warn!("Keeping listing-level data for {}: {}", id, reason);
                record.merge(&observation);
                true
            }
            None => false,
        }
    }

    pub async fn stats(&self) -> AggregatorStats {
        let state = self.state.lock().await;
        let count = |status| state.products.values().filter(|r| r.detail_status == status).count();

        AggregatorStats {
            products: state.products.len(),
            merged: state.merged,
            rejected: state.rejected,
            enriched: count(DetailStatus::Enriched),
            failed: count(DetailStatus::Failed),
        }
    }

    /// Link variant families and return the products ordered by id
    pub async fn finalize(&self) -> Vec<ProductRecord> {
        let mut products = self.state.lock().await.products.clone();

        let mut families: BTreeMap<String, BTreeSet<ProductId>> = BTreeMap::new();
        for record in products.values() {
            if !record.base_name.is_empty() {
                families
                    .entry(record.base_name.to_lowercase())
                    .or_default()
                    .insert(record.id.clone());
            }
        }

        // explicit links are kept only when both ends exist, and made symmetric
        let mut links: BTreeSet<(ProductId, ProductId)> = BTreeSet::new();
        for record in products.values() {
            for variant in &record.variants {
                if products.contains_key(variant) && *variant != record.id {
                    links.insert((record.id.clone(), variant.clone()));
                    links.insert((variant.clone(), record.id.clone()));
                }
            }
        }
        for members in families.values().filter(|members| members.len() > 1) {
            for a in members {
                for b in members.iter().filter(|b| *b != a) {
                    links.insert((a.clone(), b.clone()));
                }
            }
        }

        for record in products.values_mut() {
            record.variants.clear();
        }
        for (from, to) in links {
            if let Some(record) = products.get_mut(&from) {
                record.variants.insert(to);
            }
        }

        products.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{Delivery, PageKind, Price};
    use chrono::NaiveDate;

    fn page(kind: PageKind, name: &str) -> PageRef {
        PageRef::new(
            format!("https://shop.test/collections/{}", name),
            name,
            kind,
            "https://shop.test/",
        )
    }

    fn card(id: &str, name: &str) -> ProductRecord {
        ProductRecord::new(
            ProductId::from_url(id).unwrap(),
            name,
            format!("https://shop.test/products/{}", id),
        )
    }

    fn samples() -> Vec<ProductRecord> {
        let mut a = card("the-margot", "The Margot");
        a.price = Some(Price::usd(6500));
        a.images = ["https://cdn.test/m1.jpg", "https://cdn.test/m2.jpg"].into_iter().collect();
        a.categories.insert("flowers".to_string());

        let mut b = card("the-margot", "The Margot Bouquet");
        b.price = Some(Price::usd(7000));
        b.badge = Some("New".to_string());
        b.images = ["https://cdn.test/m3.jpg", "https://cdn.test/m1.jpg"].into_iter().collect();
        b.collections.insert("best-sellers".to_string());
        b.review_rating = Some(4.5);

        let mut c = card("the-margot", "The Margot");
        c.badge = Some("Best Seller".to_string());
        c.review_rating = Some(4.8);
        c.review_count = Some(12);
        c.detail_status = DetailStatus::Failed;
        c.partial = true;
        c.set_delivery(Some(Delivery::from_date(
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )));

        vec![a, b, c]
    }

    fn merged(mut base: ProductRecord, others: &[&ProductRecord]) -> ProductRecord {
        for other in others {
            base.merge(other);
        }
        base
    }

    #[test]
    fn test_merge_is_commutative() {
        let s = samples();
        for (i, a) in s.iter().enumerate() {
            for b in s.iter().skip(i + 1) {
                assert_eq!(merged(a.clone(), &[b]), merged(b.clone(), &[a]));
            }
        }
    }

    #[test]
    fn test_merge_is_associative() {
        let s = samples();
        let (a, b, c) = (&s[0], &s[1], &s[2]);

        let left = merged(merged(a.clone(), &[b]), &[c]);
        let bc = merged(b.clone(), &[c]);
        let right = merged(a.clone(), &[&bc]);

        assert_eq!(left, right);
        assert_eq!(
            left.images.urls(),
            vec!["https://cdn.test/m1.jpg", "https://cdn.test/m3.jpg", "https://cdn.test/m2.jpg"]
        );
        assert_eq!(left.name, "The Margot Bouquet");
        assert_eq!(left.price, Some(Price::usd(7000)));
        assert_eq!(left.review_rating, Some(4.8));
    }

    #[test]
    fn test_merge_is_idempotent() {
        for record in samples() {
            assert_eq!(merged(record.clone(), &[&record]), record);
        }
        let all = samples();
        let once = merged(all[0].clone(), &[&all[1], &all[2]]);
        assert_eq!(merged(once.clone(), &[&once]), once);
    }

    #[tokio::test]
    async fn test_product_on_two_pages_is_recorded_once() {
        let aggregator = Aggregator::new(None);
        let flowers = page(PageKind::Category, "flowers");
        let birthday = page(PageKind::Occasion, "birthday");

        assert_eq!(aggregator.observe(&flowers, card("the-margot", "The Margot")).await, Observation::New);
        assert_eq!(aggregator.observe(&birthday, card("the-margot", "The Margot")).await, Observation::Merged);

        let products = aggregator.finalize().await;
        assert_eq!(products.len(), 1);
        assert!(products[0].categories.contains("flowers"));
        assert!(products[0].occasions.contains("birthday"));
    }

    #[tokio::test]
    async fn test_duplicate_cards_across_category_pages() {
        let aggregator = Aggregator::new(None);
        let flowers = page(PageKind::Category, "flowers");
        let plants = page(PageKind::Category, "plants");

        // same card twice on one page, then again on another page
        aggregator.observe(&flowers, card("the-margot", "The Margot")).await;
        aggregator.observe(&flowers, card("the-margot", "The Margot")).await;
        aggregator.observe(&plants, card("the-margot", "The Margot")).await;

        let products = aggregator.finalize().await;
        assert_eq!(products.len(), 1);
        assert_eq!(
            products[0].categories.iter().cloned().collect::<Vec<_>>(),
            vec!["flowers".to_string(), "plants".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cap_rejects_new_products_but_merges_existing() {
        let aggregator = Aggregator::new(Some(1));
        let flowers = page(PageKind::Category, "flowers");
        let sale = page(PageKind::Collection, "sale");

        assert_eq!(aggregator.observe(&flowers, card("a", "A")).await, Observation::New);
        assert!(aggregator.is_full().await);
        assert_eq!(aggregator.observe(&flowers, card("b", "B")).await, Observation::Rejected);
        assert_eq!(aggregator.observe(&sale, card("a", "A")).await, Observation::Merged);

        let stats = aggregator.stats().await;
        assert_eq!(stats.products, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.merged, 1);
    }

    #[tokio::test]
    async fn test_zero_cap_rejects_everything() {
        let aggregator = Aggregator::new(Some(0));
        let flowers = page(PageKind::Category, "flowers");
        assert_eq!(aggregator.observe(&flowers, card("a", "A")).await, Observation::Rejected);
        assert!(aggregator.finalize().await.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_and_mark_partial() {
        let aggregator = Aggregator::new(None);
        let flowers = page(PageKind::Category, "flowers");
        aggregator.observe(&flowers, card("a", "A")).await;
        aggregator.observe(&flowers, card("b", "B")).await;

        let a = ProductId::from_url("a").unwrap();
        let b = ProductId::from_url("b").unwrap();

        let enrichment = Enrichment {
            description: Some("<p>Fresh</p>".to_string()),
            images: vec!["https://cdn.test/detail.jpg".to_string()],
            ..Enrichment::default()
        };
        assert!(aggregator.enrich(&a, enrichment).await);
        assert!(aggregator.mark_partial(&b, "HTTP 503").await);
        assert!(!aggregator.mark_partial(&ProductId::from_url("zzz").unwrap(), "gone").await);

        assert!(aggregator.pending_enrichment().await.is_empty());

        let products = aggregator.finalize().await;
        assert_eq!(products[0].description.as_deref(), Some("<p>Fresh</p>"));
        assert!(products[0].images.contains("https://cdn.test/detail.jpg"));
        assert!(!products[0].partial);
        assert!(products[1].partial);
        assert_eq!(products[1].detail_status, DetailStatus::Failed);
        assert_eq!(products[1].name, "B");
    }

    #[tokio::test]
    async fn test_finalize_links_variant_families() {
        let aggregator = Aggregator::new(None);
        let flowers = page(PageKind::Category, "flowers");
        aggregator.observe(&flowers, card("the-margot", "The Margot")).await;
        aggregator.observe(&flowers, card("double-the-margot", "Double The Margot")).await;
        aggregator.observe(&flowers, card("peony", "Peony")).await;
        aggregator.observe(&flowers, card("peony-vase", "Peony Vase")).await;

        let peony = ProductId::from_url("peony").unwrap();
        let vase = ProductId::from_url("peony-vase").unwrap();
        let enrichment = Enrichment {
            variants: vec![vase.clone(), ProductId::from_url("not-listed").unwrap()],
            ..Enrichment::default()
        };
        aggregator.enrich(&peony, enrichment).await;

        let products = aggregator.finalize().await;
        let by_id = |id: &str| products.iter().find(|p| p.id.as_str() == id).unwrap();

        assert!(by_id("the-margot").variants.contains(&ProductId::from_url("double-the-margot").unwrap()));
        assert!(by_id("double-the-margot").variants.contains(&ProductId::from_url("the-margot").unwrap()));
        assert_eq!(by_id("peony").variants.iter().collect::<Vec<_>>(), vec![&vase]);
        assert!(by_id("peony-vase").variants.contains(&peony));
    }
}
