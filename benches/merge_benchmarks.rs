//! Merge and aggregation throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use sproutly::catalog::{Aggregator, PageKind, PageRef, Price, ProductId, ProductRecord};

fn observation(slug: &str, variant: usize) -> ProductRecord {
    let mut record = ProductRecord::new(
        ProductId::from_url(&format!("/products/{}", slug)).unwrap(),
        format!("The {} Bouquet", slug),
        format!("https://shop.test/products/{}", slug),
    );
    record.price = Some(Price::usd(6500 + variant as i64 * 100));
    record.images.insert(format!("https://cdn.test/{}-{}.jpg", slug, variant), variant as u32);
    record.badge = (variant % 2 == 0).then(|| "Best Seller".to_string());
    record
}

fn pages() -> Vec<PageRef> {
    ["flowers", "plants", "gifts", "birthday"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = if i < 3 { PageKind::Category } else { PageKind::Occasion };
            PageRef::new(format!("https://shop.test/collections/{}", name), *name, kind, "https://shop.test/")
        })
        .collect()
}

fn record_merge(c: &mut Criterion) {
    let observations: Vec<_> = (0..8).map(|i| observation("margot", i)).collect();

    c.bench_function("merge 8 observations of one product", |b| {
        b.iter(|| {
            let mut merged = observations[0].clone();
            for other in &observations[1..] {
                merged.merge(black_box(other));
            }
            merged
        })
    });
}

fn aggregate_catalog(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pages = pages();
    let listings: Vec<Vec<ProductRecord>> = (0..pages.len())
        .map(|p| (0..200).map(|i| observation(&format!("product-{}", i), p)).collect())
        .collect();

    c.bench_function("aggregate 4 pages x 200 products", |b| {
        b.to_async(&rt).iter(|| async {
            let aggregator = Aggregator::new(None);
            for (page, items) in pages.iter().zip(&listings) {
                for record in items {
                    aggregator.observe(page, record.clone()).await;
                }
            }
            black_box(aggregator.finalize().await)
        })
    });
}

criterion_group!(benches, record_merge, aggregate_catalog);
criterion_main!(benches);
