use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

use super::selectors::{text_of, SiteSelectors};
use crate::catalog::model::{PageKind, PageRef};

/// Collections that list everything or filter by delivery day
pub const IGNORED_COLLECTIONS: [&str; 3] = ["shop all", "today", "tomorrow"];

/// Per-kind limits on discovered pages. `Some(0)` skips the kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryLimits {
    pub max_categories: Option<usize>,
    pub max_collections: Option<usize>,
    pub max_occasions: Option<usize>,
}

impl DiscoveryLimits {
    fn for_kind(&self, kind: PageKind) -> Option<usize> {
        match kind {
            PageKind::Category => self.max_categories,
            PageKind::Collection => self.max_collections,
            PageKind::Occasion => self.max_occasions,
        }
    }
}

/// Enumerate category, collection and occasion pages from the landing page.
///
/// Returns categories, then collections, then occasions, each in document
/// order. URLs are deduplicated within a kind, so a page linked under two
/// headlines is kept once per kind. Missing navigation yields an empty list.
pub fn discover_pages(
    selectors: &SiteSelectors,
    html: &str,
    base_url: &Url,
    limits: &DiscoveryLimits,
) -> Vec<PageRef> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut by_kind: [Vec<PageRef>; 3] = Default::default();

    for column in document.select(&selectors.menu_column) {
        let Some(kind) = column
            .select(&selectors.menu_headline)
            .next()
            .and_then(|headline| PageKind::from_headline(&text_of(headline)))
        else {
            continue;
        };

        for link in column.select(&selectors.menu_link) {
            let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
                continue;
            };
            let Ok(url) = base_url.join(href) else {
                debug!("Skipping unresolvable nav link {}", href);
                continue;
            };

            let name = link
                .select(&selectors.strong)
                .next()
                .map(text_of)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| text_of(link))
                .to_lowercase();

            if name.is_empty() {
                continue;
            }
            if kind == PageKind::Collection && IGNORED_COLLECTIONS.contains(&name.as_str()) {
                debug!("Ignoring collection '{}'", name);
                continue;
            }
            if !seen.insert((kind, url.to_string())) {
                continue;
            }

            by_kind[kind as usize].push(PageRef::new(url.to_string(), name, kind, base_url.as_str()));
        }
    }

    let mut pages = Vec::new();
    for (kind, mut refs) in [PageKind::Category, PageKind::Collection, PageKind::Occasion]
        .into_iter()
        .zip(by_kind)
    {
        if let Some(max) = limits.for_kind(kind) {
            refs.truncate(max);
        }
        info!("Discovered {} {} page(s)", refs.len(), kind);
        pages.extend(refs);
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDING: &str = r#"
        <html><body>
        <div data-nav-menu="shop">
          <div class="menu__col">
            <strong class="nav__menu-headline">Categories</strong>
            <a class="hover-u" href="/collections/flowers"><strong>Flowers</strong> <span>new</span></a>
            <a class="hover-u" href="/collections/plants">Plants</a>
            <a class="hover-u" href="https://shop.test/collections/gifts"> Gifts </a>
          </div>
          <div class="menu__col">
            <strong class="nav__menu-headline">Featured</strong>
            <a class="hover-u" href="/collections/all">Shop All</a>
            <a class="hover-u" href="/collections/today">Today</a>
            <a class="hover-u" href="/collections/best-sellers">Best Sellers</a>
            <a class="hover-u" href="/collections/flowers">Flowers Again</a>
          </div>
          <div class="menu__col">
            <strong class="nav__menu-headline">Occasions</strong>
            <a class="hover-u" href="/collections/birthday">Birthday</a>
            <a class="hover-u" href="/collections/sympathy">Sympathy</a>
          </div>
          <div class="menu__col">
            <strong class="nav__menu-headline">Help</strong>
            <a class="hover-u" href="/pages/faq">FAQ</a>
          </div>
        </div>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://shop.test/").unwrap()
    }

    #[test]
    fn test_discovers_pages_by_kind() {
        let selectors = SiteSelectors::new().unwrap();
        let pages = discover_pages(&selectors, LANDING, &base(), &DiscoveryLimits::default());

        let names: Vec<_> = pages.iter().map(|p| (p.kind, p.name.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (PageKind::Category, "flowers"),
                (PageKind::Category, "plants"),
                (PageKind::Category, "gifts"),
                (PageKind::Collection, "best sellers"),
                (PageKind::Collection, "flowers again"),
                (PageKind::Occasion, "birthday"),
                (PageKind::Occasion, "sympathy"),
            ]
        );
        assert_eq!(pages[0].url, "https://shop.test/collections/flowers");
        assert_eq!(pages[3].slug, "best-sellers");
        assert_eq!(pages[3].discovered_from, "https://shop.test/");
    }

    #[test]
    fn test_limits_truncate_each_kind() {
        let selectors = SiteSelectors::new().unwrap();
        let limits = DiscoveryLimits {
            max_categories: Some(1),
            max_collections: Some(0),
            max_occasions: None,
        };
        let pages = discover_pages(&selectors, LANDING, &base(), &limits);

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].name, "flowers");
        assert!(pages.iter().all(|p| p.kind != PageKind::Collection));
    }

    #[test]
    fn test_shared_url_survives_category_cap() {
        let selectors = SiteSelectors::new().unwrap();
        let html = r#"
            <div class="menu__col">
              <strong class="nav__menu-headline">Categories</strong>
              <a class="hover-u" href="/collections/flowers">Flowers</a>
              <a class="hover-u" href="/collections/flowers">Flowers</a>
            </div>
            <div class="menu__col">
              <strong class="nav__menu-headline">Featured</strong>
              <a class="hover-u" href="/collections/flowers">Flowers</a>
              <a class="hover-u" href="/collections/best-sellers">Best Sellers</a>
            </div>
        "#;

        let all = discover_pages(&selectors, html, &base(), &DiscoveryLimits::default());
        let kinds: Vec<_> = all.iter().map(|p| (p.kind, p.name.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (PageKind::Category, "flowers"),
                (PageKind::Collection, "flowers"),
                (PageKind::Collection, "best sellers"),
            ]
        );

        let limits = DiscoveryLimits {
            max_categories: Some(0),
            ..DiscoveryLimits::default()
        };
        let pages = discover_pages(&selectors, html, &base(), &limits);
        let names: Vec<_> = pages.iter().map(|p| (p.kind, p.url.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (PageKind::Collection, "https://shop.test/collections/flowers"),
                (PageKind::Collection, "https://shop.test/collections/best-sellers"),
            ]
        );
    }

    #[test]
    fn test_missing_navigation_is_empty() {
        let selectors = SiteSelectors::new().unwrap();
        assert!(discover_pages(&selectors, "<html><body><p>maintenance</p>", &base(), &DiscoveryLimits::default()).is_empty());
        assert!(discover_pages(&selectors, "", &base(), &DiscoveryLimits::default()).is_empty());
    }
}
