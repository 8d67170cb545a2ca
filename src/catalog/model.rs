use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;
use url::Url;

/// Rank offset for images found on the detail page, keeps them after listing images
pub const DETAIL_IMAGE_RANK: u32 = 1000;

/// Canonical product identity: the last path segment of the detail URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Derive the identity from an absolute or site-relative detail URL
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("https://relative.invalid/").ok()?.join(url).ok()?
            }
            Err(_) => return None,
        };

        parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(|segment| Self(segment.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of listing page found in the site navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Category,
    Collection,
    Occasion,
}

impl PageKind {
    /// Map a navigation column headline to a page kind
    pub fn from_headline(headline: &str) -> Option<Self> {
        match headline.trim() {
            "Categories" => Some(Self::Category),
            "Featured" => Some(Self::Collection),
            "Occasions" => Some(Self::Occasion),
            _ => None,
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category => write!(f, "category"),
            Self::Collection => write!(f, "collection"),
            Self::Occasion => write!(f, "occasion"),
        }
    }
}

/// A discovered listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub url: String,
    pub name: String,
    pub kind: PageKind,
    pub discovered_from: String,
    pub slug: String,
}

impl PageRef {
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        kind: PageKind,
        discovered_from: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let slug = slugify(&name);
        Self {
            url: url.into(),
            name,
            kind,
            discovered_from: discovered_from.into(),
            slug,
        }
    }
}

/// Lowercase, words joined with `-`
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Size of a product bundle, read from the name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    Single,
    Double,
    Triple,
}

impl VariantType {
    /// Split `Double The Margot` into (`Double`, `The Margot`)
    pub fn split_name(name: &str) -> (Self, String) {
        let name = name.trim();
        for (prefix, variant) in [("Double ", Self::Double), ("Triple ", Self::Triple)] {
            if let Some(rest) = name.strip_prefix(prefix) {
                let rest = rest.trim();
                if !rest.is_empty() {
                    return (variant, rest.to_string());
                }
            }
        }
        (Self::Single, name.to_string())
    }
}

impl Default for VariantType {
    fn default() -> Self {
        Self::Single
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price {
    pub cents: i64,
    pub currency: String,
}

impl Price {
    pub fn usd(cents: i64) -> Self {
        Self { cents, currency: "USD".to_string() }
    }
}

/// Delivery estimate. Estimates read from a detail page order above
/// listing estimates, then later dates above earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(skip)]
    pub from_detail: bool,
    pub date: NaiveDate,
    pub lead_time_days: i64,
}

impl Delivery {
    /// Delivery estimate relative to `today`
    pub fn from_date(date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            from_detail: false,
            date,
            lead_time_days: (date - today).num_days(),
        }
    }

    /// Mark the estimate as read from the product detail page
    pub fn from_detail_page(self) -> Self {
        Self { from_detail: true, ..self }
    }
}

/// Progress of detail-page enrichment, ordered from least to most advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailStatus {
    Pending,
    Failed,
    Enriched,
}

impl Default for DetailStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Image URLs with the best position each was seen at.
///
/// Serialized as a list ordered by position, then URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet(BTreeMap<String, u32>);

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url` at `rank`, keeping the best rank seen
    pub fn insert(&mut self, url: impl Into<String>, rank: u32) {
        let url = url.into();
        if url.is_empty() {
            return;
        }
        self.0
            .entry(url)
            .and_modify(|existing| *existing = (*existing).min(rank))
            .or_insert(rank);
    }

    pub fn union(&mut self, other: &ImageSet) {
        for (url, rank) in &other.0 {
            self.insert(url.clone(), *rank);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains_key(url)
    }

    /// URLs in output order
    pub fn urls(&self) -> Vec<&str> {
        let mut ranked: Vec<(&u32, &String)> = self.0.iter().map(|(url, rank)| (rank, url)).collect();
        ranked.sort();
        ranked.into_iter().map(|(_, url)| url.as_str()).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ImageSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for (rank, url) in iter.into_iter().enumerate() {
            set.insert(url, rank as u32);
        }
        set
    }
}

impl Serialize for ImageSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.urls())
    }
}

/// Canonical merged representation of one product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub base_name: String,
    pub variant_type: VariantType,
    pub url: String,
    pub price: Option<Price>,
    pub compare_at_price: Option<Price>,
    pub images: ImageSet,
    pub badge: Option<String>,
    pub review_rating: Option<f64>,
    pub review_count: Option<u32>,
    pub description: Option<String>,
    pub care_instructions: Option<String>,
    pub delivery: Option<Delivery>,
    pub stock: u32,
    pub categories: BTreeSet<String>,
    pub collections: BTreeSet<String>,
    pub occasions: BTreeSet<String>,
    pub variants: BTreeSet<ProductId>,
    #[serde(skip)]
    pub detail_status: DetailStatus,
    pub partial: bool,
}

impl ProductRecord {
    /// A listing-level record with nothing but identity and name
    pub fn new(id: ProductId, name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let (variant_type, base_name) = VariantType::split_name(&name);
        Self {
            id,
            name,
            base_name,
            variant_type,
            url: url.into(),
            price: None,
            compare_at_price: None,
            images: ImageSet::new(),
            badge: None,
            review_rating: None,
            review_count: None,
            description: None,
            care_instructions: None,
            delivery: None,
            stock: 0,
            categories: BTreeSet::new(),
            collections: BTreeSet::new(),
            occasions: BTreeSet::new(),
            variants: BTreeSet::new(),
            detail_status: DetailStatus::Pending,
            partial: false,
        }
    }

    /// Set the delivery estimate and the stock level that goes with it
    pub fn set_delivery(&mut self, delivery: Option<Delivery>) {
        self.stock = if delivery.is_some() { 100 } else { 0 };
        self.delivery = delivery;
    }

    /// Record that this product was listed on `page`.
    ///
    /// Categories are keyed by slug, collections and occasions by page name.
    pub fn associate(&mut self, page: &PageRef) {
        match page.kind {
            PageKind::Category => self.categories.insert(page.slug.clone()),
            PageKind::Collection => self.collections.insert(page.name.clone()),
            PageKind::Occasion => self.occasions.insert(page.name.clone()),
        };
    }

    /// Fold another observation of the same product into this one.
    ///
    /// The result does not depend on the order observations arrive in.
    pub fn merge(&mut self, other: &ProductRecord) {
        if self.id != other.id {
            warn!("Refusing to merge {} into {}", other.id, self.id);
            return;
        }

        report_conflict(&self.id, "name", &self.name, &other.name);
        report_conflict_opt(&self.id, "price", &self.price, &other.price);

        self.name = richer(&self.name, &other.name);
        self.base_name = richer(&self.base_name, &other.base_name);
        self.url = richer(&self.url, &other.url);
        self.variant_type = self.variant_type.max(other.variant_type);

        self.price = max_option(&self.price, &other.price);
        self.compare_at_price = max_option(&self.compare_at_price, &other.compare_at_price);
        self.badge = richer_option(&self.badge, &other.badge);
        self.review_rating = match (self.review_rating, other.review_rating) {
            (Some(a), Some(b)) => Some(if a.total_cmp(&b) == Ordering::Less { b } else { a }),
            (a, b) => a.or(b),
        };
        self.review_count = self.review_count.max(other.review_count);
        self.description = richer_option(&self.description, &other.description);
        self.care_instructions = richer_option(&self.care_instructions, &other.care_instructions);
        self.delivery = max_option(&self.delivery, &other.delivery);
        self.stock = self.stock.max(other.stock);

        self.images.union(&other.images);
        self.categories.extend(other.categories.iter().cloned());
        self.collections.extend(other.collections.iter().cloned());
        self.occasions.extend(other.occasions.iter().cloned());
        self.variants.extend(other.variants.iter().cloned());

        self.detail_status = self.detail_status.max(other.detail_status);
        self.partial = self.detail_status != DetailStatus::Enriched && (self.partial || other.partial);
    }
}

/// Pick the richer of two strings: non-empty, then longer, then greater
pub fn richer(a: &str, b: &str) -> String {
    let key = |s: &str| (!s.is_empty(), s.len());
    match key(a).cmp(&key(b)).then_with(|| a.cmp(b)) {
        Ordering::Less => b.to_string(),
        _ => a.to_string(),
    }
}

fn richer_option(a: &Option<String>, b: &Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(richer(a, b)),
        (a, b) => a.clone().or_else(|| b.clone()),
    }
}

fn max_option<T: Ord + Clone>(a: &Option<T>, b: &Option<T>) -> Option<T> {
    a.clone().max(b.clone())
}

fn report_conflict(id: &ProductId, field: &str, a: &str, b: &str) {
    if !a.is_empty() && !b.is_empty() && a != b {
        warn!(
            anomaly = "AggregationConflict",
            product = %id,
            field,
            "Conflicting values '{}' and '{}', keeping '{}'",
            a,
            b,
            richer(a, b)
        );
    }
}

fn report_conflict_opt<T: fmt::Debug + PartialEq>(id: &ProductId, field: &str, a: &Option<T>, b: &Option<T>) {
    if let (Some(a), Some(b)) = (a, b) {
        if a != b {
            warn!(
                anomaly = "AggregationConflict",
                product = %id,
                field,
                "Conflicting values {:?} and {:?}, keeping the greater",
                a,
                b
            );
        }
    }
}
