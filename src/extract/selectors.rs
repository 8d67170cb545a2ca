use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::error::{SproutlyError, SproutlyResult};

/// CSS selectors for the storefront markup, compiled once
pub struct SiteSelectors {
    // navigation
    pub menu_column: Selector,
    pub menu_headline: Selector,
    pub menu_link: Selector,
    pub strong: Selector,

    // listing cards
    pub product_card: Selector,
    pub product_card_fallback: Selector,
    pub card_title: Selector,
    pub card_link: Selector,
    pub price_regular: Selector,
    pub price_compare: Selector,
    pub media_main_img: Selector,
    pub media_hover_img: Selector,
    pub badge: Selector,
    pub rating_icons: Selector,
    pub rating_count: Selector,
    pub time: Selector,

    // detail page
    pub accordion: Selector,
    pub summary: Selector,
    pub accordion_paragraph: Selector,
    pub lifestyle_figure: Selector,
    pub video: Selector,
    pub picture_img: Selector,
    pub variant_link: Selector,

    /// Dollar amount such as `$1,299.50`
    pub price: Regex,
}

impl SiteSelectors {
    pub fn new() -> SproutlyResult<Self> {
        Ok(Self {
            menu_column: compile(".menu__col")?,
            menu_headline: compile("strong.nav__menu-headline")?,
            menu_link: compile("a.hover-u")?,
            strong: compile("strong")?,

            product_card: compile("#products .product-card")?,
            product_card_fallback: compile(".product-card")?,
            card_title: compile(".product-card__title")?,
            card_link: compile("a.cover[href]")?,
            price_regular: compile("span[data-product-card-price-regular]")?,
            price_compare: compile("s[data-product-card-price-compare]")?,
            media_main_img: compile("picture.product-card__media--main img")?,
            media_hover_img: compile("picture.product-card__media--hover img")?,
            badge: compile(".badge")?,
            rating_icons: compile(".rating-stars__icons")?,
            rating_count: compile(".rating-stars__count")?,
            time: compile("time[datetime]")?,

            accordion: compile(".pdp__accordion")?,
            summary: compile("summary")?,
            accordion_paragraph: compile(".pdp__accordion-content p")?,
            lifestyle_figure: compile(".pdp__lifestyle-grid figure")?,
            video: compile("video[data-in-view-video-src]")?,
            picture_img: compile("picture img")?,
            variant_link: compile(".pdp__variants a[href]")?,

            price: Regex::new(r"([0-9][0-9,]*)(?:\.([0-9]{1,2}))?")
                .map_err(|e| SproutlyError::internal(format!("Invalid price pattern: {}", e)))?,
        })
    }
}

fn compile(css: &str) -> SproutlyResult<Selector> {
    Selector::parse(css).map_err(|e| SproutlyError::internal(format!("Invalid selector '{}': {}", css, e)))
}

/// Text content of an element with whitespace collapsed
pub fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text of the first match of `selector` under `element`, if non-empty
pub fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(text_of)
        .filter(|text| !text.is_empty())
}

/// Attribute of the first match of `selector` under `element`, trimmed and non-empty
pub fn first_attr(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a dollar amount into integer cents
pub fn parse_price_cents(pattern: &Regex, text: &str) -> Option<i64> {
    let captures = pattern.captures(text)?;
    let dollars: i64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
    let cents = match captures.get(2).map(|m| m.as_str()) {
        Some(fraction) if fraction.len() == 1 => fraction.parse::<i64>().ok()? * 10,
        Some(fraction) => fraction.parse::<i64>().ok()?,
        None => 0,
    };
    dollars.checked_mul(100)?.checked_add(cents)
}

/// Prefix protocol-relative URLs with `https:`
pub fn absolute_media_url(src: &str) -> String {
    let src = src.trim();
    match src.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => src.to_string(),
    }
}
