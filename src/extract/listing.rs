use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use super::selectors::{absolute_media_url, first_attr, first_text, parse_price_cents, SiteSelectors};
use crate::catalog::model::{Delivery, ImageSet, PageKind, PageRef, Price, ProductId, ProductRecord};
use crate::error::ParseWarning;

/// Partial products read from one listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<ProductRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse every product card on a listing page.
///
/// Cards missing a link, a name or a price are skipped with a warning.
pub fn extract_listing(
    selectors: &SiteSelectors,
    html: &str,
    page: &PageRef,
    base_url: &Url,
    today: NaiveDate,
    max_per_category: Option<usize>,
) -> ListingPage {
    let document = Html::parse_document(html);
    let mut listing = ListingPage::default();

    let mut cards: Vec<ElementRef<'_>> = document.select(&selectors.product_card).collect();
    if cards.is_empty() {
        cards = document.select(&selectors.product_card_fallback).collect();
    }

    for (index, card) in cards.into_iter().enumerate() {
        match parse_card(selectors, card, base_url, today) {
            Ok(record) => listing.items.push(record),
            Err(reason) => listing.warnings.push(ParseWarning::new(&page.url, index, reason)),
        }
    }

    if page.kind == PageKind::Category {
        if let Some(max) = max_per_category {
            listing.items.truncate(max);
        }
    }

    debug!(
        "{} product(s) and {} warning(s) on {}",
        listing.items.len(),
        listing.warnings.len(),
        page.url
    );

    listing
}

fn parse_card(
    selectors: &SiteSelectors,
    card: ElementRef<'_>,
    base_url: &Url,
    today: NaiveDate,
) -> Result<ProductRecord, String> {
    let link = card
        .select(&selectors.card_link)
        .next()
        .ok_or_else(|| "missing product link".to_string())?;
    let href = link.value().attr("href").map(str::trim).unwrap_or_default();
    let url = base_url
        .join(href)
        .map_err(|e| format!("invalid product link '{}': {}", href, e))?;
    let id = ProductId::from_url(url.as_str())
        .ok_or_else(|| format!("cannot derive product id from '{}'", url))?;

    let name = first_text(card, &selectors.card_title)
        .or_else(|| {
            link.value()
                .attr("title")
                .map(|title| title.trim().trim_start_matches("View ").trim().to_string())
                .filter(|title| !title.is_empty())
        })
        .map(|name| title_case(&name))
        .ok_or_else(|| "missing product name".to_string())?;

    let price_text = first_text(card, &selectors.price_regular).ok_or_else(|| "missing price node".to_string())?;
    let price = parse_price_cents(&selectors.price, &price_text)
        .ok_or_else(|| format!("unparseable price '{}'", price_text))?;

    let mut record = ProductRecord::new(id, name, url.to_string());
    record.price = Some(Price::usd(price));
    record.compare_at_price = first_text(card, &selectors.price_compare)
        .and_then(|text| parse_price_cents(&selectors.price, &text))
        .map(Price::usd);

    record.images = [&selectors.media_main_img, &selectors.media_hover_img]
        .into_iter()
        .filter_map(|selector| {
            card.select(selector).next().and_then(|img| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
                    .map(absolute_media_url)
                    .filter(|src| !src.is_empty())
            })
        })
        .collect::<ImageSet>();

    record.badge = first_text(card, &selectors.badge);
    record.review_rating = first_attr(card, &selectors.rating_icons, "content")
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|rating| *rating > 0.0);
    record.review_count = first_attr(card, &selectors.rating_count, "content")
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|count| *count > 0);

    let delivery = first_attr(card, &selectors.time, "datetime")
        .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok())
        .map(|date| Delivery::from_date(date, today));
    record.set_delivery(delivery);

    Ok(record)
}

/// Capitalize the first letter of each word, lowercase the rest
pub fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut at_word_start = true;

    for ch in text.split_whitespace().collect::<Vec<_>>().join(" ").chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                result.extend(ch.to_uppercase());
            } else {
                result.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            result.push(ch);
            at_word_start = ch != '\'' && !ch.is_numeric();
        }
    }

    result
}
