use chrono::NaiveDate;
use scraper::Html;
use url::Url;

use super::selectors::{absolute_media_url, first_attr, first_text, SiteSelectors};
use crate::catalog::model::{Delivery, ProductId};

const DESCRIPTION_TITLE: &str = "Description";
const CARE_TITLE: &str = "Care Instructions";

/// Fields read from a product detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub description: Option<String>,
    pub care_instructions: Option<String>,
    /// Lifestyle video shown first in the detail media
    pub video: Option<String>,
    pub images: Vec<String>,
    pub delivery: Option<Delivery>,
    pub variants: Vec<ProductId>,
}

struct Section {
    title: String,
    content: String,
}

pub fn extract_detail(selectors: &SiteSelectors, html: &str, base_url: &Url, today: NaiveDate) -> Enrichment {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let sections: Vec<Section> = document
        .select(&selectors.accordion)
        .filter_map(|accordion| {
            let title = first_text(accordion, &selectors.summary)?;
            let content: String = accordion
                .select(&selectors.accordion_paragraph)
                .map(|p| p.html())
                .collect::<Vec<_>>()
                .join("");
            (!content.trim().is_empty()).then_some(Section { title, content })
        })
        .collect();

    let titled = |title: &str| sections.iter().position(|s| s.title.eq_ignore_ascii_case(title));
    let description_index = titled(DESCRIPTION_TITLE).or_else(|| (!sections.is_empty()).then_some(0));
    let care_index = titled(CARE_TITLE)
        .or_else(|| (sections.len() > 1).then_some(1))
        .filter(|i| Some(*i) != description_index);

    let mut enrichment = Enrichment {
        description: description_index.map(|i| sections[i].content.clone()),
        care_instructions: care_index.map(|i| sections[i].content.clone()),
        ..Enrichment::default()
    };

    for figure in document.select(&selectors.lifestyle_figure) {
        if enrichment.video.is_none() {
            enrichment.video = first_attr(figure, &selectors.video, "data-in-view-video-src")
                .map(|src| absolute_media_url(&src));
        }
        if let Some(src) = first_attr(figure, &selectors.picture_img, "src") {
            let src = absolute_media_url(&src);
            if !enrichment.images.contains(&src) {
                enrichment.images.push(src);
            }
        }
    }

    enrichment.delivery = first_attr(root, &selectors.time, "datetime")
        .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok())
        .map(|date| Delivery::from_date(date, today));

    for link in document.select(&selectors.variant_link) {
        let id = link
            .value()
            .attr("href")
            .and_then(|href| base_url.join(href.trim()).ok())
            .and_then(|url| ProductId::from_url(url.as_str()));
        if let Some(id) = id {
            if !enrichment.variants.contains(&id) {
                enrichment.variants.push(id);
            }
        }
    }

    enrichment
}
