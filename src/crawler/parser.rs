//! HTML link extraction
//!
//! Returns raw href values; resolution and filtering are done by
//! [`crate::url::normalize_link`] so that every caller applies the same rules.

use scraper::{Html, Selector};
use url::Url;

/// Extracts every href worth considering from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` and `<area href="...">`
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - stylesheets, scripts, images (never selected)
///
/// The parsed document is dropped before returning, so the result can be held
/// across await points.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut hrefs = Vec::new();

    if let Ok(selector) = Selector::parse("a[href], area[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    hrefs
}

/// Extracts hrefs and resolves them against `base` with the crawler's rules
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    extract_hrefs(html)
        .iter()
        .filter_map(|href| crate::url::normalize_link(base, href))
        .collect()
}
