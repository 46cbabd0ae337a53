//! Crawler module for fetching and mining seller sites
//!
//! This module contains the per-site crawling logic, including:
//! - HTTP fetching with content-type filtering
//! - HTML parsing and link extraction
//! - The breadth-first seller crawl
//! - Email discovery on buyer domains

mod email;
mod fetcher;
mod parser;
mod site;

pub use email::{EmailFinder, EMAIL_DOMAIN_PLACEHOLDER, EMAIL_PAGES, EMAIL_SEPARATOR};
pub use fetcher::{build_http_client, fetch_page, fetch_text, FetchResult};
pub use parser::{extract_hrefs, extract_links};
pub use site::{crawl_site, SiteCrawler, SiteOutcome};
