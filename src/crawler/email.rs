//! Email discovery for buyer domains
//!
//! Probes a handful of well-known pages on the buyer's site and scrapes email
//! addresses out of the raw bodies. Individual page failures are ignored.
//!
//! The site root comes from a template such as `https://{domain}/`, so the
//! probes can be routed through a local mirror.

use crate::crawler::fetcher::fetch_text;
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

/// Pages probed on every buyer domain, relative to the site root, home first
pub const EMAIL_PAGES: &[&str] = &["", "contact", "contact-us", "mentions-legales", "a-propos"];

/// Replaced by the buyer domain in the site root template
pub const EMAIL_DOMAIN_PLACEHOLDER: &str = "{domain}";

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

/// Template and placeholder addresses found in themes and page builders
const IGNORED_EMAILS: &[&str] = &[
    "example@example.com",
    "email@example.com",
    "contact@example.com",
    "test@test.com",
    "noreply@example.com",
    "vous@domaine.com",
];

/// Asset suffixes that show up in retina image names such as `logo@2x.png`
const ASSET_MARKERS: &[&str] = &[".png", ".jpg", ".gif", ".js", ".css"];

/// Separator between addresses in the joined result
pub const EMAIL_SEPARATOR: &str = "; ";

#[derive(Debug, Clone)]
pub struct EmailFinder {
    client: Client,
    timeout: Duration,
    pattern: Regex,
    site_template: String,
}

impl EmailFinder {
    pub fn new(
        client: Client,
        timeout: Duration,
        site_template: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            timeout,
            pattern: Regex::new(EMAIL_PATTERN)?,
            site_template: site_template.to_string(),
        })
    }

    /// Site root probed for `domain`, always ending in `/`
    pub fn site_root(&self, domain: &str) -> Option<Url> {
        let url = self.site_template.replace(EMAIL_DOMAIN_PLACEHOLDER, domain);
        let mut root = Url::parse(&url).ok()?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Some(root)
    }

    /// Looks for contact emails on the site of `domain`
    ///
    /// Returns the sorted, `"; "`-joined addresses, or `None` if nothing
    /// survived filtering.
    pub async fn discover(&self, domain: &str) -> Option<String> {
        let root = self.site_root(domain)?;
        self.discover_at(&root).await
    }

    /// Same as [`EmailFinder::discover`] with an explicit site root
    pub async fn discover_at(&self, base: &Url) -> Option<String> {
        let urls: Vec<Url> = EMAIL_PAGES
            .iter()
            .filter_map(|page| base.join(page).ok())
            .collect();

        let bodies = join_all(
            urls.iter()
                .map(|url| fetch_text(&self.client, url, self.timeout)),
        )
        .await;

        let mut found = BTreeSet::new();
        for body in bodies.into_iter().flatten() {
            found.extend(self.extract_emails(&body));
        }

        if found.is_empty() {
            tracing::debug!("No email found on {}", base);
            return None;
        }

        Some(found.into_iter().collect::<Vec<_>>().join(EMAIL_SEPARATOR))
    }

    /// Extracts, lowercases and filters the addresses in a page body
    pub fn extract_emails(&self, text: &str) -> BTreeSet<String> {
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str().trim().to_lowercase())
            .filter(|email| is_plausible_email(email))
            .collect()
    }
}

fn is_plausible_email(email: &str) -> bool {
    if IGNORED_EMAILS.contains(&email) {
        return false;
    }

    let local = email.split('@').next().unwrap_or("");
    !ASSET_MARKERS
        .iter()
        .any(|marker| local.contains(marker) || email.ends_with(marker))
}
