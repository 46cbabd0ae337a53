//! URL handling module for Backlink Scout
//!
//! This module provides link normalization, domain extraction, suffix matching,
//! and the buyer-candidate classification used by the site crawler.

mod domain;
mod matcher;
mod normalize;

use crate::config::ClassifierConfig;

// Re-export main functions
pub use domain::{canonical_domain, default_seed_url, extract_domain};
pub use matcher::{matches_any_suffix, matches_suffix};
pub use normalize::{is_asset_path, normalize_link, normalize_url, url_key};

/// Why an external host was not accepted as a buyer candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Host does not end with an allowed TLD
    Tld,
    /// Host belongs to a social network or large platform
    Social,
    /// Host contains a hard-coded exclusion substring
    Excluded,
    /// Host is blacklisted
    Blacklisted,
}

/// Classification of a link target relative to the seller being crawled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkClass {
    /// Same site as the seller (root host or one of its subdomains)
    Internal,
    /// External domain worth recording as a buyer
    BuyerCandidate,
    /// External domain that must be ignored
    Rejected(RejectReason),
}

/// Read access to a blacklist
///
/// Implementations decide how entries are matched; the shipped ones match a
/// domain exactly or as a parent domain.
pub trait BlacklistLookup {
    fn is_blacklisted(&self, domain: &str) -> bool;
}

impl BlacklistLookup for [String] {
    fn is_blacklisted(&self, domain: &str) -> bool {
        matches_any_suffix(self, domain)
    }
}

impl BlacklistLookup for Vec<String> {
    fn is_blacklisted(&self, domain: &str) -> bool {
        self.as_slice().is_blacklisted(domain)
    }
}

/// Classifies a host discovered on a seller's page
///
/// Checks run in this order:
/// 1. Seller root host or a subdomain of it → `Internal`
/// 2. TLD allow-list (an empty list accepts every TLD)
/// 3. Social / platform domains (exact or parent-domain match)
/// 4. Exclusion substrings
/// 5. Blacklist
///
/// Both hosts are expected in canonical form (see [`canonical_domain`]).
///
/// # Examples
///
/// ```
/// use backlink_scout::config::ClassifierConfig;
/// use backlink_scout::url::{classify_host, LinkClass};
///
/// let rules = ClassifierConfig::default();
/// let blacklist: Vec<String> = vec!["spam.fr".to_string()];
///
/// assert_eq!(classify_host("blog.a.fr", "a.fr", &rules, &blacklist), LinkClass::Internal);
/// assert_eq!(classify_host("b.fr", "a.fr", &rules, &blacklist), LinkClass::BuyerCandidate);
/// assert_ne!(classify_host("spam.fr", "a.fr", &rules, &blacklist), LinkClass::BuyerCandidate);
/// ```
pub fn classify_host<B>(
    candidate: &str,
    seller_root: &str,
    rules: &ClassifierConfig,
    blacklist: &B,
) -> LinkClass
where
    B: BlacklistLookup + ?Sized,
{
    if matches_suffix(seller_root, candidate) {
        return LinkClass::Internal;
    }

    if !rules.allowed_tlds.is_empty()
        && !rules.allowed_tlds.iter().any(|tld| has_tld(candidate, tld))
    {
        return LinkClass::Rejected(RejectReason::Tld);
    }

    if matches_any_suffix(&rules.social_domains, candidate) {
        return LinkClass::Rejected(RejectReason::Social);
    }

    if rules
        .excluded_patterns
        .iter()
        .any(|pattern| candidate.contains(pattern.as_str()))
    {
        return LinkClass::Rejected(RejectReason::Excluded);
    }

    if rules.blacklist.is_blacklisted(candidate) || blacklist.is_blacklisted(candidate) {
        return LinkClass::Rejected(RejectReason::Blacklisted);
    }

    LinkClass::BuyerCandidate
}

fn has_tld(host: &str, tld: &str) -> bool {
    let tld = tld.strip_prefix('.').unwrap_or(tld);
    host.len() > tld.len()
        && host.ends_with(tld)
        && host.as_bytes()[host.len() - tld.len() - 1] == b'.'
}
