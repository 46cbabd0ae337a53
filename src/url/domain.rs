use url::Url;

/// Extracts the canonical domain from a URL
///
/// The host is lowercased and a leading `www.` is removed, so `www.a.fr` and
/// `a.fr` are the same seller.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use backlink_scout::url::extract_domain;
///
/// let url = Url::parse("https://WWW.Example.FR/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.fr".to_string()));
///
/// let url = Url::parse("https://blog.example.fr/").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.fr".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(canonical_domain).filter(|d| !d.is_empty())
}

/// Lowercases a bare host name and strips a leading `www.`
pub fn canonical_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Builds the seed URL for a seller that has no recorded entry point
pub fn default_seed_url(domain: &str) -> String {
    format!("https://{}", canonical_domain(domain))
}
