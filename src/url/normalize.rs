use crate::UrlError;
use url::Url;

/// Path suffixes that never lead to an HTML page
const IGNORED_EXTENSIONS: &[&str] = &[
    // Images
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".bmp", ".tiff", ".avif",
    // Documents
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".odt", ".ods",
    // Archives
    ".zip", ".rar", ".tar", ".gz", ".7z",
    // Media
    ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".wav", ".ogg", ".webm",
    // Stylesheets, scripts, feeds and fonts
    ".css", ".js", ".json", ".xml", ".rss", ".atom", ".woff", ".woff2", ".ttf", ".eot",
    // Binaries
    ".exe", ".dmg", ".apk", ".msi",
];

/// Path segments used by CMSes for uploaded media
const ASSET_PATH_SEGMENTS: &[&str] = &["/wp-content/uploads/"];

/// Href prefixes that are never followed
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Normalizes an absolute URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but http and https
/// 3. Lowercase the host
/// 4. Drop the fragment and the query string
///
/// Scheme and `www.` prefix are kept as-is: sellers that only answer on plain
/// HTTP or only on `www` must stay reachable. Use [`url_key`] to compare pages.
///
/// # Examples
///
/// ```
/// use backlink_scout::url::normalize_url;
///
/// let url = normalize_url("https://WWW.Example.FR/page?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.fr/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    if host.chars().any(|c| c.is_ascii_uppercase()) {
        let lower = host.to_lowercase();
        url.set_host(Some(&lower))
            .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
    }

    url.set_fragment(None);
    url.set_query(None);

    Ok(url)
}

/// Key under which a page is deduplicated
///
/// Same as the URL with a leading `www.` removed from the host, so a site
/// linking to both `www.a.fr/x` and `a.fr/x` is fetched once.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use backlink_scout::url::url_key;
///
/// let www = Url::parse("https://www.seller.fr/contact").unwrap();
/// let bare = Url::parse("https://seller.fr/contact").unwrap();
/// assert_eq!(url_key(&www), url_key(&bare));
/// ```
pub fn url_key(url: &Url) -> String {
    match url.host_str().and_then(|h| h.strip_prefix("www.")) {
        Some(bare) if !bare.is_empty() => {
            let mut key = url.clone();
            match key.set_host(Some(bare)) {
                Ok(()) => key.into(),
                Err(_) => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

/// Resolves an href found on `base` into a crawlable, canonical URL
///
/// Returns `None` when the link should be ignored:
/// - empty or fragment-only hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - hrefs that do not resolve to an http(s) URL
/// - paths ending in a non-HTML extension or inside an upload directory
///
/// # Examples
///
/// ```
/// use url::Url;
/// use backlink_scout::url::normalize_link;
///
/// let base = Url::parse("https://seller.fr/blog/").unwrap();
/// let link = normalize_link(&base, "../contact#form").unwrap();
/// assert_eq!(link.as_str(), "https://seller.fr/contact");
///
/// assert!(normalize_link(&base, "mailto:hello@seller.fr").is_none());
/// assert!(normalize_link(&base, "/logo.PNG").is_none());
/// ```
pub fn normalize_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    let url = canonicalize(resolved).ok()?;

    if is_asset_path(url.path()) {
        return None;
    }

    Some(url)
}

/// Returns true if the path points at a static asset rather than a page
pub fn is_asset_path(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    IGNORED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || ASSET_PATH_SEGMENTS.iter().any(|seg| path.contains(seg))
}
