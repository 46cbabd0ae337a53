/// Checks if a domain equals `base` or is a subdomain of it
///
/// # Examples
///
/// ```
/// use backlink_scout::url::matches_suffix;
///
/// assert!(matches_suffix("gouv.fr", "gouv.fr"));
/// assert!(matches_suffix("gouv.fr", "education.gouv.fr"));
/// assert!(!matches_suffix("gouv.fr", "notgouv.fr"));
/// ```
pub fn matches_suffix(base: &str, candidate: &str) -> bool {
    if candidate == base {
        return true;
    }
    candidate.len() > base.len()
        && candidate.ends_with(base)
        && candidate.as_bytes()[candidate.len() - base.len() - 1] == b'.'
}

/// Returns true if `candidate` matches any entry of `set` exactly or by suffix
pub fn matches_any_suffix<'a, I>(set: I, candidate: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    set.into_iter().any(|base| matches_suffix(base, candidate))
}
