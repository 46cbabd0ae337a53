//! Seller import for the `seed` subcommand
//!
//! One seller per line, either a bare domain or a seed URL. Blank lines and
//! `#` comments are skipped.

use crate::config::validate_domain_string;
use crate::storage::{Storage, StorageResult};
use crate::url::{canonical_domain, extract_domain, normalize_url};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub existing: usize,
    pub invalid: usize,
}

/// Parses one line into `(domain, seed_url)`
pub fn parse_seed_line(line: &str) -> Option<(String, Option<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if line.starts_with("http://") || line.starts_with("https://") {
        let url = normalize_url(line).ok()?;
        let domain = extract_domain(&url)?;
        return Some((domain, Some(url.to_string())));
    }

    let domain = canonical_domain(line);
    validate_domain_string(&domain).ok()?;
    Some((domain, None))
}

/// Registers every seller listed in `content`
pub fn import_sellers(storage: &mut dyn Storage, content: &str) -> StorageResult<SeedReport> {
    let mut report = SeedReport::default();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_seed_line(trimmed) {
            Some((domain, seed_url)) => {
                if storage.insert_seller(&domain, seed_url.as_deref())? {
                    report.inserted += 1;
                } else {
                    report.existing += 1;
                }
            }
            None => {
                tracing::warn!("Skipping invalid seller line: {}", trimmed);
                report.invalid += 1;
            }
        }
    }

    Ok(report)
}
