//! Shared blacklist view
//!
//! Three sources are merged behind one lookup:
//! - the static list from configuration
//! - an optional file, reloaded once its TTL expires
//! - domains pushed at runtime (cancellations returned by the coordinator,
//!   moderation actions)
//!
//! Every source matches a domain exactly or as a parent domain.

use crate::config::ClassifierConfig;
use crate::url::{canonical_domain, matches_suffix, BlacklistLookup};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Entries {
    from_file: HashSet<String>,
    loaded_at: Option<Instant>,
    pushed: HashSet<String>,
}

#[derive(Debug)]
pub struct Blacklist {
    static_entries: HashSet<String>,
    file: Option<PathBuf>,
    ttl: Duration,
    entries: RwLock<Entries>,
}

impl Blacklist {
    /// Builds a blacklist from the classifier configuration
    ///
    /// The file, if any, is not read until the first [`Blacklist::refresh`].
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            static_entries: config.blacklist.iter().map(|d| canonical_domain(d)).collect(),
            file: config.blacklist_file.clone(),
            ttl: config.blacklist_ttl(),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Returns true if `domain` or one of its parent domains is blacklisted
    pub fn contains(&self, domain: &str) -> bool {
        let domain = canonical_domain(domain);
        let hit = |set: &HashSet<String>| set.iter().any(|base| matches_suffix(base, &domain));

        if hit(&self.static_entries) {
            return true;
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        hit(&entries.from_file) || hit(&entries.pushed)
    }

    /// Replaces every runtime entry at once
    ///
    /// Returns the domains that were not pushed before. Static and file
    /// entries are unaffected, so a domain dropped from `domains` stops
    /// matching only if no other source lists it.
    pub fn replace_pushed<I, S>(&self, domains: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pushed: HashSet<String> = domains
            .into_iter()
            .map(|d| canonical_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut added: Vec<String> = pushed
            .iter()
            .filter(|d| !entries.pushed.contains(*d))
            .cloned()
            .collect();
        added.sort();
        entries.pushed = pushed;
        added
    }

    fn is_stale(&self) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.loaded_at {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// Reloads the blacklist file if its TTL has expired
    ///
    /// Returns the number of file entries after the call. On a read failure the
    /// previous entries are kept and the error is returned.
    pub async fn refresh(&self) -> std::io::Result<usize> {
        let Some(path) = &self.file else {
            return Ok(0);
        };

        if !self.is_stale() {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            return Ok(entries.from_file.len());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let loaded = parse_domain_list(&content);
        let count = loaded.len();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.from_file = loaded;
        entries.loaded_at = Some(Instant::now());

        tracing::debug!("Loaded {} blacklist entries from {}", count, path.display());
        Ok(count)
    }

    /// Like [`Blacklist::refresh`], but logs failures instead of returning them
    pub async fn refresh_or_warn(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!("Failed to reload blacklist file: {}", e);
        }
    }
}

impl BlacklistLookup for Blacklist {
    fn is_blacklisted(&self, domain: &str) -> bool {
        self.contains(domain)
    }
}

/// Parses one domain per line; blank lines and `#` comments are skipped
pub fn parse_domain_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(canonical_domain)
        .collect()
}
