//! Live progress of in-flight site crawls and aggregate worker counters
//!
//! Site crawlers write here; the heartbeat task only reads snapshots. Locks are
//! never held across an await point.

use crate::protocol::{SiteProgress, WorkerStats};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Entry {
    domain: String,
    pages: u64,
    recent: VecDeque<String>,
}

/// Progress of every site currently crawled by this worker, keyed by site id
#[derive(Debug)]
pub struct ProgressTable {
    sites: Mutex<HashMap<i64, Entry>>,
    recent_limit: usize,
}

impl ProgressTable {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            sites: Mutex::new(HashMap::new()),
            recent_limit,
        }
    }

    pub fn start(&self, site_id: i64, domain: &str) {
        let mut sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        sites.insert(
            site_id,
            Entry {
                domain: domain.to_string(),
                ..Entry::default()
            },
        );
    }

    /// Records a fetched URL and the site's current visited count
    pub fn record_page(&self, site_id: i64, pages: u64, url: &str) {
        let mut sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = sites.get_mut(&site_id) {
            entry.pages = pages;
            entry.recent.push_back(url.to_string());
            while entry.recent.len() > self.recent_limit {
                entry.recent.pop_front();
            }
        }
    }

    pub fn finish(&self, site_id: i64) {
        let mut sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        sites.remove(&site_id);
    }

    /// Copies the current progress, ordered by site id
    pub fn snapshot(&self) -> Vec<SiteProgress> {
        let sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<&i64> = sites.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| sites.get(id))
            .map(|entry| SiteProgress {
                domain: entry.domain.clone(),
                pages: entry.pages,
                recent_urls: entry.recent.iter().cloned().collect(),
            })
            .collect()
    }
}

/// Monotonic counters since worker start
#[derive(Debug, Default)]
pub struct WorkerCounters {
    pub tasks_completed: AtomicU64,
    pub buyers_found: AtomicU64,
    pub emails_found: AtomicU64,
    pub errors: AtomicU64,
    pub pages_crawled: AtomicU64,
    pub results_dropped: AtomicU64,
}

impl WorkerCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            buyers_found: self.buyers_found.load(Ordering::Relaxed),
            emails_found: self.emails_found.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            pages_crawled: self.pages_crawled.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
        }
    }
}
