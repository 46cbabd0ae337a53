//! Statistics generation from the coordinator database
//!
//! Served by `GET /api/crawl/stats` and printed by the `stats` subcommand.

use crate::storage::{DailyPages, Storage, StorageError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStatistics {
    pub sellers_total: u64,
    pub sellers_crawled: u64,
    pub sellers_remaining: u64,
    pub sellers_blacklisted: u64,

    /// Share of non-blacklisted sellers already crawled, in percent
    pub progress_percent: f64,

    pub buyers_total: u64,
    pub buyers_with_email: u64,

    /// Sellers completed in the last 24 hours
    pub crawled_last_24h: u64,

    /// Pages reported today (UTC), all workers
    pub pages_today: u64,

    /// Workers that sent a heartbeat within the liveness window
    pub active_workers: usize,

    /// Today's pages per worker
    pub daily: Vec<DailyWorkerPages>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyWorkerPages {
    pub worker_id: String,
    pub pages: u64,
    pub sellers: u64,
}

impl From<DailyPages> for DailyWorkerPages {
    fn from(row: DailyPages) -> Self {
        Self {
            worker_id: row.worker_id,
            pages: row.pages,
            sellers: row.sellers,
        }
    }
}

/// The daily counter key for `at`
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Loads statistics from storage
///
/// `active_workers` comes from the coordinator's in-memory registry and is 0
/// when called outside a running coordinator.
pub fn load_statistics(
    storage: &dyn Storage,
    now: DateTime<Utc>,
    active_workers: usize,
) -> Result<CrawlStatistics, StorageError> {
    let counts = storage.site_counts(now - Duration::hours(24))?;
    let daily: Vec<DailyWorkerPages> = storage
        .daily_pages(&day_key(now))?
        .into_iter()
        .map(DailyWorkerPages::from)
        .collect();

    let eligible = counts.sellers.saturating_sub(counts.sellers_blacklisted);
    let remaining = eligible.saturating_sub(counts.sellers_crawled);
    let progress_percent = if eligible > 0 {
        (counts.sellers_crawled.min(eligible) as f64 / eligible as f64) * 100.0
    } else {
        0.0
    };

    Ok(CrawlStatistics {
        sellers_total: counts.sellers,
        sellers_crawled: counts.sellers_crawled,
        sellers_remaining: remaining,
        sellers_blacklisted: counts.sellers_blacklisted,
        progress_percent,
        buyers_total: counts.buyers,
        buyers_with_email: counts.buyers_with_email,
        crawled_last_24h: counts.crawled_since,
        pages_today: daily.iter().map(|d| d.pages).sum(),
        active_workers,
        daily,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Sellers:");
    println!("  Total: {}", stats.sellers_total);
    println!(
        "  Crawled: {} ({:.1}%)",
        stats.sellers_crawled, stats.progress_percent
    );
    println!("  Remaining: {}", stats.sellers_remaining);
    println!("  Blacklisted: {}", stats.sellers_blacklisted);
    println!("  Crawled in last 24h: {}", stats.crawled_last_24h);
    println!();

    println!("Buyers:");
    println!("  Total: {}", stats.buyers_total);
    let email_rate = if stats.buyers_total > 0 {
        (stats.buyers_with_email as f64 / stats.buyers_total as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  With email: {} ({:.1}%)",
        stats.buyers_with_email, email_rate
    );
    println!();

    println!("Pages today: {}", stats.pages_today);
    for row in &stats.daily {
        println!(
            "  {}: {} pages, {} sellers",
            row.worker_id, row.pages, row.sellers
        );
    }

    if stats.active_workers > 0 {
        println!();
        println!("Active workers: {}", stats.active_workers);
    }
}
