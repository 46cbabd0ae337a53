//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::protocol::{BuyerCandidate, BuyersBatchAck};
use crate::storage::{
    CompletionOutcome, DailyEmails, DailyPages, DayCounts, EmailCounts, SiteCompletion, SiteCounts,
    SiteRecord,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the coordinator and
/// the admin subcommands. Callers pass canonical domains.
pub trait Storage {
    // ===== Sellers =====

    /// Registers a seller; returns true if the domain was not a seller before
    ///
    /// An existing buyer row with the same domain is promoted to seller.
    fn insert_seller(&mut self, domain: &str, seed_url: Option<&str>) -> StorageResult<bool>;

    fn get_site(&self, id: i64) -> StorageResult<SiteRecord>;

    fn get_site_by_domain(&self, domain: &str) -> StorageResult<Option<SiteRecord>>;

    /// Sellers eligible for assignment, `.fr` domains first, then oldest first
    ///
    /// Excludes crawled and blacklisted sellers, and sellers assigned after
    /// `lease_cutoff`.
    fn pending_sellers(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SiteRecord>>;

    /// Stamps the soft lease on the given sellers
    fn mark_assigned(&mut self, ids: &[i64], worker_id: &str, at: DateTime<Utc>)
        -> StorageResult<()>;

    /// Marks a seller crawled; safe to repeat
    fn complete_site(&mut self, completion: &SiteCompletion) -> StorageResult<CompletionOutcome>;

    /// Drops the lease without marking the seller crawled
    fn release_site(&mut self, id: i64, error: Option<&str>) -> StorageResult<()>;

    /// Clears crawled flags; all sellers when `domain` is `None`
    ///
    /// Returns the number of sellers made eligible again.
    fn reset_crawled(&mut self, domain: Option<&str>) -> StorageResult<usize>;

    // ===== Buyers =====

    /// Upserts buyers found on `seller_domain` in one transaction
    ///
    /// `purchased_from` keeps the first seller a buyer was seen on, and an
    /// email only fills an empty slot.
    fn upsert_buyers(
        &mut self,
        buyers: &[BuyerCandidate],
        seller_domain: &str,
    ) -> StorageResult<BuyersBatchAck>;

    // ===== Email extraction =====

    /// Sites without an email that were not handed out after `lease_cutoff`
    ///
    /// With `sellers_first`, sellers come first, then `.fr` domains, then the
    /// rest; otherwise oldest first. Blacklisted sites are never returned.
    fn pending_email_sites(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: usize,
        sellers_first: bool,
    ) -> StorageResult<Vec<SiteRecord>>;

    /// Stamps the email-extraction lease on the given sites
    fn mark_email_assigned(&mut self, ids: &[i64], at: DateTime<Utc>) -> StorageResult<()>;

    /// Stores one extraction outcome; returns false for an unknown site
    ///
    /// Emails only fill an empty slot. A site left without email becomes
    /// eligible again once its lease expires.
    fn record_email_result(
        &mut self,
        site_id: i64,
        emails: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<bool>;

    // ===== Blacklist =====

    /// Sets or clears the blacklist flag, creating the row if needed
    fn set_blacklisted(&mut self, domain: &str, blacklisted: bool) -> StorageResult<()>;

    fn blacklisted_domains(&self) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    fn record_daily_pages(
        &mut self,
        day: &str,
        worker_id: &str,
        pages: u64,
        sellers: u64,
    ) -> StorageResult<()>;

    fn daily_pages(&self, day: &str) -> StorageResult<Vec<DailyPages>>;

    fn record_daily_emails(
        &mut self,
        day: &str,
        worker_id: &str,
        emails: u64,
        sites: u64,
    ) -> StorageResult<()>;

    fn daily_emails(&self, day: &str) -> StorageResult<Vec<DailyEmails>>;

    /// Aggregate counts; `crawled_since` counts sellers crawled after `since`
    fn site_counts(&self, since: DateTime<Utc>) -> StorageResult<SiteCounts>;

    /// Sellers crawled and buyers created in `[start, end)`
    ///
    /// `buyer_emails` only counts addresses found during a seller crawl.
    fn day_counts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StorageResult<DayCounts>;

    fn email_counts(&self) -> StorageResult<EmailCounts>;
}
