//! Storage module for persisting coordinator data
//!
//! This module handles all database operations for the coordinator, including:
//! - SQLite database initialization and schema management
//! - Seller assignment with a soft lease
//! - Idempotent crawl completion
//! - Buyer upserts and blacklist flags
//! - The email-extraction queue for idle workers
//! - Daily page and email counters for statistics
//! - Seller import from plain domain lists

mod schema;
mod seed;
mod sqlite;
mod traits;

pub use seed::{import_sellers, parse_seed_line, SeedReport};
pub use sqlite::{timestamp, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::SiteState;
use std::path::Path;

/// Opens or creates a coordinator database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, StorageError> {
    SqliteStorage::new(path)
}

/// Represents a row of the `sites` table
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub id: i64,
    pub domain: String,
    pub seed_url: Option<String>,
    pub is_seller: bool,
    pub is_buyer: bool,
    pub crawled: bool,
    pub crawled_at: Option<String>,
    pub crawl_status: Option<SiteState>,
    pub blacklisted: bool,
    pub purchased_from: Option<String>,
    pub emails: Option<String>,
    pub assigned_at: Option<String>,
    pub assigned_to: Option<String>,
    pub last_error: Option<String>,
    pub pages_crawled: u64,
    pub buyers_found: u64,
}

/// Final result of one seller crawl, as stored
#[derive(Debug, Clone)]
pub struct SiteCompletion {
    pub site_id: i64,
    pub status: SiteState,
    pub pages_crawled: u64,
    pub buyers_found: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub domain: String,
    /// False when the seller was already marked crawled
    pub first_completion: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteCounts {
    pub sellers: u64,
    pub sellers_crawled: u64,
    pub sellers_blacklisted: u64,
    pub crawled_since: u64,
    pub buyers: u64,
    pub buyers_with_email: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPages {
    pub worker_id: String,
    pub pages: u64,
    pub sellers: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEmails {
    pub worker_id: String,
    pub emails: u64,
    pub sites: u64,
}

/// Activity within one time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCounts {
    pub sellers_crawled: u64,
    pub buyers_found: u64,
    /// Buyers created in the window that already carry an email
    pub buyer_emails: u64,
}

/// Email coverage over non-blacklisted sites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmailCounts {
    pub sites_without_email: u64,
    pub sites_with_email: u64,
    pub sellers_without_email: u64,
}
