//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision,
//! which sort lexicographically in time order.

use crate::protocol::{BuyerCandidate, BuyersBatchAck};
use crate::state::SiteState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CompletionOutcome, DailyEmails, DailyPages, DayCounts, EmailCounts, SiteCompletion, SiteCounts,
    SiteRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SITE_COLUMNS: &str = "id, domain, seed_url, is_seller, is_buyer, crawled, crawled_at, \
     crawl_status, blacklisted, purchased_from, emails, assigned_at, assigned_to, last_error, \
     pages_crawled, buyers_found";

/// Where an email written by `upsert_buyers` came from
const SOURCE_CRAWL: &str = "crawl";

/// Where an email written by `record_email_result` came from
const SOURCE_EMAIL_TASK: &str = "email_task";

/// Formats a timestamp the way it is stored
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        domain: row.get(1)?,
        seed_url: row.get(2)?,
        is_seller: row.get(3)?,
        is_buyer: row.get(4)?,
        crawled: row.get(5)?,
        crawled_at: row.get(6)?,
        crawl_status: row
            .get::<_, Option<String>>(7)?
            .as_deref()
            .and_then(SiteState::from_db_string),
        blacklisted: row.get(8)?,
        purchased_from: row.get(9)?,
        emails: row.get(10)?,
        assigned_at: row.get(11)?,
        assigned_to: row.get(12)?,
        last_error: row.get(13)?,
        pages_crawled: row.get::<_, i64>(14)?.max(0) as u64,
        buyers_found: row.get::<_, i64>(15)?.max(0) as u64,
    })
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and applies the schema
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Sellers =====

    fn insert_seller(&mut self, domain: &str, seed_url: Option<&str>) -> StorageResult<bool> {
        let now = timestamp(Utc::now());
        let existing: Option<(i64, bool)> = self
            .conn
            .query_row(
                "SELECT id, is_seller FROM sites WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((_, true)) => Ok(false),
            Some((id, false)) => {
                self.conn.execute(
                    "UPDATE sites SET is_seller = 1, seed_url = COALESCE(seed_url, ?2), updated_at = ?3
                     WHERE id = ?1",
                    params![id, seed_url, now],
                )?;
                Ok(true)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO sites (domain, seed_url, is_seller, created_at, updated_at)
                     VALUES (?1, ?2, 1, ?3, ?3)",
                    params![domain, seed_url, now],
                )?;
                Ok(true)
            }
        }
    }

    fn get_site(&self, id: i64) -> StorageResult<SiteRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
                params![id],
                site_from_row,
            )
            .optional()?
            .ok_or(StorageError::SiteNotFound(id))
    }

    fn get_site_by_domain(&self, domain: &str) -> StorageResult<Option<SiteRecord>> {
        let site = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE domain = ?1", SITE_COLUMNS),
                params![domain],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn pending_sellers(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sites
             WHERE is_seller = 1 AND crawled = 0 AND blacklisted = 0
               AND (assigned_at IS NULL OR assigned_at < ?1)
             ORDER BY CASE WHEN domain LIKE '%.fr' THEN 0 ELSE 1 END, id
             LIMIT ?2",
            SITE_COLUMNS
        ))?;

        let sites = stmt
            .query_map(
                params![timestamp(lease_cutoff), limit as i64],
                site_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn mark_assigned(
        &mut self,
        ids: &[i64],
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let at = timestamp(at);
        let tx = self.conn.transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE sites SET assigned_at = ?2, assigned_to = ?3, updated_at = ?2 WHERE id = ?1",
                params![id, at, worker_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn complete_site(&mut self, completion: &SiteCompletion) -> StorageResult<CompletionOutcome> {
        let row: Option<(String, bool)> = self
            .conn
            .query_row(
                "SELECT domain, crawled FROM sites WHERE id = ?1",
                params![completion.site_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((domain, already_crawled)) = row else {
            return Err(StorageError::SiteNotFound(completion.site_id));
        };

        let now = timestamp(Utc::now());
        self.conn.execute(
            "UPDATE sites
             SET crawled = 1, crawled_at = ?2, crawl_status = ?3, last_error = ?4,
                 pages_crawled = ?5, buyers_found = ?6,
                 assigned_at = NULL, assigned_to = NULL, updated_at = ?2
             WHERE id = ?1",
            params![
                completion.site_id,
                now,
                completion.status.to_db_string(),
                completion.error,
                completion.pages_crawled as i64,
                completion.buyers_found as i64,
            ],
        )?;

        Ok(CompletionOutcome {
            domain,
            first_completion: !already_crawled,
        })
    }

    fn release_site(&mut self, id: i64, error: Option<&str>) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE sites SET assigned_at = NULL, assigned_to = NULL, last_error = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, error, timestamp(Utc::now())],
        )?;
        if changed == 0 {
            return Err(StorageError::SiteNotFound(id));
        }
        Ok(())
    }

    fn reset_crawled(&mut self, domain: Option<&str>) -> StorageResult<usize> {
        let now = timestamp(Utc::now());
        let changed = match domain {
            Some(domain) => self.conn.execute(
                "UPDATE sites
                 SET crawled = 0, crawled_at = NULL, crawl_status = NULL,
                     assigned_at = NULL, assigned_to = NULL, updated_at = ?1
                 WHERE is_seller = 1 AND (crawled = 1 OR assigned_at IS NOT NULL) AND domain = ?2",
                params![now, domain],
            )?,
            None => self.conn.execute(
                "UPDATE sites
                 SET crawled = 0, crawled_at = NULL, crawl_status = NULL,
                     assigned_at = NULL, assigned_to = NULL, updated_at = ?1
                 WHERE is_seller = 1 AND (crawled = 1 OR assigned_at IS NOT NULL)",
                params![now],
            )?,
        };
        Ok(changed)
    }

    // ===== Buyers =====

    fn upsert_buyers(
        &mut self,
        buyers: &[BuyerCandidate],
        seller_domain: &str,
    ) -> StorageResult<BuyersBatchAck> {
        let now = timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        let mut ack = BuyersBatchAck::default();

        for buyer in buyers {
            let email = buyer
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty());

            let existing: Option<(i64, Option<String>)> = tx
                .query_row(
                    "SELECT id, emails FROM sites WHERE domain = ?1",
                    params![buyer.domain],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO sites
                             (domain, is_buyer, purchased_from, emails, email_found_at, email_source,
                              created_at, updated_at)
                         VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![
                            buyer.domain,
                            seller_domain,
                            email,
                            email.map(|_| now.as_str()),
                            email.map(|_| SOURCE_CRAWL),
                            now
                        ],
                    )?;
                    ack.new_buyers += 1;
                    if email.is_some() {
                        ack.emails_added += 1;
                    }
                }
                Some((id, current)) => {
                    tx.execute(
                        "UPDATE sites
                         SET is_buyer = 1,
                             purchased_from = CASE
                                 WHEN purchased_from IS NULL OR purchased_from = '' THEN ?2
                                 ELSE purchased_from
                             END,
                             updated_at = ?3
                         WHERE id = ?1",
                        params![id, seller_domain, now],
                    )?;

                    let slot_empty = current.as_deref().map_or(true, |c| c.trim().is_empty());
                    if let (Some(email), true) = (email, slot_empty) {
                        tx.execute(
                            "UPDATE sites SET emails = ?2, email_found_at = ?3, email_source = ?4
                             WHERE id = ?1",
                            params![id, email, now, SOURCE_CRAWL],
                        )?;
                        ack.emails_added += 1;
                    }
                }
            }
            ack.total_processed += 1;
        }

        tx.commit()?;
        Ok(ack)
    }

    // ===== Email extraction =====

    fn pending_email_sites(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: usize,
        sellers_first: bool,
    ) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sites
             WHERE blacklisted = 0 AND (emails IS NULL OR emails = '')
               AND (email_crawl_at IS NULL OR email_crawl_at < ?1)
             ORDER BY CASE
                 WHEN ?3 = 0 THEN 0
                 WHEN is_seller = 1 THEN 0
                 WHEN domain LIKE '%.fr' THEN 1
                 ELSE 2
             END, id
             LIMIT ?2",
            SITE_COLUMNS
        ))?;

        let sites = stmt
            .query_map(
                params![timestamp(lease_cutoff), limit as i64, sellers_first],
                site_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn mark_email_assigned(&mut self, ids: &[i64], at: DateTime<Utc>) -> StorageResult<()> {
        let at = timestamp(at);
        let tx = self.conn.transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE sites SET email_crawl_at = ?2 WHERE id = ?1",
                params![id, at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn record_email_result(
        &mut self,
        site_id: i64,
        emails: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        let email = emails.map(str::trim).filter(|e| !e.is_empty());
        let now = timestamp(Utc::now());

        // Every right-hand side sees the row as it was before the update
        let changed = self.conn.execute(
            "UPDATE sites
             SET email_crawl_at = ?2,
                 updated_at = ?2,
                 last_error = COALESCE(?4, last_error),
                 email_found_at = CASE WHEN ?3 IS NOT NULL AND (emails IS NULL OR emails = '')
                                       THEN ?2 ELSE email_found_at END,
                 email_source = CASE WHEN ?3 IS NOT NULL AND (emails IS NULL OR emails = '')
                                     THEN ?5 ELSE email_source END,
                 emails = CASE WHEN ?3 IS NOT NULL AND (emails IS NULL OR emails = '')
                               THEN ?3 ELSE emails END
             WHERE id = ?1",
            params![site_id, now, email, error, SOURCE_EMAIL_TASK],
        )?;
        Ok(changed > 0)
    }

    // ===== Blacklist =====

    fn set_blacklisted(&mut self, domain: &str, blacklisted: bool) -> StorageResult<()> {
        let now = timestamp(Utc::now());
        if blacklisted {
            self.conn.execute(
                "INSERT INTO sites (domain, blacklisted, created_at, updated_at)
                 VALUES (?1, 1, ?2, ?2)
                 ON CONFLICT(domain) DO UPDATE SET blacklisted = 1, updated_at = excluded.updated_at",
                params![domain, now],
            )?;
        } else {
            self.conn.execute(
                "UPDATE sites SET blacklisted = 0, updated_at = ?2 WHERE domain = ?1",
                params![domain, now],
            )?;
        }
        Ok(())
    }

    fn blacklisted_domains(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain FROM sites WHERE blacklisted = 1 ORDER BY domain")?;
        let domains = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(domains)
    }

    // ===== Statistics =====

    fn record_daily_pages(
        &mut self,
        day: &str,
        worker_id: &str,
        pages: u64,
        sellers: u64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO daily_pages (day, worker_id, pages, sellers) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day, worker_id) DO UPDATE SET
                 pages = pages + excluded.pages,
                 sellers = sellers + excluded.sellers",
            params![day, worker_id, pages as i64, sellers as i64],
        )?;
        Ok(())
    }

    fn daily_pages(&self, day: &str) -> StorageResult<Vec<DailyPages>> {
        let mut stmt = self.conn.prepare(
            "SELECT worker_id, pages, sellers FROM daily_pages WHERE day = ?1 ORDER BY worker_id",
        )?;
        let rows = stmt
            .query_map(params![day], |row| {
                Ok(DailyPages {
                    worker_id: row.get(0)?,
                    pages: row.get::<_, i64>(1)?.max(0) as u64,
                    sellers: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn record_daily_emails(
        &mut self,
        day: &str,
        worker_id: &str,
        emails: u64,
        sites: u64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO daily_emails (day, worker_id, emails, sites) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day, worker_id) DO UPDATE SET
                 emails = emails + excluded.emails,
                 sites = sites + excluded.sites",
            params![day, worker_id, emails as i64, sites as i64],
        )?;
        Ok(())
    }

    fn daily_emails(&self, day: &str) -> StorageResult<Vec<DailyEmails>> {
        let mut stmt = self.conn.prepare(
            "SELECT worker_id, emails, sites FROM daily_emails WHERE day = ?1 ORDER BY worker_id",
        )?;
        let rows = stmt
            .query_map(params![day], |row| {
                Ok(DailyEmails {
                    worker_id: row.get(0)?,
                    emails: row.get::<_, i64>(1)?.max(0) as u64,
                    sites: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn day_counts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StorageResult<DayCounts> {
        let counts = self.conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN is_seller = 1 AND crawled = 1
                                        AND crawled_at >= ?1 AND crawled_at < ?2
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN is_buyer = 1 AND created_at >= ?1 AND created_at < ?2
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN is_buyer = 1 AND email_source = ?3
                                        AND created_at >= ?1 AND created_at < ?2
                                   THEN 1 ELSE 0 END), 0)
             FROM sites",
            params![timestamp(start), timestamp(end), SOURCE_CRAWL],
            |row| {
                let count = |i: usize| row.get::<_, i64>(i).map(|n| n.max(0) as u64);
                Ok(DayCounts {
                    sellers_crawled: count(0)?,
                    buyers_found: count(1)?,
                    buyer_emails: count(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    fn email_counts(&self) -> StorageResult<EmailCounts> {
        let counts = self.conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN emails IS NULL OR emails = '' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN emails IS NOT NULL AND emails != '' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN is_seller = 1 AND (emails IS NULL OR emails = '')
                                   THEN 1 ELSE 0 END), 0)
             FROM sites
             WHERE blacklisted = 0",
            [],
            |row| {
                let count = |i: usize| row.get::<_, i64>(i).map(|n| n.max(0) as u64);
                Ok(EmailCounts {
                    sites_without_email: count(0)?,
                    sites_with_email: count(1)?,
                    sellers_without_email: count(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    fn site_counts(&self, since: DateTime<Utc>) -> StorageResult<SiteCounts> {
        let counts = self.conn.query_row(
            "SELECT
                 COALESCE(SUM(is_seller), 0),
                 COALESCE(SUM(CASE WHEN is_seller = 1 AND crawled = 1 THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN is_seller = 1 AND blacklisted = 1 THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN is_seller = 1 AND crawled = 1 AND crawled_at >= ?1
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(is_buyer), 0),
                 COALESCE(SUM(CASE WHEN is_buyer = 1 AND emails IS NOT NULL AND emails != ''
                                   THEN 1 ELSE 0 END), 0)
             FROM sites",
            params![timestamp(since)],
            |row| {
                let count = |i: usize| row.get::<_, i64>(i).map(|n| n.max(0) as u64);
                Ok(SiteCounts {
                    sellers: count(0)?,
                    sellers_crawled: count(1)?,
                    sellers_blacklisted: count(2)?,
                    crawled_since: count(3)?,
                    buyers: count(4)?,
                    buyers_with_email: count(5)?,
                })
            },
        )?;
        Ok(counts)
    }
}
