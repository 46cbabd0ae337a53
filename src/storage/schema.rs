//! Database schema definitions
//!
//! Sellers and buyers share one `sites` table, keyed by domain. A domain can be
//! both: a seller that also bought links elsewhere.

/// SQL schema for the coordinator database
pub const SCHEMA_SQL: &str = r#"
-- Every known domain, seller or buyer
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    seed_url TEXT,
    is_seller INTEGER NOT NULL DEFAULT 0,
    is_buyer INTEGER NOT NULL DEFAULT 0,
    crawled INTEGER NOT NULL DEFAULT 0,
    crawled_at TEXT,
    crawl_status TEXT,
    blacklisted INTEGER NOT NULL DEFAULT 0,
    purchased_from TEXT,
    emails TEXT,
    email_found_at TEXT,
    email_source TEXT,
    email_crawl_at TEXT,
    assigned_at TEXT,
    assigned_to TEXT,
    last_error TEXT,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    buyers_found INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_pending ON sites(is_seller, crawled, blacklisted);
CREATE INDEX IF NOT EXISTS idx_sites_buyer ON sites(is_buyer);
CREATE INDEX IF NOT EXISTS idx_sites_email_crawl ON sites(email_crawl_at);

-- Pages crawled per worker per UTC day
CREATE TABLE IF NOT EXISTS daily_pages (
    day TEXT NOT NULL,
    worker_id TEXT NOT NULL,
    pages INTEGER NOT NULL DEFAULT 0,
    sellers INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (day, worker_id)
);

-- Email-extraction tasks processed per worker per UTC day
CREATE TABLE IF NOT EXISTS daily_emails (
    day TEXT NOT NULL,
    worker_id TEXT NOT NULL,
    emails INTEGER NOT NULL DEFAULT 0,
    sites INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (day, worker_id)
);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
