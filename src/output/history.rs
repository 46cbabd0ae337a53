//! Day-by-day history and email-extraction statistics
//!
//! Served by `GET /api/crawl/daily-stats` and `GET /api/crawl/email-stats`.

use crate::output::stats::{day_key, DailyWorkerPages};
use crate::storage::{DailyEmails, Storage, StorageError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

/// Days covered by the daily history
pub const HISTORY_DAYS: u32 = 14;

/// Days covered by the weekly email breakdown
const EMAIL_WEEK_DAYS: u32 = 7;

/// Activity of one UTC day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayStats {
    pub date: String,
    /// Seller pages plus sites probed by email extraction
    pub pages_crawled: u64,
    pub sellers_crawled: u64,
    pub buyers_found: u64,
    /// Emails of buyers created that day plus emails from extraction tasks
    pub emails_found: u64,
    pub workers: Vec<DailyWorkerPages>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayTotals {
    pub pages_crawled: u64,
    pub sellers_crawled: u64,
    pub buyers_found: u64,
    pub emails_found: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyHistory {
    /// Most recent day first
    pub daily_stats: Vec<DayStats>,
    pub totals: DayTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailTotals {
    pub sites_without_email: u64,
    pub sites_with_email: u64,
    pub sellers_without_email: u64,
    /// Share of sites with an email, in percent, one decimal
    pub email_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyWorkerEmails {
    pub worker_id: String,
    pub emails: u64,
    pub sites: u64,
}

impl From<DailyEmails> for DailyWorkerEmails {
    fn from(row: DailyEmails) -> Self {
        Self {
            worker_id: row.worker_id,
            emails: row.emails,
            sites: row.sites,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailDay {
    pub date: String,
    pub emails: u64,
    pub sites: u64,
    pub workers: Vec<DailyWorkerEmails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailStatistics {
    pub totals: EmailTotals,
    pub today: EmailDay,
    /// The last seven days, today first
    pub weekly: Vec<EmailDay>,
}

/// Start of the UTC day containing `at`
fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(at)
}

fn load_email_day(storage: &dyn Storage, date: String) -> Result<EmailDay, StorageError> {
    let workers: Vec<DailyWorkerEmails> = storage
        .daily_emails(&date)?
        .into_iter()
        .map(DailyWorkerEmails::from)
        .collect();
    Ok(EmailDay {
        emails: workers.iter().map(|w| w.emails).sum(),
        sites: workers.iter().map(|w| w.sites).sum(),
        date,
        workers,
    })
}

/// Loads the last `days` UTC days, today first
pub fn load_daily_history(
    storage: &dyn Storage,
    now: DateTime<Utc>,
    days: u32,
) -> Result<DailyHistory, StorageError> {
    let today = day_start(now);
    let mut history = DailyHistory::default();

    for offset in 0..days {
        let start = today - Duration::days(offset as i64);
        let date = day_key(start);

        let workers: Vec<DailyWorkerPages> = storage
            .daily_pages(&date)?
            .into_iter()
            .map(DailyWorkerPages::from)
            .collect();
        let emails = load_email_day(storage, date.clone())?;
        let counts = storage.day_counts(start, start + Duration::days(1))?;

        let day = DayStats {
            date,
            pages_crawled: workers.iter().map(|w| w.pages).sum::<u64>() + emails.sites,
            sellers_crawled: counts.sellers_crawled,
            buyers_found: counts.buyers_found,
            emails_found: counts.buyer_emails + emails.emails,
            workers,
        };

        history.totals.pages_crawled += day.pages_crawled;
        history.totals.sellers_crawled += day.sellers_crawled;
        history.totals.buyers_found += day.buyers_found;
        history.totals.emails_found += day.emails_found;
        history.daily_stats.push(day);
    }

    Ok(history)
}

/// Loads email coverage and the extraction counters of the last week
pub fn load_email_statistics(
    storage: &dyn Storage,
    now: DateTime<Utc>,
) -> Result<EmailStatistics, StorageError> {
    let counts = storage.email_counts()?;
    let known = counts.sites_with_email + counts.sites_without_email;
    let email_rate = if known > 0 {
        (counts.sites_with_email as f64 * 1000.0 / known as f64).round() / 10.0
    } else {
        0.0
    };

    let weekly = (0..EMAIL_WEEK_DAYS)
        .map(|offset| load_email_day(storage, day_key(now - Duration::days(offset as i64))))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EmailStatistics {
        totals: EmailTotals {
            sites_without_email: counts.sites_without_email,
            sites_with_email: counts.sites_with_email,
            sellers_without_email: counts.sellers_without_email,
            email_rate,
        },
        today: weekly.first().cloned().unwrap_or_default(),
        weekly,
    })
}
