//! Output module for crawl statistics
//!
//! This module handles:
//! - Aggregating seller, buyer and page counts from the coordinator database
//! - The day-by-day history and email-extraction coverage
//! - Printing them for the `stats` subcommand

pub mod history;
pub mod stats;

pub use history::{
    load_daily_history, load_email_statistics, DailyHistory, DayStats, EmailStatistics,
    HISTORY_DAYS,
};
pub use stats::{day_key, load_statistics, print_statistics, CrawlStatistics, DailyWorkerPages};
