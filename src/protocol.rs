//! JSON wire types of the task-distribution protocol
//!
//! Shared by the worker's coordinator client and the coordinator's handlers so
//! both sides always agree on field names.
//!
//! | Method | Path                            | Request                  | Response             |
//! |--------|---------------------------------|--------------------------|----------------------|
//! | GET    | `/api/crawl/task`               | [`TaskQuery`]            | [`TaskBatch`]        |
//! | POST   | `/api/crawl/result`             | [`CrawlResult`]          | [`Ack`]              |
//! | POST   | `/api/crawl/buyer`              | [`BuyerReport`]          | [`BuyerAck`]         |
//! | POST   | `/api/crawl/buyers_batch`       | [`BuyersBatch`]          | [`BuyersBatchAck`]   |
//! | POST   | `/api/crawl/heartbeat`          | [`Heartbeat`]            | [`HeartbeatReply`]   |
//! | GET    | `/api/crawl/workers`            |                          | [`WorkersReport`]    |
//! | GET    | `/api/crawl/stats`              |                          | `CrawlStatistics`    |
//! | GET    | `/api/crawl/daily-stats`        |                          | `DailyHistory`       |
//! | DELETE | `/api/crawl/worker/{id}`        |                          | [`Ack`]              |
//! | GET    | `/api/crawl/email-task`         | [`EmailTaskQuery`]       | [`EmailTaskBatch`]   |
//! | POST   | `/api/crawl/email-result`       | [`EmailResultReport`]    | [`EmailResultsAck`]  |
//! | POST   | `/api/crawl/email-results-batch`| [`EmailResultsBatch`]    | [`EmailResultsAck`]  |
//! | GET    | `/api/crawl/email-stats`        |                          | `EmailStatistics`    |

use crate::state::SiteState;
use serde::{Deserialize, Serialize};

pub const TASK_PATH: &str = "/api/crawl/task";
pub const RESULT_PATH: &str = "/api/crawl/result";
pub const BUYERS_BATCH_PATH: &str = "/api/crawl/buyers_batch";
pub const HEARTBEAT_PATH: &str = "/api/crawl/heartbeat";
pub const WORKERS_PATH: &str = "/api/crawl/workers";
pub const STATS_PATH: &str = "/api/crawl/stats";
pub const WORKER_PATH: &str = "/api/crawl/worker";
pub const BUYER_PATH: &str = "/api/crawl/buyer";
pub const DAILY_STATS_PATH: &str = "/api/crawl/daily-stats";
pub const EMAIL_TASK_PATH: &str = "/api/crawl/email-task";
pub const EMAIL_RESULT_PATH: &str = "/api/crawl/email-result";
pub const EMAIL_RESULTS_BATCH_PATH: &str = "/api/crawl/email-results-batch";
pub const EMAIL_STATS_PATH: &str = "/api/crawl/email-stats";

/// Query string of the task endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQuery {
    pub worker_id: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1
}

/// One seller handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTask {
    pub id: i64,
    pub domain: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskBatch {
    pub sites: Vec<SiteTask>,
}

/// A discovered buyer, with the emails found for it if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerCandidate {
    pub domain: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl BuyerCandidate {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            email: None,
        }
    }
}

/// Final outcome of one seller crawl
///
/// Sent exactly once per task, whatever the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub worker_id: String,
    pub site_id: i64,
    pub domain: String,
    /// Every buyer domain found on the seller, deduplicated
    #[serde(default)]
    pub buyers: Vec<String>,
    #[serde(default)]
    pub pages_crawled: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<SiteState>,
    /// Crawl was interrupted by worker shutdown; the site should be offered again
    #[serde(default)]
    pub requeue: bool,
}

/// Incremental upload of buyers found mid-crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyersBatch {
    pub worker_id: String,
    pub site_id: i64,
    #[serde(default)]
    pub seller_domain: String,
    pub buyers: Vec<BuyerCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyersBatchAck {
    pub new_buyers: u64,
    pub emails_added: u64,
    pub total_processed: u64,
}

/// Upload of a single buyer as soon as it is found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerReport {
    pub worker_id: String,
    #[serde(default)]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub seller_domain: String,
    #[serde(default)]
    pub buyer_domain: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerAck {
    pub status: String,
    pub new_buyer: bool,
    pub email_added: bool,
}

/// Query string of the email-task endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTaskQuery {
    pub worker_id: String,
    #[serde(default = "default_email_batch_size")]
    pub batch_size: usize,
    /// Sellers before buyers, then `.fr` domains
    #[serde(default = "default_sellers_first")]
    pub sellers_first: bool,
}

fn default_email_batch_size() -> usize {
    20
}

fn default_sellers_first() -> bool {
    true
}

/// A known site that still has no contact email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTask {
    pub id: i64,
    pub domain: String,
    pub url: String,
    #[serde(default)]
    pub is_seller: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailTaskBatch {
    pub sites: Vec<EmailTask>,
}

/// Outcome of one email extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailResult {
    pub site_id: i64,
    #[serde(default)]
    pub domain: String,
    /// `"; "`-joined addresses, absent when nothing was found
    #[serde(default)]
    pub emails: Option<String>,
    #[serde(default)]
    pub pages_checked: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl EmailResult {
    /// Number of addresses carried by this result
    pub fn email_count(&self) -> u64 {
        self.emails.as_deref().map_or(0, count_emails)
    }
}

/// Counts the addresses in a `;`-separated list
pub fn count_emails(emails: &str) -> u64 {
    emails.split(';').filter(|e| !e.trim().is_empty()).count() as u64
}

/// Body of the single-result email endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResultReport {
    pub worker_id: String,
    #[serde(flatten)]
    pub result: EmailResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResultsBatch {
    pub worker_id: String,
    pub results: Vec<EmailResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailResultsAck {
    pub sites_processed: u64,
    pub emails_found: u64,
}

/// Progress snapshot of one in-flight seller crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProgress {
    pub domain: String,
    pub pages: u64,
    #[serde(default)]
    pub recent_urls: Vec<String>,
}

/// Aggregate counters reported by a worker since it started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    #[serde(default)]
    pub tasks_completed: u64,
    #[serde(default)]
    pub buyers_found: u64,
    #[serde(default)]
    pub emails_found: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub pages_crawled: u64,
    #[serde(default)]
    pub results_dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_task: String,
    #[serde(default)]
    pub pages_crawled: u64,
    #[serde(default)]
    pub sites_in_progress: Vec<SiteProgress>,
    #[serde(default)]
    pub stats: WorkerStats,
}

/// Coordinator answer to a heartbeat
///
/// `cancelled` lists the in-progress domains the worker must stop crawling.
/// `blacklisted` is every domain flagged in the coordinator database; the
/// worker replaces its pushed entries with the union of both, so a domain
/// taken off the blacklist is forgotten at the next heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub status: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub cancelled: Vec<String>,
    #[serde(default)]
    pub blacklisted: Vec<String>,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Liveness entry of one worker as tracked by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub hostname: String,
    pub status: String,
    pub alive: bool,
    pub first_seen: String,
    pub last_heartbeat: String,
    pub current_task: String,
    pub tasks_assigned: u64,
    pub stats: WorkerStats,
    pub sites_in_progress: Vec<SiteProgress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersReport {
    pub workers: Vec<WorkerInfo>,
    pub total: usize,
    pub active: usize,
}
