use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like user agent; many seller sites serve bot user agents an empty shell.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Main configuration structure for Backlink Scout
///
/// Every section is optional; a missing file or section falls back to the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub classifier: ClassifierConfig,
    pub http: HttpConfig,
    pub coordinator: CoordinatorConfig,
}

/// Worker engine and per-site crawl behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Base URL of the coordinator API (e.g. `http://10.0.0.2:8080`)
    pub api_url: String,

    /// Worker identity; derived from hostname and pid when absent
    pub worker_id: Option<String>,

    /// Number of sellers crawled concurrently by one worker
    pub parallel_sites: usize,

    /// In-flight page fetches allowed for a single seller crawl
    pub concurrent: usize,

    /// Page budget per seller
    pub max_pages: usize,

    /// Maximum link depth followed from the seed URL
    pub max_depth: u32,

    /// Buyers accumulated before a `buyers_batch` upload
    pub batch_size: usize,

    /// Pages processed between two blacklist checks
    pub check_interval: usize,

    pub heartbeat_interval_ms: u64,

    /// Per-request timeout for page and email fetches
    pub request_timeout_ms: u64,

    /// Sleep when the coordinator has no work and nothing is running
    pub idle_backoff_ms: u64,

    /// Upper bound on how long the engine waits before trying to refill slots
    pub poll_interval_ms: u64,

    /// Concurrent buyer domains probed for emails
    pub email_concurrency: usize,

    pub discover_emails: bool,

    /// Site root probed for a buyer's emails; `{domain}` is replaced by the
    /// buyer domain
    pub email_url_template: String,

    /// Fetch email-extraction tasks from the coordinator when no seller is
    /// available
    pub email_tasks: bool,

    /// Sites asked for per email-extraction request
    pub email_batch_size: usize,

    /// Recently fetched URLs reported per site in heartbeats
    pub recent_urls: usize,

    /// Total time spent retrying a final result submission
    pub result_retry_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            worker_id: None,
            parallel_sites: 4,
            concurrent: 25,
            max_pages: 5000,
            max_depth: 10,
            batch_size: 20,
            check_interval: 10,
            heartbeat_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            idle_backoff_ms: 60_000,
            poll_interval_ms: 10_000,
            email_concurrency: 10,
            discover_emails: true,
            email_url_template: "https://{domain}/".to_string(),
            email_tasks: true,
            email_batch_size: 20,
            recent_urls: 5,
            result_retry_ms: 60_000,
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn result_retry(&self) -> Duration {
        Duration::from_millis(self.result_retry_ms)
    }
}

/// Candidate classification rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    /// Accepted host suffixes (e.g. ".fr"); empty accepts every TLD
    pub allowed_tlds: Vec<String>,

    /// Social and platform domains, matched exactly or as a parent domain
    pub social_domains: Vec<String>,

    /// Substrings that reject a host wherever they appear
    pub excluded_patterns: Vec<String>,

    /// Static blacklist, matched exactly or as a parent domain
    pub blacklist: Vec<String>,

    /// Optional file with one blacklisted domain per line
    pub blacklist_file: Option<PathBuf>,

    /// How long a loaded blacklist file stays fresh
    pub blacklist_ttl_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            allowed_tlds: strings(&[".fr"]),
            social_domains: strings(&[
                "facebook.com",
                "twitter.com",
                "instagram.com",
                "linkedin.com",
                "youtube.com",
                "tiktok.com",
                "pinterest.com",
                "google.com",
                "apple.com",
                "microsoft.com",
                "amazon.com",
                "amazon.fr",
            ]),
            excluded_patterns: strings(&[
                "google.com",
                "apple.com",
                "microsoft.com",
                "mozilla.org",
                "amazon.com",
                "amazon.es",
                "amazon.fr",
                "amzn.to",
                "uecdn.es",
                "cloudflare.com",
                "akamai.net",
            ]),
            blacklist: strings(&[
                "cnil.fr",
                "gouv.fr",
                "diplomatie.gouv.fr",
                "education.gouv.fr",
                "economie.gouv.fr",
                "interieur.gouv.fr",
                "service-public.fr",
                "legifrance.gouv.fr",
                "senat.fr",
                "assemblee-nationale.fr",
            ]),
            blacklist_file: None,
            blacklist_ttl_ms: 300_000,
        }
    }
}

impl ClassifierConfig {
    pub fn blacklist_ttl(&self) -> Duration {
        Duration::from_millis(self.blacklist_ttl_ms)
    }
}

/// Shared HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub user_agent: String,

    /// Idle keep-alive connections retained per host
    pub pool_max_idle_per_host: usize,

    pub connect_timeout_ms: u64,

    /// Seller sites frequently run with broken certificates
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_max_idle_per_host: 30,
            connect_timeout_ms: 5_000,
            accept_invalid_certs: true,
        }
    }
}

/// Task coordinator server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Listen address
    pub bind: String,

    /// Path to the SQLite database file
    pub database_path: String,

    /// Upper bound on `batch_size` accepted by the task endpoint
    pub max_batch_size: usize,

    /// Upper bound on `batch_size` accepted by the email-task endpoint
    pub max_email_batch_size: usize,

    /// A site handed out within this window is not offered again
    pub lease_secs: u64,

    /// A site handed out for email extraction is not offered again within
    /// this window
    pub email_lease_secs: u64,

    /// Workers silent for longer than this are reported as dead
    pub worker_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            database_path: "crawl.db".to_string(),
            max_batch_size: 50,
            max_email_batch_size: 100,
            lease_secs: 600,
            email_lease_secs: 1800,
            worker_timeout_secs: 600,
        }
    }
}
