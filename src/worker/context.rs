//! Everything a site crawl or the heartbeat task needs, passed explicitly
//!
//! One `WorkerContext` is built per process and shared behind an `Arc`.

use crate::config::{ClassifierConfig, Config, WorkerConfig};
use crate::crawler::{build_http_client, EmailFinder};
use crate::state::Blacklist;
use crate::worker::client::CoordinatorClient;
use crate::worker::progress::{ProgressTable, WorkerCounters};
use crate::ScoutError;
use reqwest::Client;
use std::sync::Arc;
use sysinfo::System;
use tokio_util::sync::CancellationToken;

pub struct WorkerContext {
    pub worker_id: String,
    pub hostname: String,
    pub config: WorkerConfig,
    pub rules: ClassifierConfig,
    /// Shared connection pool for pages, email probes and coordinator calls
    pub http: Client,
    pub emails: EmailFinder,
    pub coordinator: CoordinatorClient,
    pub blacklist: Arc<Blacklist>,
    pub progress: ProgressTable,
    pub counters: WorkerCounters,
    /// Cancelled on SIGINT/SIGTERM; checked at crawl-loop boundaries
    pub shutdown: CancellationToken,
}

impl WorkerContext {
    pub fn new(config: &Config, shutdown: CancellationToken) -> Result<Self, ScoutError> {
        let hostname = local_hostname();
        let worker_id = config
            .worker
            .worker_id
            .clone()
            .unwrap_or_else(|| default_worker_id(&hostname));

        let http = build_http_client(&config.http)?;
        let timeout = config.worker.request_timeout();
        let emails = EmailFinder::new(http.clone(), timeout, &config.worker.email_url_template)?;
        let coordinator = CoordinatorClient::new(
            http.clone(),
            &config.worker.api_url,
            &worker_id,
            timeout,
            config.worker.result_retry(),
        );

        Ok(Self {
            worker_id,
            hostname,
            config: config.worker.clone(),
            rules: config.classifier.clone(),
            http,
            emails,
            coordinator,
            blacklist: Arc::new(Blacklist::new(&config.classifier)),
            progress: ProgressTable::new(config.worker.recent_urls),
            counters: WorkerCounters::default(),
            shutdown,
        })
    }
}

pub fn local_hostname() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// `worker_<hostname>-<pid>`
pub fn default_worker_id(hostname: &str) -> String {
    format!("worker_{}-{}", hostname, std::process::id())
}
