//! Breadth-first crawl of one seller site
//!
//! The crawl fetches pages in batches, classifies every outbound link and
//! streams buyer candidates to the coordinator as they accumulate. Once the
//! frontier is exhausted or the page budget is spent, the buyers are probed
//! for contact emails in a second pass.
//!
//! Cancellation is cooperative. Before the first fetch and then every
//! `check_interval` processed pages, the seller is looked up in the shared
//! blacklist; a hit aborts the crawl. Batches never straddle a checkpoint, so
//! at most `check_interval` pages are fetched after a blacklist update becomes
//! visible. Worker shutdown is checked between batches.

use crate::crawler::fetcher::{fetch_page, FetchResult};
use crate::crawler::parser::extract_links;
use crate::protocol::{BuyerCandidate, BuyersBatch, CrawlResult, SiteTask};
use crate::state::{CrawlState, SiteState};
use crate::url::{classify_host, extract_domain, normalize_url, LinkClass};
use crate::worker::{WorkerContext, WorkerCounters};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use url::Url;

/// How a seller crawl ended
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub state: SiteState,
    pub pages_crawled: u64,
    /// Buyer domains in discovery order
    pub buyers: Vec<String>,
    pub emails_found: u64,
    pub error: Option<String>,
    /// Stopped by worker shutdown; the coordinator should offer the site again
    pub requeue: bool,
}

impl SiteOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: SiteState::Failed,
            pages_crawled: 0,
            buyers: Vec::new(),
            emails_found: 0,
            error: Some(error.into()),
            requeue: false,
        }
    }

    pub fn into_result(self, worker_id: &str, task: &SiteTask) -> CrawlResult {
        CrawlResult {
            worker_id: worker_id.to_string(),
            site_id: task.id,
            domain: task.domain.clone(),
            buyers: self.buyers,
            pages_crawled: self.pages_crawled,
            error: self.error,
            status: Some(self.state),
            requeue: self.requeue,
        }
    }
}

/// Why the BFS loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Exhausted,
    Blacklisted,
    Shutdown,
}

/// One seller crawl; owns its [`CrawlState`] exclusively
pub struct SiteCrawler<'a> {
    ctx: &'a WorkerContext,
    task: &'a SiteTask,
    seller_domain: String,
    state: SiteState,
}

impl<'a> SiteCrawler<'a> {
    pub fn new(ctx: &'a WorkerContext, task: &'a SiteTask) -> Self {
        Self {
            ctx,
            task,
            seller_domain: crate::url::canonical_domain(&task.domain),
            state: SiteState::Queued,
        }
    }

    /// Runs the crawl to completion; never returns an error
    ///
    /// Every failure mode is folded into the returned outcome so that each task
    /// resolves to exactly one result.
    pub async fn run(mut self) -> SiteOutcome {
        self.ctx.progress.start(self.task.id, &self.seller_domain);
        let outcome = self.crawl().await;
        self.ctx.progress.finish(self.task.id);
        outcome
    }

    async fn crawl(&mut self) -> SiteOutcome {
        let ctx = self.ctx;
        let config = &ctx.config;
        let started = Instant::now();

        let seed = match normalize_url(&self.task.url) {
            Ok(seed) => seed,
            Err(e) => {
                self.advance(SiteState::Failed);
                return SiteOutcome::failed(format!("invalid seed URL '{}': {}", self.task.url, e));
            }
        };
        let Some(root) = extract_domain(&seed) else {
            self.advance(SiteState::Failed);
            return SiteOutcome::failed(format!("seed URL '{}' has no host", self.task.url));
        };

        ctx.blacklist.refresh_or_warn().await;
        if self.is_blacklisted(&root) {
            tracing::info!("Skipping {}: seller is blacklisted", self.seller_domain);
            self.advance(SiteState::Aborted);
            return SiteOutcome {
                state: self.state,
                pages_crawled: 0,
                buyers: Vec::new(),
                emails_found: 0,
                error: Some("seller blacklisted".to_string()),
                requeue: false,
            };
        }

        self.advance(SiteState::Running);
        tracing::info!("Crawling {} from {}", self.seller_domain, seed);

        let mut crawl = CrawlState::new(seed);
        let semaphore = Arc::new(Semaphore::new(config.concurrent));
        let check_interval = config.check_interval.max(1);
        let mut processed = 0usize;
        let mut next_check = check_interval;

        let stop = loop {
            if ctx.shutdown.is_cancelled() {
                break Stop::Shutdown;
            }

            let budget = config.max_pages.saturating_sub(crawl.visited_count());
            let limit = config
                .concurrent
                .min(budget)
                .min(next_check - processed);
            if limit == 0 {
                break Stop::Exhausted;
            }

            let batch = crawl.next_batch(limit, config.max_depth);
            if batch.is_empty() {
                break Stop::Exhausted;
            }

            let results = join_all(batch.iter().map(|(url, _)| {
                let semaphore = semaphore.clone();
                async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    fetch_page(&ctx.http, url, config.request_timeout()).await
                }
            }))
            .await;

            for ((url, depth), result) in batch.into_iter().zip(results) {
                processed += 1;
                ctx.progress
                    .record_page(self.task.id, crawl.visited_count() as u64, url.as_str());
                self.process_page(&mut crawl, &root, &url, depth, result)
                    .await;
            }

            if processed >= next_check {
                next_check += check_interval;
                ctx.blacklist.refresh_or_warn().await;
                if self.is_blacklisted(&root) {
                    break Stop::Blacklisted;
                }
            }

            if processed % 100 == 0 {
                tracing::debug!(
                    "{}: {} pages visited, {} in frontier, {} buyers",
                    self.seller_domain,
                    crawl.visited_count(),
                    crawl.frontier_len(),
                    crawl.buyer_count()
                );
            }
        };

        if stop != Stop::Exhausted {
            crawl.clear_frontier();
        }

        // Buyers found so far are valid whatever the reason for stopping
        let pending = crawl.take_pending();
        self.flush(&mut crawl, pending).await;

        let emails_found = if stop == Stop::Exhausted && config.discover_emails {
            self.discover_emails(crawl.buyers()).await
        } else {
            0
        };

        let pages = crawl.visited_count() as u64;
        WorkerCounters::add(&ctx.counters.pages_crawled, pages);

        let (next_state, error, requeue) = match stop {
            Stop::Exhausted => (SiteState::Completed, None, false),
            Stop::Blacklisted => (
                SiteState::Aborted,
                Some("seller blacklisted during crawl".to_string()),
                false,
            ),
            Stop::Shutdown => (
                SiteState::Aborted,
                Some("interrupted by worker shutdown".to_string()),
                true,
            ),
        };
        self.advance(next_state);

        tracing::info!(
            "{} {}: {} pages, {} buyers ({} uploaded), {} emails in {:.1}s",
            self.seller_domain,
            self.state,
            pages,
            crawl.buyer_count(),
            crawl.uploaded_count(),
            emails_found,
            started.elapsed().as_secs_f64()
        );

        SiteOutcome {
            state: self.state,
            pages_crawled: pages,
            buyers: crawl.buyers().to_vec(),
            emails_found,
            error,
            requeue,
        }
    }

    fn advance(&mut self, next: SiteState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(e) => tracing::warn!("{}: {}", self.seller_domain, e),
        }
    }

    fn is_blacklisted(&self, root: &str) -> bool {
        self.ctx.blacklist.contains(&self.seller_domain) || self.ctx.blacklist.contains(root)
    }

    async fn process_page(
        &self,
        crawl: &mut CrawlState,
        root: &str,
        url: &Url,
        depth: u32,
        result: FetchResult,
    ) {
        let (final_url, body) = match result {
            FetchResult::Success { final_url, body } => (final_url, body),
            other => {
                tracing::debug!("Skipping {}: {}", url, other.describe());
                return;
            }
        };

        let config = &self.ctx.config;
        for link in extract_links(&body, &final_url) {
            let Some(host) = extract_domain(&link) else {
                continue;
            };

            match classify_host(&host, root, &self.ctx.rules, self.ctx.blacklist.as_ref()) {
                LinkClass::Internal => {
                    if depth < config.max_depth {
                        crawl.enqueue(link, depth + 1);
                    }
                }
                LinkClass::BuyerCandidate => {
                    if crawl.record_buyer(&host) {
                        if let Some(batch) = crawl.take_full_batch(config.batch_size) {
                            self.flush(crawl, batch).await;
                        }
                    }
                }
                LinkClass::Rejected(_) => {}
            }
        }
    }

    /// Uploads a batch of new buyers and waits for the coordinator's answer
    async fn flush(&self, crawl: &mut CrawlState, buyers: Vec<BuyerCandidate>) {
        if buyers.is_empty() {
            return;
        }
        let count = buyers.len() as u64;
        let domains: Vec<String> = buyers.iter().map(|b| b.domain.clone()).collect();

        WorkerCounters::add(&self.ctx.counters.buyers_found, count);
        if self.upload(buyers).await {
            crawl.mark_uploaded(domains.iter().map(String::as_str));
        }
    }

    async fn upload(&self, buyers: Vec<BuyerCandidate>) -> bool {
        let count = buyers.len();
        let batch = BuyersBatch {
            worker_id: self.ctx.worker_id.clone(),
            site_id: self.task.id,
            seller_domain: self.seller_domain.clone(),
            buyers,
        };

        match self.ctx.coordinator.submit_buyers(&batch).await {
            Ok(ack) => {
                tracing::debug!(
                    "{}: uploaded {} buyers ({} new)",
                    self.seller_domain,
                    count,
                    ack.new_buyers
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    "{}: failed to upload {} buyers: {}",
                    self.seller_domain,
                    count,
                    e
                );
                WorkerCounters::add(&self.ctx.counters.errors, 1);
                false
            }
        }
    }

    /// Probes every buyer for emails and uploads the hits in batches
    async fn discover_emails(&self, buyers: &[String]) -> u64 {
        let ctx = self.ctx;
        let batch_size = ctx.config.batch_size;
        let mut found = 0u64;
        let mut batch: Vec<BuyerCandidate> = Vec::new();

        let mut probes = stream::iter(buyers.iter().cloned())
            .map(|domain| async move {
                let email = ctx.emails.discover(&domain).await;
                (domain, email)
            })
            .buffer_unordered(ctx.config.email_concurrency.max(1));

        while let Some((domain, email)) = probes.next().await {
            let Some(email) = email else {
                continue;
            };
            found += 1;
            batch.push(BuyerCandidate {
                domain,
                email: Some(email),
            });
            if batch.len() >= batch_size {
                self.upload(std::mem::take(&mut batch)).await;
            }
            if ctx.shutdown.is_cancelled() {
                break;
            }
        }

        if !batch.is_empty() {
            self.upload(batch).await;
        }

        WorkerCounters::add(&ctx.counters.emails_found, found);
        found
    }
}

/// Crawls one seller with the shared worker context
pub async fn crawl_site(ctx: &WorkerContext, task: &SiteTask) -> SiteOutcome {
    SiteCrawler::new(ctx, task).run().await
}
