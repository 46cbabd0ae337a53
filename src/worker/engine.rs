//! Worker main loop
//!
//! Keeps up to `parallel_sites` seller crawls in flight, pulling new tasks from
//! the coordinator whenever a slot frees up, and reports every finished crawl
//! exactly once. With no seller to crawl, the worker runs email-extraction
//! rounds before backing off. A heartbeat task runs alongside for the whole
//! lifetime of the loop.

use crate::crawler::{crawl_site, SiteOutcome};
use crate::protocol::{CrawlResult, SiteTask};
use crate::state::SiteState;
use crate::worker::email_tasks::run_email_round;
use crate::worker::heartbeat::run_heartbeat;
use crate::worker::{WorkerContext, WorkerCounters};
use crate::ScoutError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub struct WorkerEngine {
    ctx: Arc<WorkerContext>,
}

impl WorkerEngine {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Runs until the shutdown token is cancelled, then drains in-flight crawls
    ///
    /// Interrupted crawls still report a result (flagged for requeue) before
    /// this returns.
    pub async fn run(&self) -> Result<(), ScoutError> {
        let ctx = &self.ctx;
        let shutdown = ctx.shutdown.clone();
        let parallel = ctx.config.parallel_sites.max(1);

        tracing::info!(
            "Worker {} starting on {} ({} parallel sites, {} requests per site)",
            ctx.worker_id,
            ctx.hostname,
            parallel,
            ctx.config.concurrent
        );

        let stop_heartbeat = CancellationToken::new();
        let heartbeat = tokio::spawn(run_heartbeat(ctx.clone(), stop_heartbeat.clone()));

        let mut running: JoinSet<()> = JoinSet::new();

        while !shutdown.is_cancelled() {
            let free = parallel.saturating_sub(running.len());
            if free > 0 {
                match ctx.coordinator.fetch_tasks(free).await {
                    Ok(tasks) => {
                        let mut tasks = tasks.into_iter();
                        for task in tasks.by_ref().take(free) {
                            tracing::info!("Assigned site {} ({})", task.id, task.domain);
                            let ctx = ctx.clone();
                            running.spawn(async move {
                                process_task(ctx, task).await;
                            });
                        }
                        for task in tasks {
                            hand_back(ctx, &task).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to fetch tasks: {}", e);
                        WorkerCounters::add(&ctx.counters.errors, 1);
                    }
                }
            }

            if running.is_empty() {
                if ctx.config.email_tasks && run_email_round(ctx).await > 0 {
                    continue;
                }
                tracing::debug!(
                    "No work available, retrying in {:?}",
                    ctx.config.idle_backoff()
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(ctx.config.idle_backoff()) => {}
                }
                continue;
            }

            let has_free_slot = running.len() < parallel;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = running.join_next() => log_join(joined),
                _ = sleep(ctx.config.poll_interval()), if has_free_slot => {}
            }
        }

        if !running.is_empty() {
            tracing::info!("Shutting down, waiting for {} crawls to stop", running.len());
        }
        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }

        stop_heartbeat.cancel();
        if let Err(e) = heartbeat.await {
            tracing::warn!("Heartbeat task ended abnormally: {}", e);
        }

        tracing::info!("Worker {} stopped", ctx.worker_id);
        Ok(())
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Site task ended abnormally: {}", e);
    }
}

/// Returns a site the coordinator sent beyond the free slots
async fn hand_back(ctx: &WorkerContext, task: &SiteTask) {
    tracing::warn!(
        "Coordinator sent more sites than free slots, handing back {} ({})",
        task.id,
        task.domain
    );
    let result = CrawlResult {
        worker_id: ctx.worker_id.clone(),
        site_id: task.id,
        domain: task.domain.clone(),
        buyers: Vec::new(),
        pages_crawled: 0,
        error: Some("no free crawl slot on worker".to_string()),
        status: None,
        requeue: true,
    };
    if let Err(e) = ctx.coordinator.submit_result(&result).await {
        tracing::warn!("Failed to hand back site {}: {}", task.id, e);
        WorkerCounters::add(&ctx.counters.errors, 1);
    }
}

/// Crawls one site and reports its result
pub async fn process_task(ctx: Arc<WorkerContext>, task: SiteTask) -> SiteOutcome {
    report_outcome(&ctx, &task, crawl_site(&ctx, &task)).await
}

/// Awaits `crawl`, updates the counters and submits the result
///
/// A panic inside the crawl is turned into a failed outcome so the
/// coordinator still hears about the site.
pub async fn report_outcome<F>(ctx: &WorkerContext, task: &SiteTask, crawl: F) -> SiteOutcome
where
    F: Future<Output = SiteOutcome>,
{
    let outcome = match AssertUnwindSafe(crawl).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            ctx.progress.finish(task.id);
            let error = ScoutError::Panicked(panic_message(panic.as_ref()));
            tracing::error!("Crawl of {} failed: {}", task.domain, error);
            SiteOutcome::failed(error.to_string())
        }
    };

    if !outcome.requeue {
        WorkerCounters::add(&ctx.counters.tasks_completed, 1);
    }
    if outcome.state == SiteState::Failed {
        WorkerCounters::add(&ctx.counters.errors, 1);
    }

    let result = outcome.clone().into_result(&ctx.worker_id, task);
    if let Err(e) = ctx.coordinator.submit_result_with_retry(&result).await {
        WorkerCounters::add(&ctx.counters.results_dropped, 1);
        tracing::error!(
            "Dropping result for site {} ({}): {}",
            task.id,
            task.domain,
            e
        );
    }

    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
