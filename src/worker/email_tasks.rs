//! Email extraction for sites the coordinator still has no address for
//!
//! Runs when no seller is waiting, so idle workers keep filling the contact
//! column of known buyers and sellers.

use crate::crawler::EMAIL_PAGES;
use crate::protocol::{EmailResult, EmailResultsBatch, EmailTask};
use crate::worker::{WorkerContext, WorkerCounters};
use futures::stream::{self, StreamExt};

/// Fetches one batch of email tasks, probes each site and uploads the outcomes
///
/// Returns the number of sites processed; zero when the queue was empty or
/// the coordinator could not be reached.
pub async fn run_email_round(ctx: &WorkerContext) -> usize {
    let tasks = match ctx
        .coordinator
        .fetch_email_tasks(ctx.config.email_batch_size)
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::warn!("Failed to fetch email tasks: {}", e);
            WorkerCounters::add(&ctx.counters.errors, 1);
            return 0;
        }
    };
    if tasks.is_empty() {
        return 0;
    }

    tracing::info!("Looking for emails on {} sites", tasks.len());

    let results: Vec<EmailResult> = stream::iter(tasks)
        .map(|task| probe_site(ctx, task))
        .buffer_unordered(ctx.config.email_concurrency.max(1))
        .collect()
        .await;

    let processed = results.len();
    let found: u64 = results.iter().map(EmailResult::email_count).sum();
    WorkerCounters::add(&ctx.counters.emails_found, found);

    let batch = EmailResultsBatch {
        worker_id: ctx.worker_id.clone(),
        results,
    };
    match ctx.coordinator.submit_email_results(&batch).await {
        Ok(ack) => tracing::info!(
            "Email round done: {} sites, {} emails",
            ack.sites_processed,
            ack.emails_found
        ),
        Err(e) => {
            tracing::warn!("Failed to upload {} email results: {}", processed, e);
            WorkerCounters::add(&ctx.counters.errors, 1);
        }
    }

    processed
}

async fn probe_site(ctx: &WorkerContext, task: EmailTask) -> EmailResult {
    let (emails, error) = match ctx.emails.site_root(&task.domain) {
        Some(root) => (ctx.emails.discover_at(&root).await, None),
        None => (None, Some(format!("no site root for {}", task.domain))),
    };

    EmailResult {
        site_id: task.id,
        domain: task.domain,
        emails,
        pages_checked: if error.is_some() { 0 } else { EMAIL_PAGES.len() as u64 },
        error,
    }
}
