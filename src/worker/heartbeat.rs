//! Periodic liveness report to the coordinator
//!
//! The reply names in-progress sellers that were blacklisted since the crawl
//! started, along with the coordinator's full moderation list. Together they
//! replace the pushed part of the shared blacklist, where the site crawlers
//! pick them up at their next checkpoint. A domain missing from a reply is
//! no longer pushed.

use crate::protocol::{Heartbeat, HeartbeatReply};
use crate::worker::WorkerContext;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sends a heartbeat every `heartbeat_interval` until `stop` is cancelled
///
/// Failures are logged and never stop the loop.
pub async fn run_heartbeat(ctx: Arc<WorkerContext>, stop: CancellationToken) {
    let mut ticker = interval(ctx.config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                send_once(&ctx).await;
            }
        }
    }

    tracing::debug!("Heartbeat loop stopped");
}

/// Builds the current heartbeat from live progress and counters
pub fn build_heartbeat(ctx: &WorkerContext) -> Heartbeat {
    let sites = ctx.progress.snapshot();
    let stats = ctx.counters.snapshot();
    let in_flight: u64 = sites.iter().map(|s| s.pages).sum();

    let status = if sites.is_empty() { "idle" } else { "crawling" };
    let current_task = sites
        .iter()
        .map(|s| s.domain.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Heartbeat {
        worker_id: ctx.worker_id.clone(),
        hostname: ctx.hostname.clone(),
        status: status.to_string(),
        current_task,
        pages_crawled: stats.pages_crawled + in_flight,
        sites_in_progress: sites,
        stats,
    }
}

/// Sends one heartbeat and applies the cancellations it returns
pub async fn send_once(ctx: &WorkerContext) -> Option<HeartbeatReply> {
    let heartbeat = build_heartbeat(ctx);
    match ctx.coordinator.send_heartbeat(&heartbeat).await {
        Ok(reply) => {
            apply_cancellations(ctx, &reply);
            Some(reply)
        }
        Err(e) => {
            tracing::warn!("Heartbeat failed: {}", e);
            None
        }
    }
}

fn apply_cancellations(ctx: &WorkerContext, reply: &HeartbeatReply) {
    let added = ctx
        .blacklist
        .replace_pushed(reply.cancelled.iter().chain(&reply.blacklisted));
    for domain in added {
        if reply.cancelled.contains(&domain) {
            tracing::info!("Coordinator cancelled {}: seller blacklisted", domain);
        } else {
            tracing::debug!("Coordinator blacklisted {}", domain);
        }
    }
}
