//! In-memory worker liveness table
//!
//! Fed by heartbeats and task assignments. Used for observability only;
//! assignment never depends on it.

use crate::protocol::{Heartbeat, SiteProgress, WorkerInfo, WorkerStats, WorkersReport};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct WorkerEntry {
    hostname: String,
    status: String,
    first_seen: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
    current_task: String,
    tasks_assigned: u64,
    stats: WorkerStats,
    sites_in_progress: Vec<SiteProgress>,
}

impl WorkerEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            hostname: String::new(),
            status: "unknown".to_string(),
            first_seen: now,
            last_heartbeat: None,
            current_task: String::new(),
            tasks_assigned: 0,
            stats: WorkerStats::default(),
            sites_in_progress: Vec::new(),
        }
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.last_heartbeat.unwrap_or(self.first_seen)
    }
}

/// Field-wise max, so a restarted worker never makes totals go backwards
fn merge_stats(current: WorkerStats, reported: WorkerStats) -> WorkerStats {
    WorkerStats {
        tasks_completed: current.tasks_completed.max(reported.tasks_completed),
        buyers_found: current.buyers_found.max(reported.buyers_found),
        emails_found: current.emails_found.max(reported.emails_found),
        errors: current.errors.max(reported.errors),
        pages_crawled: current.pages_crawled.max(reported.pages_crawled),
        results_dropped: current.results_dropped.max(reported.results_dropped),
    }
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerEntry>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_heartbeat(&mut self, heartbeat: &Heartbeat, now: DateTime<Utc>) {
        let entry = self
            .workers
            .entry(heartbeat.worker_id.clone())
            .or_insert_with(|| WorkerEntry::new(now));

        entry.hostname = heartbeat.hostname.clone();
        entry.status = heartbeat.status.clone();
        entry.last_heartbeat = Some(now);
        entry.current_task = heartbeat.current_task.clone();
        entry.stats = merge_stats(entry.stats, heartbeat.stats);
        entry.sites_in_progress = heartbeat.sites_in_progress.clone();
    }

    pub fn record_assignment(&mut self, worker_id: &str, count: usize, now: DateTime<Utc>) {
        let entry = self
            .workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerEntry::new(now));
        entry.tasks_assigned += count as u64;
    }

    pub fn remove(&mut self, worker_id: &str) -> bool {
        self.workers.remove(worker_id).is_some()
    }

    /// Workers seen within `timeout` of `now`
    pub fn active_count(&self, now: DateTime<Utc>, timeout: Duration) -> usize {
        self.workers
            .values()
            .filter(|w| now - w.last_seen() <= timeout)
            .count()
    }

    /// Snapshot for the dashboard, most recently seen first
    pub fn report(&self, now: DateTime<Utc>, timeout: Duration) -> WorkersReport {
        let mut workers: Vec<(DateTime<Utc>, WorkerInfo)> = self
            .workers
            .iter()
            .map(|(id, w)| {
                let alive = now - w.last_seen() <= timeout;
                let info = WorkerInfo {
                    worker_id: id.clone(),
                    hostname: w.hostname.clone(),
                    status: if alive { w.status.clone() } else { "dead".to_string() },
                    alive,
                    first_seen: crate::storage::timestamp(w.first_seen),
                    last_heartbeat: w
                        .last_heartbeat
                        .map(crate::storage::timestamp)
                        .unwrap_or_default(),
                    current_task: w.current_task.clone(),
                    tasks_assigned: w.tasks_assigned,
                    stats: w.stats,
                    sites_in_progress: w.sites_in_progress.clone(),
                };
                (w.last_seen(), info)
            })
            .collect();
        workers.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.worker_id.cmp(&b.1.worker_id)));

        let active = workers.iter().filter(|(_, w)| w.alive).count();
        WorkersReport {
            total: workers.len(),
            active,
            workers: workers.into_iter().map(|(_, w)| w).collect(),
        }
    }
}
