//! Worker side of the distributed crawl
//!
//! # Components
//!
//! - `WorkerContext`: configuration, HTTP pool, blacklist and counters shared by all crawls
//! - `CoordinatorClient`: typed calls to the coordinator API
//! - `WorkerEngine`: task polling and the pool of concurrent site crawls
//! - email tasks: contact extraction for known sites while no seller is pending
//! - heartbeat: periodic liveness reports and cancellation intake

mod client;
mod context;
mod email_tasks;
mod engine;
mod heartbeat;
mod progress;

pub use client::CoordinatorClient;
pub use context::{default_worker_id, local_hostname, WorkerContext};
pub use email_tasks::run_email_round;
pub use engine::{process_task, report_outcome, WorkerEngine};
pub use heartbeat::{build_heartbeat, run_heartbeat, send_once};
pub use progress::{ProgressTable, WorkerCounters};
