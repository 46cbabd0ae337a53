//! Task coordinator: the HTTP side of the distributed crawl
//!
//! Hands out uncrawled sellers and email-extraction tasks to workers, ingests
//! buyers and results, and tracks worker liveness from heartbeats. All persistent state
//! lives in SQLite behind [`AppState`].

mod error;
mod handlers;
mod registry;
mod state;

pub use error::ApiError;
pub use registry::WorkerRegistry;
pub use state::AppState;

use crate::protocol::{
    BUYERS_BATCH_PATH, BUYER_PATH, DAILY_STATS_PATH, EMAIL_RESULTS_BATCH_PATH, EMAIL_RESULT_PATH,
    EMAIL_STATS_PATH, EMAIL_TASK_PATH, HEARTBEAT_PATH, RESULT_PATH, STATS_PATH, TASK_PATH,
    WORKERS_PATH, WORKER_PATH,
};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Builds the API router over `state`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(TASK_PATH, get(handlers::get_task))
        .route(RESULT_PATH, post(handlers::post_result))
        .route(BUYERS_BATCH_PATH, post(handlers::post_buyers_batch))
        .route(BUYER_PATH, post(handlers::post_buyer))
        .route(HEARTBEAT_PATH, post(handlers::post_heartbeat))
        .route(EMAIL_TASK_PATH, get(handlers::get_email_task))
        .route(EMAIL_RESULT_PATH, post(handlers::post_email_result))
        .route(
            EMAIL_RESULTS_BATCH_PATH,
            post(handlers::post_email_results_batch),
        )
        .route(WORKERS_PATH, get(handlers::get_workers))
        .route(STATS_PATH, get(handlers::get_stats))
        .route(DAILY_STATS_PATH, get(handlers::get_daily_stats))
        .route(EMAIL_STATS_PATH, get(handlers::get_email_stats))
        .route(
            &format!("{}/:worker_id", WORKER_PATH),
            delete(handlers::delete_worker),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Coordinator listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Coordinator stopped");
    Ok(())
}
