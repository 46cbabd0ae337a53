//! Integration tests for the worker main loop
//!
//! The coordinator and the seller sites are wiremock servers; the engine runs
//! in a background task until the test cancels its shutdown token.

use backlink_scout::config::Config;
use backlink_scout::protocol::{
    CrawlResult, EMAIL_RESULTS_BATCH_PATH, EMAIL_TASK_PATH, HEARTBEAT_PATH, RESULT_PATH, TASK_PATH,
};
use backlink_scout::worker::{WorkerContext, WorkerEngine};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine_config(coordinator: &MockServer) -> Config {
    let mut config = Config::default();
    config.worker.api_url = coordinator.uri();
    config.worker.worker_id = Some("engine-worker".to_string());
    config.worker.discover_emails = false;
    config.worker.email_tasks = false;
    config.worker.idle_backoff_ms = 50;
    config.worker.poll_interval_ms = 50;
    config.worker.request_timeout_ms = 5_000;
    config.worker.result_retry_ms = 1_000;
    config
}

/// Coordinator accepting heartbeats and results; task responses are mounted
/// by each test
async fn mock_coordinator() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "worker_id": "engine-worker",
            "cancelled": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESULT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    server
}

/// Seller with a single page, served after `delay`
async fn slow_seller(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>No links</body></html>", "text/html")
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn sites(seller: &MockServer, ids: &[i64]) -> serde_json::Value {
    let sites: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| json!({"id": id, "domain": format!("s{}.fr", id), "url": format!("{}/", seller.uri())}))
        .collect();
    json!({ "sites": sites })
}

async fn mount_tasks(coordinator: &MockServer, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .mount(coordinator)
        .await;
}

async fn mount_no_tasks(coordinator: &MockServer) {
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sites": []})))
        .mount(coordinator)
        .await;
}

fn start(config: &Config) -> (Arc<WorkerContext>, CancellationToken, JoinHandle<()>) {
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(WorkerContext::new(config, shutdown.clone()).unwrap());
    let engine = WorkerEngine::new(ctx.clone());
    let handle = tokio::spawn(async move {
        engine.run().await.unwrap();
    });
    (ctx, shutdown, handle)
}

async fn results(coordinator: &MockServer) -> Vec<CrawlResult> {
    coordinator
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == RESULT_PATH)
        .map(|request| serde_json::from_slice(&request.body).expect("Invalid result"))
        .collect()
}

async fn count_requests(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == endpoint)
        .count()
}

/// Waits until `n` non-requeued results arrived, or five seconds passed
async fn wait_for_completions(coordinator: &MockServer, n: usize) -> Vec<CrawlResult> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let done: Vec<CrawlResult> = results(coordinator)
            .await
            .into_iter()
            .filter(|r| !r.requeue)
            .collect();
        if done.len() >= n || Instant::now() > deadline {
            return done;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_extra_sites_are_handed_back() {
    let coordinator = mock_coordinator().await;
    let seller = slow_seller(Duration::from_millis(300)).await;
    mount_tasks(&coordinator, sites(&seller, &[1, 2, 3]), 1).await;
    mount_no_tasks(&coordinator).await;

    let mut config = engine_config(&coordinator);
    config.worker.parallel_sites = 1;
    let (ctx, shutdown, handle) = start(&config);

    let mut max_in_flight = 0;
    let deadline = Instant::now() + Duration::from_millis(600);
    while Instant::now() < deadline {
        max_in_flight = max_in_flight.max(ctx.progress.snapshot().len());
        sleep(Duration::from_millis(10)).await;
    }

    let done = wait_for_completions(&coordinator, 1).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(max_in_flight, 1);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].site_id, 1);

    let mut handed_back: Vec<i64> = results(&coordinator)
        .await
        .into_iter()
        .filter(|r| r.requeue)
        .map(|r| r.site_id)
        .collect();
    handed_back.sort_unstable();
    assert_eq!(handed_back, vec![2, 3]);
}

#[tokio::test]
async fn test_freed_slots_are_refilled() {
    let coordinator = mock_coordinator().await;
    let seller = slow_seller(Duration::from_millis(100)).await;
    mount_tasks(&coordinator, sites(&seller, &[1, 2]), 1).await;
    mount_tasks(&coordinator, sites(&seller, &[3]), 1).await;
    mount_tasks(&coordinator, sites(&seller, &[4]), 1).await;
    mount_no_tasks(&coordinator).await;

    let mut config = engine_config(&coordinator);
    config.worker.parallel_sites = 2;
    let (ctx, shutdown, handle) = start(&config);

    let done = wait_for_completions(&coordinator, 4).await;
    shutdown.cancel();
    handle.await.unwrap();

    let mut ids: Vec<i64> = done.iter().map(|r| r.site_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(results(&coordinator).await.iter().all(|r| !r.requeue));
    assert_eq!(ctx.counters.snapshot().tasks_completed, 4);
}

#[tokio::test]
async fn test_idle_worker_backs_off() {
    let coordinator = mock_coordinator().await;
    mount_no_tasks(&coordinator).await;

    let mut config = engine_config(&coordinator);
    config.worker.idle_backoff_ms = 200;
    let (_ctx, shutdown, handle) = start(&config);

    sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    handle.await.unwrap();

    let polls = count_requests(&coordinator, TASK_PATH).await;
    assert!((1..=4).contains(&polls), "{} task polls", polls);
}

#[tokio::test]
async fn test_idle_worker_runs_email_round() {
    let coordinator = mock_coordinator().await;
    mount_no_tasks(&coordinator).await;

    let sites_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b.fr/contact"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<p>contact@b.fr</p>", "text/html"),
        )
        .mount(&sites_server)
        .await;

    Mock::given(method("GET"))
        .and(path(EMAIL_TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sites": [{"id": 5, "domain": "b.fr", "url": "https://b.fr", "is_seller": false}]
        })))
        .up_to_n_times(1)
        .mount(&coordinator)
        .await;
    Mock::given(method("GET"))
        .and(path(EMAIL_TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sites": []})))
        .mount(&coordinator)
        .await;
    Mock::given(method("POST"))
        .and(path(EMAIL_RESULTS_BATCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sites_processed": 1, "emails_found": 1
        })))
        .expect(1)
        .mount(&coordinator)
        .await;

    let mut config = engine_config(&coordinator);
    config.worker.email_tasks = true;
    config.worker.email_url_template = format!("{}/{{domain}}/", sites_server.uri());
    let (ctx, shutdown, handle) = start(&config);

    let deadline = Instant::now() + Duration::from_secs(5);
    while count_requests(&coordinator, EMAIL_RESULTS_BATCH_PATH).await == 0
        && Instant::now() < deadline
    {
        sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(ctx.counters.snapshot().emails_found, 1);
    assert_eq!(count_requests(&coordinator, EMAIL_RESULTS_BATCH_PATH).await, 1);
}
