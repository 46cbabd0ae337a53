//! Integration tests for the coordinator API
//!
//! Requests go straight through the router with `tower::ServiceExt::oneshot`,
//! against a file-backed database in a temporary directory.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use backlink_scout::config::{ClassifierConfig, CoordinatorConfig};
use backlink_scout::coordinator::{build_router, AppState};
use backlink_scout::output::day_key;
use backlink_scout::storage::{SqliteStorage, Storage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestCoordinator {
    _dir: TempDir,
    state: AppState,
    router: Router,
}

impl TestCoordinator {
    fn new(sellers: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut storage =
            SqliteStorage::new(&dir.path().join("crawl.db")).expect("Failed to open database");
        for seller in sellers {
            storage.insert_seller(seller, None).unwrap();
        }

        let state = AppState::new(
            storage,
            CoordinatorConfig::default(),
            &ClassifierConfig::default(),
        );
        let router = build_router(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn take_tasks(&self, worker_id: &str, batch_size: usize) -> Vec<Value> {
        let uri = format!(
            "/api/crawl/task?worker_id={}&batch_size={}",
            worker_id, batch_size
        );
        let (status, body) = self.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        body["sites"].as_array().cloned().unwrap_or_default()
    }

    fn site_id(&self, domain: &str) -> i64 {
        self.state
            .storage()
            .get_site_by_domain(domain)
            .unwrap()
            .expect("Unknown site")
            .id
    }
}

#[tokio::test]
async fn test_task_batches_honor_size_and_lease() {
    let coordinator = TestCoordinator::new(&["s1.fr", "s2.fr", "s3.fr", "s4.fr", "s5.fr"]);

    let first = coordinator.take_tasks("w1", 2).await;
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["domain"], "s1.fr");
    assert_eq!(first[0]["url"], "https://s1.fr");

    // Leased sellers are not offered again
    let second = coordinator.take_tasks("w2", 10).await;
    assert_eq!(second.len(), 3);
    assert!(coordinator.take_tasks("w3", 10).await.is_empty());

    let site = coordinator
        .state
        .storage()
        .get_site_by_domain("s1.fr")
        .unwrap()
        .unwrap();
    assert_eq!(site.assigned_to.as_deref(), Some("w1"));
}

#[tokio::test]
async fn test_task_requires_worker_id() {
    let coordinator = TestCoordinator::new(&["s1.fr"]);
    let (status, _) = coordinator
        .get("/api/crawl/task?worker_id=&batch_size=1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blacklisted_sellers_are_not_assigned() {
    let coordinator = TestCoordinator::new(&["s1.fr", "s2.fr", "cnil.fr"]);
    coordinator
        .state
        .storage()
        .set_blacklisted("s1.fr", true)
        .unwrap();

    let tasks = coordinator.take_tasks("w1", 10).await;
    let domains: Vec<&str> = tasks.iter().filter_map(|t| t["domain"].as_str()).collect();
    assert_eq!(domains, vec!["s2.fr"]);
}

#[tokio::test]
async fn test_result_is_idempotent() {
    let coordinator = TestCoordinator::new(&["a.fr"]);
    coordinator.take_tasks("w1", 1).await;
    let site_id = coordinator.site_id("a.fr");

    let result = json!({
        "worker_id": "w1",
        "site_id": site_id,
        "domain": "a.fr",
        "buyers": ["b.fr", "www.c.fr"],
        "pages_crawled": 12,
        "status": "completed"
    });

    for _ in 0..2 {
        let (status, body) = coordinator.post("/api/crawl/result", result.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    let storage = coordinator.state.storage();
    let seller = storage.get_site(site_id).unwrap();
    assert!(seller.crawled);
    assert_eq!(seller.pages_crawled, 12);
    assert_eq!(seller.buyers_found, 2);
    assert!(seller.assigned_at.is_none());

    let buyer = storage.get_site_by_domain("c.fr").unwrap().unwrap();
    assert!(buyer.is_buyer);
    assert_eq!(buyer.purchased_from.as_deref(), Some("a.fr"));

    let daily = storage.daily_pages(&day_key(chrono::Utc::now())).unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].pages, 12);
    assert_eq!(daily[0].sellers, 1);
}

#[tokio::test]
async fn test_result_for_unknown_site() {
    let coordinator = TestCoordinator::new(&[]);
    let (status, body) = coordinator
        .post(
            "/api/crawl/result",
            json!({"worker_id": "w1", "site_id": 999, "domain": "x.fr"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_requeued_result_releases_site() {
    let coordinator = TestCoordinator::new(&["a.fr"]);
    assert_eq!(coordinator.take_tasks("w1", 1).await.len(), 1);
    assert!(coordinator.take_tasks("w2", 1).await.is_empty());

    let (status, _) = coordinator
        .post(
            "/api/crawl/result",
            json!({
                "worker_id": "w1",
                "site_id": coordinator.site_id("a.fr"),
                "domain": "a.fr",
                "error": "interrupted by worker shutdown",
                "status": "aborted",
                "requeue": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let again = coordinator.take_tasks("w2", 1).await;
    assert_eq!(again.len(), 1);
    assert_eq!(again[0]["domain"], "a.fr");
}

#[tokio::test]
async fn test_buyers_batch_first_seller_wins() {
    let coordinator = TestCoordinator::new(&["a.fr", "z.fr"]);

    let (status, ack) = coordinator
        .post(
            "/api/crawl/buyers_batch",
            json!({
                "worker_id": "w1",
                "site_id": 1,
                "seller_domain": "a.fr",
                "buyers": [{"domain": "b.fr"}, {"domain": "gouv.fr"}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["new_buyers"], 1);
    assert_eq!(ack["total_processed"], 2);

    let (status, ack) = coordinator
        .post(
            "/api/crawl/buyers_batch",
            json!({
                "worker_id": "w2",
                "site_id": 2,
                "seller_domain": "z.fr",
                "buyers": [{"domain": "B.fr", "email": "contact@b.fr"}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["new_buyers"], 0);
    assert_eq!(ack["emails_added"], 1);

    let storage = coordinator.state.storage();
    let buyer = storage.get_site_by_domain("b.fr").unwrap().unwrap();
    assert_eq!(buyer.purchased_from.as_deref(), Some("a.fr"));
    assert_eq!(buyer.emails.as_deref(), Some("contact@b.fr"));
    assert!(storage.get_site_by_domain("gouv.fr").unwrap().is_none());
}

#[tokio::test]
async fn test_empty_buyers_batch_is_rejected() {
    let coordinator = TestCoordinator::new(&["a.fr"]);
    let (status, body) = coordinator
        .post(
            "/api/crawl/buyers_batch",
            json!({"worker_id": "w1", "site_id": 1, "seller_domain": "a.fr", "buyers": []}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_heartbeat_reports_cancelled_sellers() {
    let coordinator = TestCoordinator::new(&["a.fr", "s2.fr"]);
    let heartbeat = json!({
        "worker_id": "w1",
        "hostname": "crawler-01",
        "status": "crawling",
        "current_task": "a.fr, s2.fr",
        "pages_crawled": 40,
        "sites_in_progress": [
            {"domain": "a.fr", "pages": 30},
            {"domain": "s2.fr", "pages": 10}
        ]
    });

    let (status, reply) = coordinator.post("/api/crawl/heartbeat", heartbeat.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["cancelled"], json!([]));

    coordinator
        .state
        .storage()
        .set_blacklisted("a.fr", true)
        .unwrap();

    let (_, reply) = coordinator.post("/api/crawl/heartbeat", heartbeat.clone()).await;
    assert_eq!(reply["worker_id"], "w1");
    assert_eq!(reply["cancelled"], json!(["a.fr"]));
    assert_eq!(reply["blacklisted"], json!(["a.fr"]));

    // Undoing the flag empties the list the worker mirrors
    coordinator
        .state
        .storage()
        .set_blacklisted("a.fr", false)
        .unwrap();
    let (_, reply) = coordinator.post("/api/crawl/heartbeat", heartbeat).await;
    assert_eq!(reply["cancelled"], json!([]));
    assert_eq!(reply["blacklisted"], json!([]));
}

#[tokio::test]
async fn test_worker_listing_and_removal() {
    let coordinator = TestCoordinator::new(&[]);
    coordinator
        .post(
            "/api/crawl/heartbeat",
            json!({"worker_id": "w1", "hostname": "crawler-01", "status": "idle"}),
        )
        .await;

    let (status, report) = coordinator.get("/api/crawl/workers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], 1);
    assert_eq!(report["active"], 1);
    assert_eq!(report["workers"][0]["worker_id"], "w1");
    assert_eq!(report["workers"][0]["alive"], true);

    let (status, _) = coordinator.delete("/api/crawl/worker/w1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = coordinator.delete("/api/crawl/worker/w1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, report) = coordinator.get("/api/crawl/workers").await;
    assert_eq!(report["total"], 0);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let coordinator = TestCoordinator::new(&["a.fr", "s2.fr"]);
    coordinator.take_tasks("w1", 1).await;
    coordinator
        .post(
            "/api/crawl/result",
            json!({
                "worker_id": "w1",
                "site_id": coordinator.site_id("a.fr"),
                "domain": "a.fr",
                "buyers": ["b.fr"],
                "pages_crawled": 7
            }),
        )
        .await;

    let (status, stats) = coordinator.get("/api/crawl/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["sellers_total"], 2);
    assert_eq!(stats["sellers_crawled"], 1);
    assert_eq!(stats["sellers_remaining"], 1);
    assert_eq!(stats["buyers_total"], 1);
    assert_eq!(stats["pages_today"], 7);
}

#[tokio::test]
async fn test_fr_sellers_are_assigned_first() {
    let coordinator = TestCoordinator::new(&["a.com", "b.fr", "c.de", "d.fr"]);

    let tasks = coordinator.take_tasks("w1", 4).await;
    let domains: Vec<&str> = tasks.iter().filter_map(|t| t["domain"].as_str()).collect();
    assert_eq!(domains, ["b.fr", "d.fr", "a.com", "c.de"]);
}

#[tokio::test]
async fn test_single_buyer_upload() {
    let coordinator = TestCoordinator::new(&["a.fr"]);

    let (status, ack) = coordinator
        .post(
            "/api/crawl/buyer",
            json!({
                "worker_id": "w1",
                "seller_domain": "A.fr",
                "buyer_domain": "www.b.fr",
                "email": "hi@b.fr"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["new_buyer"], true);
    assert_eq!(ack["email_added"], true);

    let (_, ack) = coordinator
        .post(
            "/api/crawl/buyer",
            json!({"worker_id": "w1", "seller_domain": "c.fr", "buyer_domain": "b.fr"}),
        )
        .await;
    assert_eq!(ack["new_buyer"], false);

    let buyer = coordinator
        .state
        .storage()
        .get_site_by_domain("b.fr")
        .unwrap()
        .unwrap();
    assert_eq!(buyer.purchased_from.as_deref(), Some("a.fr"));
    assert_eq!(buyer.emails.as_deref(), Some("hi@b.fr"));

    let (status, _) = coordinator
        .post(
            "/api/crawl/buyer",
            json!({"worker_id": "w1", "seller_domain": "a.fr", "buyer_domain": ""}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_tasks_order_and_lease() {
    let coordinator = TestCoordinator::new(&["s1.com"]);
    {
        let mut storage = coordinator.state.storage();
        storage
            .upsert_buyers(
                &[
                    backlink_scout::protocol::BuyerCandidate::new("b1.com"),
                    backlink_scout::protocol::BuyerCandidate::new("b2.fr"),
                    backlink_scout::protocol::BuyerCandidate::new("spam.fr"),
                ],
                "s1.com",
            )
            .unwrap();
        storage.set_blacklisted("spam.fr", true).unwrap();
    }

    let (status, body) = coordinator
        .get("/api/crawl/email-task?worker_id=w1&batch_size=2")
        .await;
    assert_eq!(status, StatusCode::OK);
    let sites = body["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0]["domain"], "s1.com");
    assert_eq!(sites[0]["is_seller"], true);
    assert_eq!(sites[1]["domain"], "b2.fr");
    assert_eq!(sites[1]["url"], "https://b2.fr");

    // Leased sites wait; the blacklisted buyer is never offered
    let (_, body) = coordinator
        .get("/api/crawl/email-task?worker_id=w2&batch_size=10")
        .await;
    let sites = body["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0]["domain"], "b1.com");

    let (status, _) = coordinator.get("/api/crawl/email-task?worker_id=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_results_fill_and_count() {
    let coordinator = TestCoordinator::new(&["a.fr", "b.fr"]);
    let a = coordinator.site_id("a.fr");
    let b = coordinator.site_id("b.fr");

    let (status, ack) = coordinator
        .post(
            "/api/crawl/email-result",
            json!({
                "worker_id": "w1",
                "site_id": a,
                "domain": "a.fr",
                "emails": "contact@a.fr; info@a.fr",
                "pages_checked": 5
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["emails_found"], 2);

    let (status, ack) = coordinator
        .post(
            "/api/crawl/email-results-batch",
            json!({
                "worker_id": "w1",
                "results": [
                    {"site_id": a, "domain": "a.fr", "emails": "other@a.fr"},
                    {"site_id": b, "domain": "b.fr", "emails": null},
                    {"site_id": 999, "domain": "ghost.fr", "emails": "x@ghost.fr"}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["sites_processed"], 2);
    assert_eq!(ack["emails_found"], 1);

    // The first addresses stay
    let site = coordinator
        .state
        .storage()
        .get_site_by_domain("a.fr")
        .unwrap()
        .unwrap();
    assert_eq!(site.emails.as_deref(), Some("contact@a.fr; info@a.fr"));

    let daily = coordinator
        .state
        .storage()
        .daily_emails(&day_key(chrono::Utc::now()))
        .unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].emails, 3);
    assert_eq!(daily[0].sites, 3);

    let (status, _) = coordinator
        .post(
            "/api/crawl/email-results-batch",
            json!({"worker_id": "w1", "results": []}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = coordinator
        .post(
            "/api/crawl/email-result",
            json!({"worker_id": "w1", "site_id": a, "domain": ""}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_daily_and_email_stats() {
    let coordinator = TestCoordinator::new(&["a.fr", "s2.fr"]);
    coordinator.take_tasks("w1", 1).await;
    coordinator
        .post(
            "/api/crawl/result",
            json!({
                "worker_id": "w1",
                "site_id": coordinator.site_id("a.fr"),
                "domain": "a.fr",
                "buyers": ["b.fr"],
                "pages_crawled": 7
            }),
        )
        .await;
    coordinator
        .post(
            "/api/crawl/email-result",
            json!({
                "worker_id": "w2",
                "site_id": coordinator.site_id("b.fr"),
                "domain": "b.fr",
                "emails": "hi@b.fr"
            }),
        )
        .await;

    let (status, history) = coordinator.get("/api/crawl/daily-stats").await;
    assert_eq!(status, StatusCode::OK);
    let days = history["daily_stats"].as_array().unwrap();
    assert_eq!(days.len(), 14);
    assert_eq!(days[0]["date"], day_key(chrono::Utc::now()));
    assert_eq!(days[0]["pages_crawled"], 8);
    assert_eq!(days[0]["sellers_crawled"], 1);
    assert_eq!(days[0]["buyers_found"], 1);
    // b.fr got its address from an email task, counted once
    assert_eq!(days[0]["emails_found"], 1);
    assert_eq!(history["totals"]["pages_crawled"], 8);

    let (status, stats) = coordinator.get("/api/crawl/email-stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totals"]["sites_with_email"], 1);
    assert_eq!(stats["totals"]["sites_without_email"], 2);
    assert_eq!(stats["totals"]["sellers_without_email"], 2);
    assert_eq!(stats["today"]["emails"], 1);
    assert_eq!(stats["today"]["workers"][0]["worker_id"], "w2");
    assert_eq!(stats["weekly"].as_array().unwrap().len(), 7);
}
