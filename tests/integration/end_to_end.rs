//! End-to-end test: a real coordinator, a real worker and a mock seller site

use backlink_scout::config::Config;
use backlink_scout::coordinator::{self, AppState};
use backlink_scout::output::day_key;
use backlink_scout::storage::{SqliteStorage, Storage};
use backlink_scout::worker::{WorkerContext, WorkerEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

#[tokio::test]
async fn test_worker_crawls_seller_from_coordinator() {
    // Seller site
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/blog">Blog</a><a href="https://partner.fr/">Partner</a>"#,
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog"))
        .respond_with(html(
            r#"<a href="https://www.other.fr/promo">Other</a><a href="https://twitter.com/a">Tw</a>"#,
        ))
        .mount(&site)
        .await;
    // Contact page of one buyer, reached through the email site template
    Mock::given(method("GET"))
        .and(path("/partner.fr/contact"))
        .respond_with(html("<p>Ecrivez a contact@partner.fr</p>"))
        .mount(&site)
        .await;

    // Coordinator
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    let seed_url = format!("{}/", site.uri());
    storage.insert_seller("a.fr", Some(&seed_url)).unwrap();

    let config = Config::default();
    let state = AppState::new(storage, config.coordinator.clone(), &config.classifier);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_url = format!("http://{}", listener.local_addr().unwrap());
    let server_shutdown = CancellationToken::new();
    let server = tokio::spawn(coordinator::serve(
        listener,
        state.clone(),
        server_shutdown.clone(),
    ));

    // Worker
    let mut worker_config = Config::default();
    worker_config.worker.api_url = api_url;
    worker_config.worker.worker_id = Some("e2e-worker".to_string());
    worker_config.worker.parallel_sites = 1;
    worker_config.worker.concurrent = 2;
    worker_config.worker.discover_emails = false;
    worker_config.worker.email_url_template = format!("{}/{{domain}}/", site.uri());
    worker_config.worker.idle_backoff_ms = 50;
    worker_config.worker.poll_interval_ms = 50;
    worker_config.worker.heartbeat_interval_ms = 100;
    worker_config.worker.request_timeout_ms = 5_000;

    let worker_shutdown = CancellationToken::new();
    let ctx = WorkerContext::new(&worker_config, worker_shutdown.clone()).unwrap();
    let engine = WorkerEngine::new(Arc::new(ctx));
    let worker = tokio::spawn(async move { engine.run().await });

    let mut crawled = false;
    let mut emailed = false;
    for _ in 0..200 {
        {
            let storage = state.storage();
            crawled = storage.get_site_by_domain("a.fr").unwrap().unwrap().crawled;
            emailed = storage
                .get_site_by_domain("partner.fr")
                .unwrap()
                .is_some_and(|buyer| buyer.emails.is_some());
        }
        if crawled && emailed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    worker_shutdown.cancel();
    worker.await.unwrap().unwrap();
    server_shutdown.cancel();
    server.await.unwrap().unwrap();

    assert!(crawled, "seller was never reported as crawled");
    assert!(emailed, "idle worker never extracted the buyer email");

    let storage = state.storage();
    let seller = storage.get_site_by_domain("a.fr").unwrap().unwrap();
    assert_eq!(seller.pages_crawled, 2);
    assert_eq!(seller.buyers_found, 2);
    assert!(seller.last_error.is_none());

    for buyer in ["partner.fr", "other.fr"] {
        let record = storage.get_site_by_domain(buyer).unwrap().unwrap();
        assert!(record.is_buyer);
        assert_eq!(record.purchased_from.as_deref(), Some("a.fr"));
    }
    assert!(storage.get_site_by_domain("twitter.com").unwrap().is_none());

    let daily = storage.daily_pages(&day_key(chrono::Utc::now())).unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].worker_id, "e2e-worker");
    assert_eq!(daily[0].pages, 2);

    // Seller and both buyers went through one email round
    let partner = storage.get_site_by_domain("partner.fr").unwrap().unwrap();
    assert_eq!(partner.emails.as_deref(), Some("contact@partner.fr"));
    let emails = storage.daily_emails(&day_key(chrono::Utc::now())).unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].emails, 1);
    assert_eq!(emails[0].sites, 3);
}
