//! Integration tests for the per-site crawler
//!
//! The seller is a wiremock server on 127.0.0.1, so its root host is the
//! loopback address and every relative link stays internal. A second mock
//! server stands in for the coordinator and records the buyer batches.

use backlink_scout::config::Config;
use backlink_scout::crawler::crawl_site;
use backlink_scout::protocol::{BuyersBatch, SiteTask, BUYERS_BATCH_PATH};
use backlink_scout::state::{Blacklist, SiteState};
use backlink_scout::worker::WorkerContext;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

/// Worker configuration pointed at a mock coordinator
fn test_config(api_url: &str) -> Config {
    let mut config = Config::default();
    config.worker.api_url = api_url.to_string();
    config.worker.worker_id = Some("test-worker".to_string());
    config.worker.concurrent = 5;
    config.worker.check_interval = 10;
    config.worker.discover_emails = false;
    config.worker.request_timeout_ms = 5_000;
    config.worker.result_retry_ms = 1_000;
    config
}

async fn mock_coordinator() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BUYERS_BATCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new_buyers": 0,
            "emails_added": 0,
            "total_processed": 0
        })))
        .mount(&server)
        .await;
    server
}

/// Buyer batches the mock coordinator received, in arrival order
async fn received_batches(server: &MockServer) -> Vec<BuyersBatch> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == BUYERS_BATCH_PATH)
        .map(|request| serde_json::from_slice(&request.body).expect("Invalid buyers batch"))
        .collect()
}

fn task_for(server: &MockServer) -> SiteTask {
    SiteTask {
        id: 1,
        domain: "a.fr".to_string(),
        url: format!("{}/", server.uri()),
    }
}

#[tokio::test]
async fn test_crawl_collects_buyers() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body>
                <a href="/p2">Next</a>
                <a href="/p2#contact">Contact</a>
                <a href="https://www.b.fr/offre">Partner</a>
                <a href="https://facebook.com/page">Facebook</a>
                <a href="https://cnil.fr/">CNIL</a>
                <a href="mailto:hello@a.fr">Mail</a>
            </body></html>"#,
        ))
        .mount(&site)
        .await;

    Mock::given(method("GET"))
        .and(path("/p2"))
        .respond_with(html(
            r#"<a href="/">Home</a><a href="/p2">Self</a><a href="https://b.fr/autre">Again</a>"#,
        ))
        .mount(&site)
        .await;

    let config = test_config(&coordinator.uri());
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();
    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Completed);
    assert_eq!(outcome.pages_crawled, 2);
    assert_eq!(outcome.buyers, vec!["b.fr".to_string()]);
    assert!(outcome.error.is_none());
    assert!(!outcome.requeue);

    let batches = received_batches(&coordinator).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].seller_domain, "a.fr");
    assert_eq!(batches[0].worker_id, "test-worker");
    assert_eq!(batches[0].buyers.len(), 1);
    assert_eq!(batches[0].buyers[0].domain, "b.fr");
}

#[tokio::test]
async fn test_buyers_are_streamed_in_batches() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    let links: String = (1..=25)
        .map(|i| format!(r#"<a href="https://buyer{}.fr/">Buyer {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links))
        .mount(&site)
        .await;

    let mut config = test_config(&coordinator.uri());
    config.worker.batch_size = 20;
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();
    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Completed);
    assert_eq!(outcome.buyers.len(), 25);
    assert_eq!(outcome.buyers[0], "buyer1.fr");

    let sizes: Vec<usize> = received_batches(&coordinator)
        .await
        .iter()
        .map(|batch| batch.buyers.len())
        .collect();
    assert_eq!(sizes, vec![20, 5]);
    assert_eq!(ctx.counters.snapshot().buyers_found, 25);
}

/// Answers `/{domain}/contact` with `contact@{domain}` for the listed domains
struct ContactPages {
    with_email: Vec<String>,
}

impl Respond for ContactPages {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut segments = request.url.path().trim_matches('/').split('/');
        match (segments.next(), segments.next()) {
            (Some(domain), Some("contact")) if self.with_email.iter().any(|d| d == domain) => {
                html(&format!("<p>Write to contact@{}</p>", domain))
            }
            _ => ResponseTemplate::new(404),
        }
    }
}

#[tokio::test]
async fn test_email_pass_uploads_batches() {
    let site = MockServer::start().await;
    let buyer_sites = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    let links: String = (1..=5)
        .map(|i| format!(r#"<a href="https://buyer{}.fr/">Buyer {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links))
        .mount(&site)
        .await;

    // buyer5.fr publishes no address
    Mock::given(method("GET"))
        .respond_with(ContactPages {
            with_email: (1..=4).map(|i| format!("buyer{}.fr", i)).collect(),
        })
        .mount(&buyer_sites)
        .await;

    let mut config = test_config(&coordinator.uri());
    config.worker.batch_size = 2;
    config.worker.discover_emails = true;
    config.worker.email_url_template = format!("{}/{{domain}}/", buyer_sites.uri());
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();

    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Completed);
    assert_eq!(outcome.buyers.len(), 5);
    assert_eq!(outcome.emails_found, 4);
    assert_eq!(ctx.counters.snapshot().emails_found, 4);

    let batches = received_batches(&coordinator).await;
    let (with_email, without): (Vec<_>, Vec<_>) = batches
        .iter()
        .partition(|batch| batch.buyers.iter().all(|b| b.email.is_some()));

    // Discovery batches carry no email, the second pass only hits
    let sizes: Vec<usize> = without.iter().map(|b| b.buyers.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let sizes: Vec<usize> = with_email.iter().map(|b| b.buyers.len()).collect();
    assert_eq!(sizes, vec![2, 2]);

    let mut emails: Vec<(String, String)> = with_email
        .iter()
        .flat_map(|batch| batch.buyers.iter())
        .map(|b| (b.domain.clone(), b.email.clone().unwrap_or_default()))
        .collect();
    emails.sort();
    assert_eq!(emails[0], ("buyer1.fr".to_string(), "contact@buyer1.fr".to_string()));
    assert_eq!(emails.len(), 4);
    assert!(emails.iter().all(|(domain, email)| email.ends_with(domain.as_str())));
    assert!(batches.iter().all(|b| b.seller_domain == "a.fr"));
}

#[tokio::test]
async fn test_blacklisted_seller_is_never_fetched() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    Mock::given(method("GET"))
        .respond_with(html(r#"<a href="https://b.fr/">b</a>"#))
        .mount(&site)
        .await;

    let config = test_config(&coordinator.uri());
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();
    ctx.blacklist.replace_pushed(["a.fr"]);

    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Aborted);
    assert_eq!(outcome.pages_crawled, 0);
    assert!(outcome.buyers.is_empty());
    assert!(outcome.error.is_some());
    assert!(site.received_requests().await.unwrap().is_empty());
    assert!(received_batches(&coordinator).await.is_empty());
}

/// Serves a page and blacklists the seller as a side effect
struct BlacklistOnServe {
    blacklist: Arc<Blacklist>,
    domain: String,
    body: String,
}

impl Respond for BlacklistOnServe {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.blacklist.replace_pushed([self.domain.as_str()]);
        html(&self.body)
    }
}

#[tokio::test]
async fn test_blacklist_update_aborts_running_crawl() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    let config = test_config(&coordinator.uri());
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();

    let mut root = String::from(r#"<a href="https://b.fr/">Partner</a>"#);
    for i in 0..100 {
        root.push_str(&format!(r#"<a href="/page{}">Page {}</a>"#, i, i));
    }

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(BlacklistOnServe {
            blacklist: ctx.blacklist.clone(),
            domain: "a.fr".to_string(),
            body: root,
        })
        .mount(&site)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/page\d+$"))
        .respond_with(html("<p>Nothing here</p>"))
        .mount(&site)
        .await;

    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Aborted);
    assert!(outcome.pages_crawled <= 10);
    assert!(outcome.pages_crawled >= 1);
    assert!(!outcome.requeue);
    assert!(outcome
        .error
        .as_deref()
        .is_some_and(|e| e.contains("blacklisted")));

    let fetched = site.received_requests().await.unwrap().len();
    assert!(fetched <= 10, "fetched {} pages after the update", fetched);

    // The buyer found before the abort is still uploaded
    let batches = received_batches(&coordinator).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].buyers[0].domain, "b.fr");
}

#[tokio::test]
async fn test_shutdown_requests_requeue() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    Mock::given(method("GET"))
        .respond_with(html("<p>Home</p>"))
        .mount(&site)
        .await;

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let config = test_config(&coordinator.uri());
    let ctx = WorkerContext::new(&config, shutdown).unwrap();

    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Aborted);
    assert!(outcome.requeue);
    assert_eq!(outcome.pages_crawled, 0);
    assert!(site.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_page_budget_and_non_html_pages() {
    let site = MockServer::start().await;
    let coordinator = mock_coordinator().await;

    let mut root = String::from(r#"<a href="/data.txt">Data</a><a href="/image.png">Img</a>"#);
    for i in 0..20 {
        root.push_str(&format!(r#"<a href="/page{}">Page {}</a>"#, i, i));
    }
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&root))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/data.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(br#"<a href="https://hidden.fr/">x</a>"#.to_vec(), "text/plain"),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/page\d+$"))
        .respond_with(html("<p>Page</p>"))
        .mount(&site)
        .await;

    let mut config = test_config(&coordinator.uri());
    config.worker.max_pages = 4;
    let ctx = WorkerContext::new(&config, CancellationToken::new()).unwrap();
    let outcome = crawl_site(&ctx, &task_for(&site)).await;

    assert_eq!(outcome.state, SiteState::Completed);
    assert_eq!(outcome.pages_crawled, 4);
    // Asset paths are never queued and plain-text bodies are not parsed
    assert!(outcome.buyers.is_empty());
    let requested: Vec<String> = site
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect();
    assert!(!requested.contains(&"/image.png".to_string()));
}
