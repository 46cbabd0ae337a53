//! Request handlers for the task-distribution API

use crate::coordinator::error::ApiError;
use crate::coordinator::state::AppState;
use crate::output::{
    day_key, load_daily_history, load_email_statistics, load_statistics, CrawlStatistics,
    DailyHistory, EmailStatistics, HISTORY_DAYS,
};
use crate::protocol::{
    Ack, BuyerAck, BuyerCandidate, BuyerReport, BuyersBatch, BuyersBatchAck, CrawlResult,
    EmailResult, EmailResultReport, EmailResultsAck, EmailResultsBatch, EmailTask, EmailTaskBatch,
    EmailTaskQuery, Heartbeat, HeartbeatReply, SiteTask, TaskBatch, TaskQuery, WorkersReport,
};
use crate::state::SiteState;
use crate::storage::{SiteCompletion, SiteRecord, Storage, StorageResult};
use crate::url::{canonical_domain, default_seed_url};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};

/// Candidates fetched per requested site, to leave room for blacklist filtering
const OVERFETCH_FACTOR: usize = 3;

fn task_for(site: SiteRecord) -> SiteTask {
    SiteTask {
        id: site.id,
        url: seed_url_for(&site),
        domain: site.domain,
    }
}

fn seed_url_for(site: &SiteRecord) -> String {
    match &site.seed_url {
        Some(url) if url.starts_with("http") => url.clone(),
        _ => default_seed_url(&site.domain),
    }
}

fn worker_timeout(state: &AppState) -> Duration {
    Duration::seconds(state.config.worker_timeout_secs as i64)
}

/// `GET /api/crawl/task`
pub async fn get_task(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskBatch>, ApiError> {
    if query.worker_id.trim().is_empty() {
        return Err(ApiError::BadRequest("worker_id is required".to_string()));
    }

    state.sync_blacklist().await?;

    let limit = query.batch_size.clamp(1, state.config.max_batch_size);
    let now = Utc::now();
    let lease_cutoff = now - Duration::seconds(state.config.lease_secs as i64);

    let sites: Vec<SiteRecord> = {
        let mut storage = state.storage();
        let sites: Vec<SiteRecord> = storage
            .pending_sellers(lease_cutoff, limit * OVERFETCH_FACTOR)?
            .into_iter()
            .filter(|site| !state.blacklist.contains(&site.domain))
            .take(limit)
            .collect();

        let ids: Vec<i64> = sites.iter().map(|s| s.id).collect();
        storage.mark_assigned(&ids, &query.worker_id, now)?;
        sites
    };

    state
        .workers()
        .record_assignment(&query.worker_id, sites.len(), now);

    if !sites.is_empty() {
        tracing::info!("Assigned {} sites to {}", sites.len(), query.worker_id);
    }

    Ok(Json(TaskBatch {
        sites: sites.into_iter().map(task_for).collect(),
    }))
}

/// `POST /api/crawl/result`
///
/// Repeating the same result is harmless: the completion flag is simply
/// written again and daily counters only move on the first completion.
pub async fn post_result(
    State(state): State<AppState>,
    Json(result): Json<CrawlResult>,
) -> Result<Json<Ack>, ApiError> {
    let mut storage = state.storage();

    if result.requeue {
        storage.release_site(result.site_id, result.error.as_deref())?;
        tracing::info!(
            "Site {} ({}) released by {}",
            result.site_id,
            result.domain,
            result.worker_id
        );
        return Ok(Json(Ack::ok()));
    }

    let status = result.status.unwrap_or(if result.error.is_some() {
        SiteState::Failed
    } else {
        SiteState::Completed
    });

    let buyers: Vec<BuyerCandidate> = result
        .buyers
        .iter()
        .map(|d| canonical_domain(d))
        .filter(|d| !d.is_empty())
        .map(BuyerCandidate::new)
        .collect();

    let outcome = storage.complete_site(&SiteCompletion {
        site_id: result.site_id,
        status,
        pages_crawled: result.pages_crawled,
        buyers_found: buyers.len() as u64,
        error: result.error.clone(),
    })?;

    if !buyers.is_empty() {
        storage.upsert_buyers(&buyers, &outcome.domain)?;
    }

    if outcome.first_completion {
        storage.record_daily_pages(
            &day_key(Utc::now()),
            &result.worker_id,
            result.pages_crawled,
            1,
        )?;
    }

    tracing::info!(
        "Site {} ({}) {} by {}: {} pages, {} buyers{}",
        result.site_id,
        outcome.domain,
        status,
        result.worker_id,
        result.pages_crawled,
        buyers.len(),
        result
            .error
            .as_deref()
            .map(|e| format!(", error: {}", e))
            .unwrap_or_default()
    );

    Ok(Json(Ack::ok()))
}

/// `POST /api/crawl/buyers_batch`
pub async fn post_buyers_batch(
    State(state): State<AppState>,
    Json(batch): Json<BuyersBatch>,
) -> Result<Json<BuyersBatchAck>, ApiError> {
    let seller = canonical_domain(&batch.seller_domain);
    if seller.is_empty() {
        return Err(ApiError::BadRequest("seller_domain is required".to_string()));
    }
    if batch.buyers.is_empty() {
        return Err(ApiError::BadRequest("buyers must not be empty".to_string()));
    }

    let total = batch.buyers.len() as u64;
    let buyers: Vec<BuyerCandidate> = batch
        .buyers
        .into_iter()
        .map(|b| BuyerCandidate {
            domain: canonical_domain(&b.domain),
            email: b.email,
        })
        .filter(|b| !b.domain.is_empty() && !state.blacklist.contains(&b.domain))
        .collect();

    let mut ack = state.storage().upsert_buyers(&buyers, &seller)?;
    ack.total_processed = total;

    tracing::debug!(
        "Buyers batch from {} for {}: {} new, {} emails",
        batch.worker_id,
        seller,
        ack.new_buyers,
        ack.emails_added
    );

    Ok(Json(ack))
}

/// `POST /api/crawl/buyer`
///
/// Single-buyer upload, same semantics as one entry of a buyers batch.
pub async fn post_buyer(
    State(state): State<AppState>,
    Json(report): Json<BuyerReport>,
) -> Result<Json<BuyerAck>, ApiError> {
    let seller = canonical_domain(&report.seller_domain);
    let buyer = canonical_domain(&report.buyer_domain);
    if seller.is_empty() || buyer.is_empty() {
        return Err(ApiError::BadRequest(
            "seller_domain and buyer_domain are required".to_string(),
        ));
    }

    if state.blacklist.contains(&buyer) {
        tracing::debug!("Ignoring blacklisted buyer {} from {}", buyer, report.worker_id);
        return Ok(Json(BuyerAck {
            status: "ignored".to_string(),
            ..BuyerAck::default()
        }));
    }

    let candidate = BuyerCandidate {
        domain: buyer,
        email: report.email,
    };
    let ack = state
        .storage()
        .upsert_buyers(std::slice::from_ref(&candidate), &seller)?;

    if ack.new_buyers > 0 {
        tracing::info!("New buyer {} on {} from {}", candidate.domain, seller, report.worker_id);
    }

    Ok(Json(BuyerAck {
        status: "ok".to_string(),
        new_buyer: ack.new_buyers > 0,
        email_added: ack.emails_added > 0,
    }))
}

/// `GET /api/crawl/email-task`
pub async fn get_email_task(
    State(state): State<AppState>,
    Query(query): Query<EmailTaskQuery>,
) -> Result<Json<EmailTaskBatch>, ApiError> {
    if query.worker_id.trim().is_empty() {
        return Err(ApiError::BadRequest("worker_id is required".to_string()));
    }

    state.sync_blacklist().await?;

    let limit = query.batch_size.clamp(1, state.config.max_email_batch_size);
    let now = Utc::now();
    let lease_cutoff = now - Duration::seconds(state.config.email_lease_secs as i64);

    let sites: Vec<SiteRecord> = {
        let mut storage = state.storage();
        let sites: Vec<SiteRecord> = storage
            .pending_email_sites(lease_cutoff, limit * OVERFETCH_FACTOR, query.sellers_first)?
            .into_iter()
            .filter(|site| !state.blacklist.contains(&site.domain))
            .take(limit)
            .collect();

        let ids: Vec<i64> = sites.iter().map(|s| s.id).collect();
        storage.mark_email_assigned(&ids, now)?;
        sites
    };

    if !sites.is_empty() {
        tracing::info!(
            "Assigned {} email tasks to {}",
            sites.len(),
            query.worker_id
        );
    }

    Ok(Json(EmailTaskBatch {
        sites: sites
            .into_iter()
            .map(|site| EmailTask {
                id: site.id,
                url: seed_url_for(&site),
                is_seller: site.is_seller,
                domain: site.domain,
            })
            .collect(),
    }))
}

/// Stores `results` and credits the emails to `worker_id` for today
fn record_email_results(
    storage: &mut dyn Storage,
    worker_id: &str,
    results: &[EmailResult],
) -> StorageResult<EmailResultsAck> {
    let mut ack = EmailResultsAck::default();

    for result in results {
        let known = storage.record_email_result(
            result.site_id,
            result.emails.as_deref(),
            result.error.as_deref(),
        )?;
        if !known {
            tracing::warn!(
                "Email result for unknown site {} ({}) from {}",
                result.site_id,
                result.domain,
                worker_id
            );
            continue;
        }
        ack.sites_processed += 1;
        ack.emails_found += result.email_count();
    }

    if ack.sites_processed > 0 {
        storage.record_daily_emails(
            &day_key(Utc::now()),
            worker_id,
            ack.emails_found,
            ack.sites_processed,
        )?;
    }

    Ok(ack)
}

/// `POST /api/crawl/email-result`
pub async fn post_email_result(
    State(state): State<AppState>,
    Json(report): Json<EmailResultReport>,
) -> Result<Json<EmailResultsAck>, ApiError> {
    if report.result.site_id <= 0 || report.result.domain.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "site_id and domain are required".to_string(),
        ));
    }

    let ack = record_email_results(
        &mut *state.storage(),
        &report.worker_id,
        std::slice::from_ref(&report.result),
    )?;
    if ack.sites_processed == 0 {
        return Err(ApiError::NotFound(format!(
            "unknown site {}",
            report.result.site_id
        )));
    }

    tracing::debug!(
        "Email result for {} from {}: {} emails",
        report.result.domain,
        report.worker_id,
        ack.emails_found
    );
    Ok(Json(ack))
}

/// `POST /api/crawl/email-results-batch`
pub async fn post_email_results_batch(
    State(state): State<AppState>,
    Json(batch): Json<EmailResultsBatch>,
) -> Result<Json<EmailResultsAck>, ApiError> {
    if batch.results.is_empty() {
        return Err(ApiError::BadRequest("results must not be empty".to_string()));
    }

    let ack = record_email_results(&mut *state.storage(), &batch.worker_id, &batch.results)?;

    tracing::info!(
        "Email batch from {}: {} sites, {} emails",
        batch.worker_id,
        ack.sites_processed,
        ack.emails_found
    );
    Ok(Json(ack))
}

/// `POST /api/crawl/heartbeat`
///
/// The reply lists in-progress sellers that are now blacklisted, plus every
/// domain flagged in the database.
pub async fn post_heartbeat(
    State(state): State<AppState>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<HeartbeatReply>, ApiError> {
    if heartbeat.worker_id.trim().is_empty() {
        return Err(ApiError::BadRequest("worker_id is required".to_string()));
    }

    state.workers().record_heartbeat(&heartbeat, Utc::now());
    state.sync_blacklist().await?;
    let blacklisted = state.storage().blacklisted_domains()?;

    let cancelled: Vec<String> = heartbeat
        .sites_in_progress
        .iter()
        .map(|site| canonical_domain(&site.domain))
        .filter(|domain| state.blacklist.contains(domain))
        .collect();

    if !cancelled.is_empty() {
        tracing::info!(
            "Cancelling {} on {}: blacklisted",
            cancelled.join(", "),
            heartbeat.worker_id
        );
    }

    Ok(Json(HeartbeatReply {
        status: "ok".to_string(),
        worker_id: heartbeat.worker_id,
        cancelled,
        blacklisted,
    }))
}

/// `GET /api/crawl/workers`
pub async fn get_workers(State(state): State<AppState>) -> Json<WorkersReport> {
    let report = state.workers().report(Utc::now(), worker_timeout(&state));
    Json(report)
}

/// `GET /api/crawl/stats`
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<CrawlStatistics>, ApiError> {
    let now = Utc::now();
    let active = state.workers().active_count(now, worker_timeout(&state));
    let stats = load_statistics(&*state.storage(), now, active)?;
    Ok(Json(stats))
}

/// `GET /api/crawl/daily-stats`
pub async fn get_daily_stats(
    State(state): State<AppState>,
) -> Result<Json<DailyHistory>, ApiError> {
    let history = load_daily_history(&*state.storage(), Utc::now(), HISTORY_DAYS)?;
    Ok(Json(history))
}

/// `GET /api/crawl/email-stats`
pub async fn get_email_stats(
    State(state): State<AppState>,
) -> Result<Json<EmailStatistics>, ApiError> {
    let stats = load_email_statistics(&*state.storage(), Utc::now())?;
    Ok(Json(stats))
}

/// `DELETE /api/crawl/worker/:worker_id`
pub async fn delete_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    if state.workers().remove(&worker_id) {
        tracing::info!("Removed worker {}", worker_id);
        Ok(Json(Ack::ok()))
    } else {
        Err(ApiError::NotFound(format!("unknown worker {}", worker_id)))
    }
}
