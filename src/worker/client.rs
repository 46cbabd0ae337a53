//! HTTP client for the coordinator API

use crate::protocol::{
    BuyersBatch, BuyersBatchAck, CrawlResult, EmailResultsAck, EmailResultsBatch, EmailTask,
    EmailTaskBatch, Heartbeat, HeartbeatReply, SiteTask, TaskBatch, BUYERS_BATCH_PATH,
    EMAIL_RESULTS_BATCH_PATH, EMAIL_TASK_PATH, HEARTBEAT_PATH, RESULT_PATH, TASK_PATH,
};
use crate::ScoutError;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: Client,
    base_url: String,
    worker_id: String,
    timeout: Duration,
    retry_window: Duration,
}

impl CoordinatorClient {
    pub fn new(
        http: Client,
        api_url: &str,
        worker_id: &str,
        timeout: Duration,
        retry_window: Duration,
    ) -> Self {
        Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
            worker_id: worker_id.to_string(),
            timeout,
            retry_window,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Asks for up to `batch_size` sellers
    pub async fn fetch_tasks(&self, batch_size: usize) -> Result<Vec<SiteTask>, ScoutError> {
        let batch: TaskBatch = self.get_batch(TASK_PATH, batch_size).await?;
        Ok(batch.sites)
    }

    /// Asks for up to `batch_size` sites that still lack a contact email
    pub async fn fetch_email_tasks(&self, batch_size: usize) -> Result<Vec<EmailTask>, ScoutError> {
        let batch: EmailTaskBatch = self.get_batch(EMAIL_TASK_PATH, batch_size).await?;
        Ok(batch.sites)
    }

    pub async fn submit_email_results(
        &self,
        batch: &EmailResultsBatch,
    ) -> Result<EmailResultsAck, ScoutError> {
        self.post_json(EMAIL_RESULTS_BATCH_PATH, batch).await
    }

    pub async fn submit_buyers(&self, batch: &BuyersBatch) -> Result<BuyersBatchAck, ScoutError> {
        self.post_json(BUYERS_BATCH_PATH, batch).await
    }

    pub async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<HeartbeatReply, ScoutError> {
        self.post_json(HEARTBEAT_PATH, heartbeat).await
    }

    /// Posts a final result once
    pub async fn submit_result(&self, result: &CrawlResult) -> Result<(), ScoutError> {
        let _: serde_json::Value = self.post_json(RESULT_PATH, result).await?;
        Ok(())
    }

    /// Posts a final result, retrying with exponential backoff
    ///
    /// Client errors (4xx) are not retried. Gives up once the retry window has
    /// elapsed and returns the last error.
    pub async fn submit_result_with_retry(&self, result: &CrawlResult) -> Result<(), ScoutError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Some(self.retry_window),
            ..ExponentialBackoff::default()
        };

        retry(policy, || async move {
            self.submit_result(result).await.map_err(|e| {
                if is_client_error(&e) {
                    backoff::Error::permanent(e)
                } else {
                    tracing::warn!(
                        "Result for site {} not accepted yet: {}",
                        result.site_id,
                        e
                    );
                    backoff::Error::transient(e)
                }
            })
        })
        .await
    }

    async fn get_batch<T: DeserializeOwned>(
        &self,
        path: &str,
        batch_size: usize,
    ) -> Result<T, ScoutError> {
        let url = self.endpoint(path);
        let batch_size = batch_size.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("worker_id", self.worker_id.as_str()),
                ("batch_size", batch_size.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| ScoutError::Http {
                url: url.clone(),
                source,
            })?;

        decode(path, response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ScoutError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| ScoutError::Http {
                url: url.clone(),
                source,
            })?;

        decode(path, response).await
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, ScoutError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ScoutError::Coordinator {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json::<T>().await?)
}

fn is_client_error(error: &ScoutError) -> bool {
    matches!(error, ScoutError::Coordinator { status, .. } if (400..500).contains(status))
}
