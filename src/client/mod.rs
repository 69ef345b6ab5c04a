//! Clients for the collaborating services
//!
//! - producer: queues keyword-generation jobs (the Job Submitter)
//! - mailbox: reads and clears results over HTTP
//! - search: fetches raw threads and news articles
//!
//! The traits below are the seams the poll loop and the analysis flow are
//! written against, so tests can swap in local fakes.

pub mod mailbox;
pub mod producer;
pub mod search;

pub use mailbox::MailboxClient;
pub use producer::{JobAccepted, ProducerClient, SubmissionError};
pub use search::{NewsArticle, NewsResponse, SearchClient, SearchResponse};

use crate::mailbox::{JobId, MailboxEntry, MailboxStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the mailbox or search service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ServiceError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Which mailbox entry a poller is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// Whatever lands in the latest slot
    Latest,
    /// The result of one submitted job
    Job(JobId),
}

/// Accepts jobs on behalf of an asynchronous producer
pub trait JobProducer: Send + Sync {
    fn submit(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<JobAccepted, SubmissionError>> + Send;
}

/// Read side of a result mailbox
pub trait MailboxSource: Send + Sync + 'static {
    /// Current entry for the target, `None` while nothing has arrived
    fn fetch(
        &self,
        target: &PollTarget,
    ) -> impl Future<Output = Result<Option<MailboxEntry>, ServiceError>> + Send;

    /// Clear all entries
    fn reset(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Empty the latest slot, leaving job-keyed results in place
    fn clear_latest(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Drop one job's result, if still held
    fn discard(&self, job_id: &JobId) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// Search collaborator feeding the thread builder
pub trait ThreadSearch: Send + Sync {
    fn search_threads(
        &self,
        keyword: &str,
    ) -> impl Future<Output = Result<SearchResponse, ServiceError>> + Send;

    fn search_news(
        &self,
        keyword: &str,
    ) -> impl Future<Output = Result<NewsResponse, ServiceError>> + Send;
}

/// In-process mailbox access, for a poller living next to the store
impl MailboxSource for MailboxStore {
    async fn fetch(&self, target: &PollTarget) -> Result<Option<MailboxEntry>, ServiceError> {
        Ok(match target {
            PollTarget::Latest => self.peek(),
            PollTarget::Job(job_id) => self.peek_job(job_id),
        })
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        MailboxStore::reset(self);
        Ok(())
    }

    async fn clear_latest(&self) -> Result<(), ServiceError> {
        MailboxStore::clear_latest(self);
        Ok(())
    }

    async fn discard(&self, job_id: &JobId) -> Result<(), ServiceError> {
        self.take_job(job_id);
        Ok(())
    }
}

/// Shared HTTP client construction
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("opsis/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            reqwest::Client::new()
        })
}

/// Decode JSON without serde_json's nesting limit, growing the stack as needed
pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))
        .map_err(|e| ServiceError::Decode(e.to_string()))?;
    deserializer
        .end()
        .map_err(|e| ServiceError::Decode(e.to_string()))?;
    Ok(value)
}

/// Turn a non-success response into `ServiceError::Status`
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status { status, body })
}
