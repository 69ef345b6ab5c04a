// Job submission to the keyword-generation producer

use super::{http_client, JobProducer};
use crate::mailbox::JobId;
use crate::utils::join_url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Acknowledgement that the producer queued the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
    pub topic: String,
    /// Producer's acknowledgement text, if any
    pub message: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("Failed to reach producer: {0}")]
    Transport(String),

    #[error("Producer rejected job ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Request body for the producer's queue endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueJobRequest<'a> {
    topic: &'a str,
    job_id: &'a JobId,
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueueJobResponse {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP Job Submitter. Holds no per-job state.
pub struct ProducerClient {
    http: reqwest::Client,
    base_url: String,
    callback_url: String,
}

impl ProducerClient {
    pub fn new(base_url: impl Into<String>, callback_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            base_url: base_url.into(),
            callback_url: callback_url.into(),
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }
}

impl JobProducer for ProducerClient {
    async fn submit(&self, topic: &str) -> Result<JobAccepted, SubmissionError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SubmissionError::EmptyTopic);
        }

        let job_id = JobId::generate();
        let url = join_url(&self.base_url, "queue-keywords");
        let body = QueueJobRequest {
            topic,
            job_id: &job_id,
            callback_url: &self.callback_url,
        };

        log::info!("Queueing keyword job {} for topic '{}'", job_id, topic);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            log::warn!("Producer rejected job {} ({}): {}", job_id, status, text);
            return Err(SubmissionError::Rejected { status, body: text });
        }

        // The acknowledgement body is informational only
        let message = response
            .json::<QueueJobResponse>()
            .await
            .ok()
            .and_then(|ack| ack.message);

        Ok(JobAccepted {
            job_id,
            topic: topic.to_string(),
            message,
        })
    }
}
