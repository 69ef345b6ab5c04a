// Mailbox data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Correlation id tying a submitted job to its result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random job id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A result deposited by a producer callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxEntry {
    /// None for producers that do not echo the job id back
    pub job_id: Option<JobId>,
    /// Opaque producer payload, e.g. `{ "topic": ..., "keywords": [...] }`
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl MailboxEntry {
    pub fn new(job_id: Option<JobId>, payload: serde_json::Value) -> Self {
        Self {
            job_id,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Typed view of a keyword-generation payload
    pub fn keywords(&self) -> KeywordsPayload {
        KeywordsPayload::from_value(&self.payload)
    }
}

/// Job id echoed back by a producer, accepted as `jobId` or `job_id`
pub fn job_id_from_payload(payload: &serde_json::Value) -> Option<JobId> {
    ["jobId", "job_id"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| value.as_str())
        .filter(|id| !id.trim().is_empty())
        .map(JobId::from)
}

/// Keyword-generation result as sent by the producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordsPayload {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KeywordsPayload {
    /// Lenient parse: a missing or malformed `keywords` field reads as empty
    pub fn from_value(value: &serde_json::Value) -> Self {
        let topic = value
            .get("topic")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string());
        let keywords = value
            .get("keywords")
            .and_then(|k| k.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|k| k.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Self { topic, keywords }
    }
}

/// What to do when a result arrives while the latest slot is still unread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadPolicy {
    /// Replace the unread entry silently. Overlapping uncorrelated jobs lose data.
    #[default]
    Overwrite,
    /// Refuse the new result until the slot is reset
    Reject,
}

impl std::str::FromStr for UnreadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(UnreadPolicy::Overwrite),
            "reject" => Ok(UnreadPolicy::Reject),
            other => Err(format!(
                "Unknown unread policy '{}' (expected 'overwrite' or 'reject')",
                other
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    #[error("An unread result is still pending in the mailbox")]
    UnreadResultPending,
}
