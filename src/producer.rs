// Producer-side delivery of finished keyword jobs to the mailbox callback

use crate::client::http_client;
use crate::mailbox::JobId;
use serde::Serialize;
use std::time::Duration;

/// Timeout for a single callback delivery
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Body posted to the callback endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub topic: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

/// Posts keyword results back to a mailbox. One attempt per delivery.
pub struct CallbackNotifier {
    http: reqwest::Client,
}

impl CallbackNotifier {
    pub fn new() -> Self {
        Self::with_timeout(CALLBACK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
        }
    }

    pub async fn notify(&self, callback_url: &str, payload: &CallbackPayload) -> Result<(), String> {
        let result = self
            .http
            .post(callback_url)
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                log::info!(
                    "Delivered keywords for topic '{}' to {}",
                    payload.topic,
                    callback_url
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to call back {}: {}", callback_url, e);
                Err(format!("Failed to call back {}: {}", callback_url, e))
            }
        }
    }
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new()
    }
}
