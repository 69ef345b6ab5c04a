// HTTP client for the mailbox service

use super::{check_status, http_client, MailboxSource, PollTarget, ServiceError};
use crate::mailbox::{job_id_from_payload, JobId, MailboxEntry};
use crate::utils::join_url;
use reqwest::StatusCode;
use std::time::Duration;

pub struct MailboxClient {
    http: reqwest::Client,
    base_url: String,
}

impl MailboxClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            base_url: base_url.into(),
        }
    }

    /// GET a payload; 404 means the slot is empty
    async fn get_payload(
        &self,
        request: reqwest::RequestBuilder,
        job_id: Option<&JobId>,
    ) -> Result<Option<MailboxEntry>, ServiceError> {
        let response = request.send().await.map_err(ServiceError::from_reqwest)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        let job_id = job_id_from_payload(&payload).or_else(|| job_id.cloned());
        Ok(Some(MailboxEntry::new(job_id, payload)))
    }

    /// Latest entry, whichever job it belongs to
    pub async fn peek_latest(&self) -> Result<Option<MailboxEntry>, ServiceError> {
        let url = join_url(&self.base_url, "latest-data");
        self.get_payload(self.http.get(&url), None).await
    }

    /// Entry for one job (with the server's uncorrelated fallback)
    pub async fn peek_job(&self, job_id: &JobId) -> Result<Option<MailboxEntry>, ServiceError> {
        let url = join_url(&self.base_url, "latest-data");
        let request = self.http.get(&url).query(&[("jobId", job_id.as_str())]);
        self.get_payload(request, Some(job_id)).await
    }

    /// Remove and return the entry for one job
    pub async fn take_job(&self, job_id: &JobId) -> Result<Option<MailboxEntry>, ServiceError> {
        let url = join_url(&self.base_url, &format!("jobs/{}", job_id));
        self.get_payload(self.http.delete(&url), Some(job_id)).await
    }

    /// Empty the latest slot, keeping job-keyed results
    pub async fn clear_latest(&self) -> Result<(), ServiceError> {
        let url = join_url(&self.base_url, "latest-data");
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        check_status(response).await?;
        Ok(())
    }

    /// Clear the mailbox
    pub async fn reset(&self) -> Result<(), ServiceError> {
        let url = join_url(&self.base_url, "reset");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        check_status(response).await?;
        log::debug!("Mailbox at {} reset", self.base_url);
        Ok(())
    }
}

impl MailboxSource for MailboxClient {
    async fn fetch(&self, target: &PollTarget) -> Result<Option<MailboxEntry>, ServiceError> {
        match target {
            PollTarget::Latest => self.peek_latest().await,
            PollTarget::Job(job_id) => self.peek_job(job_id).await,
        }
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        MailboxClient::reset(self).await
    }

    async fn clear_latest(&self) -> Result<(), ServiceError> {
        MailboxClient::clear_latest(self).await
    }

    async fn discard(&self, job_id: &JobId) -> Result<(), ServiceError> {
        self.take_job(job_id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_mailbox_is_transport_error() {
        let client = MailboxClient::new("http://127.0.0.1:9", Duration::from_millis(500));
        let result = client.peek_latest().await;
        assert!(matches!(result, Err(ServiceError::Transport(_))));
    }
}
