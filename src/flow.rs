// Client-side analysis flow: submit a topic, wait for keywords, load threads

use crate::client::{
    JobProducer, MailboxSource, NewsResponse, PollTarget, ServiceError, SubmissionError,
    ThreadSearch,
};
use crate::mailbox::JobId;
use crate::poll::{PollConfig, PollHandle, PollLoop};
use crate::threads::{self, ThreadCollection};
use crate::view::ViewState;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("Keyword must not be empty")]
    EmptyKeyword,

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Search failed: {0}")]
    Search(#[from] ServiceError),
}

/// One user session of the analysis flow
pub struct AnalysisFlow<P, M, S> {
    producer: P,
    mailbox: Arc<M>,
    search: S,
    poll_config: PollConfig,
    view: ViewState,
    /// Job submitted by the last `start`
    current_job: Option<JobId>,
}

impl<P, M, S> AnalysisFlow<P, M, S>
where
    P: JobProducer,
    M: MailboxSource,
    S: ThreadSearch,
{
    pub fn new(producer: P, mailbox: Arc<M>, search: S, poll_config: PollConfig) -> Self {
        Self {
            producer,
            mailbox,
            search,
            poll_config,
            view: ViewState::new(),
            current_job: None,
        }
    }

    /// Start over: collapse every thread and drop stale results.
    ///
    /// Only this flow's previous job and the latest slot are cleared. Results
    /// of other flows sharing the mailbox stay put so their pollers still
    /// resolve.
    pub async fn begin(&mut self) {
        self.view.reset_all();
        if let Some(previous) = self.current_job.take() {
            if let Err(e) = self.mailbox.discard(&previous).await {
                log::warn!("Failed to discard result of job {}: {}", previous, e);
            }
        }
        if let Err(e) = self.mailbox.clear_latest().await {
            log::warn!("Failed to clear latest mailbox slot: {}", e);
        }
    }

    /// Submit `topic` and start waiting for its keywords
    pub async fn start(&mut self, topic: &str) -> Result<PollHandle, FlowError> {
        self.begin().await;

        let accepted = self.producer.submit(topic).await?;
        log::info!("Job {} accepted for topic '{}'", accepted.job_id, accepted.topic);
        self.current_job = Some(accepted.job_id.clone());

        Ok(PollLoop::spawn(
            Arc::clone(&self.mailbox),
            PollTarget::Job(accepted.job_id),
            self.poll_config,
        ))
    }

    /// Search threads for a chosen keyword and build their trees
    pub async fn load_threads(&self, keyword: &str) -> Result<ThreadCollection, FlowError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(FlowError::EmptyKeyword);
        }

        let response = self.search.search_threads(keyword).await?;

        if response.threads.is_empty() {
            // Single tweets stand in when no thread matched
            if let Some(top_tweets) = response.top_tweets {
                return Ok(threads::build_from_values(top_tweets));
            }
        }

        Ok(threads::build_from_values(response.threads))
    }

    pub async fn load_news(&self, keyword: &str) -> Result<NewsResponse, FlowError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(FlowError::EmptyKeyword);
        }
        Ok(self.search.search_news(keyword).await?)
    }

    pub fn current_job(&self) -> Option<&JobId> {
        self.current_job.as_ref()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }
}
