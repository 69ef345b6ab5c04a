//! Result mailbox shared between asynchronous producers and pollers
//!
//! The store keeps two views of delivered results:
//! - a single "latest" slot, which is what uncorrelated pollers see. A new
//!   result silently replaces an unread one under `UnreadPolicy::Overwrite`,
//!   so overlapping jobs without job ids lose data.
//! - a bounded map from job id to result, so correlated jobs never clobber
//!   each other. The oldest job entry is evicted once capacity is reached.

mod types;

pub use types::{
    job_id_from_payload, JobId, KeywordsPayload, MailboxEntry, MailboxError, UnreadPolicy,
};

use crate::events::{
    EventBroadcaster, MailboxFilledPayload, MailboxResetPayload, MailboxTakenPayload,
    EVENT_MAILBOX_FILLED, EVENT_MAILBOX_RESET, EVENT_MAILBOX_TAKEN,
};
use crate::utils::lock_mutex_recover;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Default number of job-keyed results retained
pub const DEFAULT_JOB_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct MailboxSlots {
    latest: Option<MailboxEntry>,
    jobs: HashMap<JobId, MailboxEntry>,
    /// Insertion order of `jobs`, oldest first
    order: VecDeque<JobId>,
}

impl MailboxSlots {
    fn remove_job(&mut self, job_id: &JobId) -> Option<MailboxEntry> {
        let entry = self.jobs.remove(job_id)?;
        self.order.retain(|id| id != job_id);
        Some(entry)
    }

    fn entry_count(&self) -> usize {
        let latest_only = match &self.latest {
            Some(entry) => match &entry.job_id {
                Some(id) => !self.jobs.contains_key(id),
                None => true,
            },
            None => false,
        };
        self.jobs.len() + usize::from(latest_only)
    }
}

/// In-memory, process-lifetime result store
pub struct MailboxStore {
    slots: Mutex<MailboxSlots>,
    capacity: usize,
    policy: UnreadPolicy,
    broadcaster: Option<Arc<EventBroadcaster>>,
}

impl MailboxStore {
    /// Create a store with the default capacity and overwrite policy
    pub fn new() -> Self {
        Self::with_options(DEFAULT_JOB_CAPACITY, UnreadPolicy::default())
    }

    pub fn with_options(capacity: usize, policy: UnreadPolicy) -> Self {
        Self {
            slots: Mutex::new(MailboxSlots::default()),
            capacity: capacity.max(1),
            policy,
            broadcaster: None,
        }
    }

    /// Announce fills and resets on the given broadcaster
    pub fn with_broadcaster(mut self, broadcaster: Arc<EventBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn policy(&self) -> UnreadPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deposit a producer result.
    ///
    /// Always updates the latest slot; correlated results are also kept under
    /// their job id. Fails only under `UnreadPolicy::Reject` while the latest
    /// slot is occupied.
    pub fn submit_result(
        &self,
        job_id: Option<JobId>,
        payload: serde_json::Value,
    ) -> Result<MailboxEntry, MailboxError> {
        let entry = MailboxEntry::new(job_id, payload);
        let overwrote_unread;
        {
            let mut slots = lock_mutex_recover(&self.slots);

            overwrote_unread = slots.latest.is_some();
            if overwrote_unread && self.policy == UnreadPolicy::Reject {
                log::warn!(
                    "Rejecting result for job {:?}: unread result still pending",
                    entry.job_id.as_ref().map(|id| id.as_str())
                );
                return Err(MailboxError::UnreadResultPending);
            }

            if let Some(ref job_id) = entry.job_id {
                if slots.jobs.contains_key(job_id) {
                    slots.order.retain(|id| id != job_id);
                }
                slots.jobs.insert(job_id.clone(), entry.clone());
                slots.order.push_back(job_id.clone());

                while slots.order.len() > self.capacity {
                    if let Some(evicted) = slots.order.pop_front() {
                        slots.jobs.remove(&evicted);
                        log::debug!("Evicted mailbox entry for job {}", evicted);
                    }
                }
            }

            slots.latest = Some(entry.clone());
        }

        if overwrote_unread {
            log::warn!("Mailbox latest slot overwritten while unread");
        }
        log::info!(
            "Mailbox filled (job: {})",
            entry
                .job_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("<uncorrelated>")
        );

        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.broadcast(
                EVENT_MAILBOX_FILLED,
                MailboxFilledPayload {
                    job_id: entry.job_id.as_ref().map(|id| id.to_string()),
                    overwrote_unread,
                    received_at: entry.received_at.to_rfc3339(),
                },
            );
        }

        Ok(entry)
    }

    /// Current latest entry, without side effects
    pub fn peek(&self) -> Option<MailboxEntry> {
        lock_mutex_recover(&self.slots).latest.clone()
    }

    /// Entry for a specific job.
    ///
    /// Falls back to an uncorrelated latest entry so producers that never echo
    /// the job id still resolve the single in-flight job.
    pub fn peek_job(&self, job_id: &JobId) -> Option<MailboxEntry> {
        let slots = lock_mutex_recover(&self.slots);
        if let Some(entry) = slots.jobs.get(job_id) {
            return Some(entry.clone());
        }
        slots
            .latest
            .as_ref()
            .filter(|entry| entry.job_id.is_none())
            .cloned()
    }

    /// Remove and return the entry for a job (exactly-once consumption)
    pub fn take_job(&self, job_id: &JobId) -> Option<MailboxEntry> {
        let taken = {
            let mut slots = lock_mutex_recover(&self.slots);
            match slots.remove_job(job_id) {
                Some(entry) => {
                    let latest_is_same = slots
                        .latest
                        .as_ref()
                        .map(|latest| latest.job_id.as_ref() == Some(job_id))
                        .unwrap_or(false);
                    if latest_is_same {
                        slots.latest = None;
                    }
                    Some(entry)
                }
                None => {
                    let uncorrelated = slots
                        .latest
                        .as_ref()
                        .map(|latest| latest.job_id.is_none())
                        .unwrap_or(false);
                    if uncorrelated {
                        slots.latest.take()
                    } else {
                        None
                    }
                }
            }
        };

        if taken.is_some() {
            log::debug!("Mailbox entry for job {} consumed", job_id);
            if let Some(ref broadcaster) = self.broadcaster {
                broadcaster.broadcast(
                    EVENT_MAILBOX_TAKEN,
                    MailboxTakenPayload {
                        job_id: job_id.to_string(),
                    },
                );
            }
        }
        taken
    }

    /// Empty the latest slot only.
    ///
    /// Job-keyed results survive, so pollers waiting on their own job id are
    /// unaffected. Returns whether anything was cleared.
    pub fn clear_latest(&self) -> bool {
        let cleared = lock_mutex_recover(&self.slots).latest.take();
        match cleared {
            Some(entry) => {
                log::debug!(
                    "Mailbox latest slot cleared (job: {})",
                    entry
                        .job_id
                        .as_ref()
                        .map(|id| id.as_str())
                        .unwrap_or("<uncorrelated>")
                );
                true
            }
            None => false,
        }
    }

    /// Clear every entry. Idempotent.
    pub fn reset(&self) {
        let cleared_entries = {
            let mut slots = lock_mutex_recover(&self.slots);
            let count = slots.entry_count();
            *slots = MailboxSlots::default();
            count
        };

        log::info!("Mailbox reset ({} entries cleared)", cleared_entries);
        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.broadcast(EVENT_MAILBOX_RESET, MailboxResetPayload { cleared_entries });
        }
    }

    /// Number of distinct results held
    pub fn len(&self) -> usize {
        lock_mutex_recover(&self.slots).entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MailboxStore {
    fn default() -> Self {
        Self::new()
    }
}
