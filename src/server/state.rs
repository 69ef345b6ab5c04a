//! Server application state shared across handlers

use crate::config::MailboxConfig;
use crate::events::EventBroadcaster;
use crate::mailbox::MailboxStore;
use crate::shutdown::ShutdownState;
use std::sync::Arc;

/// Shared state for the mailbox server
#[derive(Clone)]
pub struct ServerAppState {
    /// Result mailbox filled by producer callbacks
    pub mailbox: Arc<MailboxStore>,

    /// Event broadcaster for WebSocket clients
    pub broadcaster: Arc<EventBroadcaster>,

    /// Shutdown state
    pub shutdown_state: ShutdownState,
}

impl ServerAppState {
    /// Build a fresh mailbox wired to a new broadcaster
    pub fn new(config: &MailboxConfig, shutdown_state: ShutdownState) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let mailbox = MailboxStore::with_options(config.capacity, config.unread_policy)
            .with_broadcaster(Arc::clone(&broadcaster));

        Self {
            mailbox: Arc::new(mailbox),
            broadcaster,
            shutdown_state,
        }
    }

    /// Serve an existing store, e.g. one shared with an in-process poller
    pub fn with_mailbox(
        mailbox: Arc<MailboxStore>,
        broadcaster: Arc<EventBroadcaster>,
        shutdown_state: ShutdownState,
    ) -> Self {
        Self {
            mailbox,
            broadcaster,
            shutdown_state,
        }
    }
}
