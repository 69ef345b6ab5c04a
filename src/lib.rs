// Clippy allows for reasonable defaults
// These suppress warnings where the suggested change doesn't improve readability
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::clone_on_copy)] // .clone() can be clearer than implicit copy
#![allow(clippy::collapsible_if)] // Separate ifs can be more readable
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f

// Module declarations
pub mod client;
pub mod config;
pub mod events;
pub mod flow;
pub mod mailbox;
pub mod poll;
pub mod producer;
pub mod shutdown;
pub mod threads;
mod utils;
pub mod view;

// Server module (HTTP/WebSocket API)
pub mod server;

pub use client::{JobProducer, MailboxSource, PollTarget, ThreadSearch};
pub use flow::{AnalysisFlow, FlowError};
pub use mailbox::{JobId, MailboxEntry, MailboxStore, UnreadPolicy};
pub use poll::{PollConfig, PollHandle, PollLoop, PollOutcome, PollState};
pub use threads::{ThreadCollection, ThreadNode};
pub use view::{ViewState, VisibleNode};
pub use utils::join_url;
