// Thread payload and tree types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message of a reply chain as returned by the search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReplyChain {
    pub id: String,
    #[serde(default)]
    pub text: String,
    /// Next reply in the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<RawReplyChain>>,
}

impl RawReplyChain {
    pub fn leaf(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            child: None,
        }
    }

    pub fn with_child(mut self, child: RawReplyChain) -> Self {
        self.child = Some(Box::new(child));
        self
    }
}

/// Flat thread form: the starter tweet followed by the author's replies, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatThread {
    pub thread_id: i64,
    #[serde(default)]
    pub tweets: Vec<String>,
}

impl FlatThread {
    /// Link the tweets into a chain with ids `"{thread_id}-{index}"`
    pub fn to_chain(&self) -> Option<RawReplyChain> {
        self.tweets
            .iter()
            .enumerate()
            .rev()
            .fold(None, |next, (idx, text)| {
                Some(RawReplyChain {
                    id: format!("{}-{}", self.thread_id, idx),
                    text: text.clone(),
                    child: next.map(Box::new),
                })
            })
    }
}

/// Any thread shape the search service may return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawThread {
    Chain(RawReplyChain),
    Flat(FlatThread),
}

impl RawThread {
    pub fn to_chain(&self) -> Option<RawReplyChain> {
        match self {
            RawThread::Chain(chain) => Some(chain.clone()),
            RawThread::Flat(flat) => flat.to_chain(),
        }
    }

    pub fn into_chain(self) -> Option<RawReplyChain> {
        match self {
            RawThread::Chain(chain) => Some(chain),
            RawThread::Flat(flat) => flat.to_chain(),
        }
    }
}

/// Reconstructed tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub id: String,
    pub content: String,
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThreadError {
    #[error("Malformed thread at '{id}': {reason}")]
    MalformedThread { id: String, reason: String },
}

/// A thread that failed to build, reported alongside the good ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedReport {
    /// Position in the input collection
    pub index: usize,
    pub reason: String,
}

/// Result of building a whole search response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCollection {
    pub threads: Vec<ThreadNode>,
    pub malformed: Vec<MalformedReport>,
}

impl ThreadCollection {
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Record the outcome of building the thread at `index`
    pub(crate) fn push_built(
        &mut self,
        index: usize,
        built: Result<Option<ThreadNode>, ThreadError>,
    ) {
        match built {
            Ok(Some(node)) => self.threads.push(node),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Skipping thread #{}: {}", index, e);
                self.malformed.push(MalformedReport {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }
}
