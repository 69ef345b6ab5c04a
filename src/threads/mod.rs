// Thread tree reconstruction from raw reply chains

mod types;

pub use types::{
    FlatThread, MalformedReport, RawReplyChain, RawThread, ThreadCollection, ThreadError,
    ThreadNode,
};

use serde_json::Value;
use std::collections::HashSet;

/// Longest reply chain accepted before the payload is treated as malformed
pub const MAX_CHAIN_DEPTH: usize = 1_000;

/// Build a thread tree from a raw reply chain.
///
/// `None` yields `Ok(None)`. Each raw message becomes a node whose only child
/// is the next reply. Fails with `MalformedThread` on a repeated id (a cycle
/// in the reply references), an empty id, or a chain deeper than
/// `MAX_CHAIN_DEPTH`.
pub fn build(raw: Option<&RawReplyChain>) -> Result<Option<ThreadNode>, ThreadError> {
    let Some(root) = raw else {
        return Ok(None);
    };

    // Walk the chain first so the tree can be assembled without recursion
    let mut chain: Vec<&RawReplyChain> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cursor = Some(root);

    while let Some(node) = cursor {
        if node.id.trim().is_empty() {
            return Err(ThreadError::MalformedThread {
                id: root.id.clone(),
                reason: format!("reply at depth {} has an empty id", chain.len()),
            });
        }
        if !seen.insert(node.id.as_str()) {
            return Err(ThreadError::MalformedThread {
                id: root.id.clone(),
                reason: format!("reply chain cycles back to '{}'", node.id),
            });
        }
        if chain.len() == MAX_CHAIN_DEPTH {
            return Err(ThreadError::MalformedThread {
                id: root.id.clone(),
                reason: format!("reply chain exceeds {} messages", MAX_CHAIN_DEPTH),
            });
        }
        chain.push(node);
        cursor = node.child.as_deref();
    }

    let tree = chain.into_iter().rev().fold(None, |below, raw_node| {
        Some(ThreadNode {
            id: raw_node.id.clone(),
            content: raw_node.text.clone(),
            children: below.into_iter().collect(),
        })
    });

    Ok(tree)
}

/// Build every thread of a search response, preserving order.
///
/// Null entries are skipped. A malformed thread does not abort the others;
/// it is logged and listed in `ThreadCollection::malformed`.
pub fn build_all(raw_threads: &[Option<RawThread>]) -> ThreadCollection {
    let mut collection = ThreadCollection::default();

    for (index, raw) in raw_threads.iter().enumerate() {
        let chain = raw.as_ref().and_then(|thread| thread.to_chain());
        collection.push_built(index, build(chain.as_ref()));
    }

    log_collection(&collection);
    collection
}

/// Build threads straight from undecoded JSON elements.
///
/// Each element is converted on its own, so one thread with a missing id,
/// a wrong type, or a chain past `MAX_CHAIN_DEPTH` is reported at its index
/// while the rest of the response still builds.
pub fn build_from_values(raw_threads: Vec<Value>) -> ThreadCollection {
    let mut collection = ThreadCollection::default();

    for (index, value) in raw_threads.into_iter().enumerate() {
        let built = parse_thread(value).and_then(|raw| {
            let chain = raw.and_then(RawThread::into_chain);
            build(chain.as_ref())
        });
        collection.push_built(index, built);
    }

    log_collection(&collection);
    collection
}

/// Decode one search-service thread element.
///
/// `null` is no thread. Objects carrying `thread_id` are flat threads,
/// anything else is read as a reply chain by walking `child` links without
/// recursion.
pub fn parse_thread(value: Value) -> Result<Option<RawThread>, ThreadError> {
    let flat_id = value.get("thread_id").map(|id| id.to_string());

    match value {
        Value::Null => Ok(None),
        Value::Object(_) if flat_id.is_some() => serde_json::from_value::<FlatThread>(value)
            .map(|flat| Some(RawThread::Flat(flat)))
            .map_err(|e| ThreadError::MalformedThread {
                id: flat_id.unwrap_or_default(),
                reason: format!("invalid flat thread: {}", e),
            }),
        Value::Object(_) => chain_from_value(value).map(|chain| Some(RawThread::Chain(chain))),
        other => Err(ThreadError::MalformedThread {
            id: String::new(),
            reason: format!("expected an object, got {}", json_kind(&other)),
        }),
    }
}

fn chain_from_value(value: Value) -> Result<RawReplyChain, ThreadError> {
    let mut links: Vec<(String, String)> = Vec::new();
    let mut cursor = Some(value);

    while let Some(current) = cursor.take() {
        let root_id = links.first().map(|(id, _)| id.clone()).unwrap_or_default();
        let malformed = |reason: String| ThreadError::MalformedThread {
            id: root_id.clone(),
            reason,
        };

        let mut map = match current {
            Value::Object(map) => map,
            other => {
                return Err(malformed(format!(
                    "reply at depth {} is {}, not an object",
                    links.len(),
                    json_kind(&other)
                )))
            }
        };
        let child = map.remove("child");

        if links.len() == MAX_CHAIN_DEPTH {
            unwind_chain(child);
            return Err(malformed(format!(
                "reply chain exceeds {} messages",
                MAX_CHAIN_DEPTH
            )));
        }

        let id = match map.remove("id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                unwind_chain(child);
                return Err(malformed(format!(
                    "reply at depth {} has no string id",
                    links.len()
                )));
            }
        };
        let text = match map.remove("text") {
            Some(Value::String(text)) => text,
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };

        links.push((id, text));
        cursor = child.filter(|next| !next.is_null());
    }

    links
        .into_iter()
        .rev()
        .fold(None, |below: Option<RawReplyChain>, (id, text)| {
            Some(RawReplyChain {
                id,
                text,
                child: below.map(Box::new),
            })
        })
        .ok_or_else(|| ThreadError::MalformedThread {
            id: String::new(),
            reason: "empty reply chain".to_string(),
        })
}

/// Drop an abandoned chain tail link by link instead of recursively
fn unwind_chain(mut next: Option<Value>) {
    while let Some(Value::Object(mut map)) = next {
        next = map.remove("child");
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn log_collection(collection: &ThreadCollection) {
    log::debug!(
        "Built {} threads ({} malformed)",
        collection.threads.len(),
        collection.malformed.len()
    );
}
