//! Duplicate suppression for at-most-once invocation semantics.
//!
//! The cache maps `(peer, request-id)` to the reply generated by the first
//! execution. Each key owns a small async mutex; the dispatcher holds it
//! across the check → execute → insert sequence, so two datagrams for the
//! same key can never both execute while distinct keys proceed in parallel.
//! Entries live for the whole server process — a retransmitting client must
//! always find its reply.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::wire::Reply;

/// Which invocation semantics the server realises over the lossy transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    /// Every well-formed request executes; retries may replay effects.
    AtLeastOnce,
    /// Each `(peer, request-id)` executes at most once; retries get the
    /// cached reply byte-for-byte.
    AtMostOnce,
}

impl Semantics {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semantics::AtLeastOnce => "at-least-once",
            Semantics::AtMostOnce => "at-most-once",
        }
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Semantics {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "at-least-once" => Ok(Semantics::AtLeastOnce),
            "at-most-once" => Ok(Semantics::AtMostOnce),
            other => Err(format!(
                "unknown semantics: {other} (expected at-least-once or at-most-once)"
            )),
        }
    }
}

/// Cache key. The peer address is part of the key, so two clients that
/// coincidentally mint the same request id never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub peer: String,
    pub request_id: u64,
}

pub type ReplySlot = Arc<Mutex<Option<Reply>>>;

pub struct ReplyCache {
    entries: DashMap<RequestKey, ReplySlot>,
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The slot for `key`, created empty on first sight. Callers lock the
    /// slot for the duration of their execution.
    pub fn slot(&self, key: RequestKey) -> ReplySlot {
        self.entries.entry(key).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
