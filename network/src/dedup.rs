//! Rolling set of recently seen gossip digests.
//!
//! Stops a flooded message from being dispatched or relayed twice by the
//! same node. Keys are [`tally_protocol::Message::digest`] values, which
//! depend only on the message type and payload, so the same vote relayed by
//! different peers is recognised.

use std::collections::HashSet;
use std::collections::VecDeque;

pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Keeps the last `capacity` digests in insertion order; the oldest is
/// evicted when full.
pub struct MessageDedup {
    capacity: usize,
    hashes: HashSet<String>,
    order: VecDeque<String>,
}

impl MessageDedup {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            hashes: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` if the digest was already seen.
    /// Otherwise records it and returns `false`.
    pub fn is_duplicate(&mut self, digest: &str) -> bool {
        if self.contains(digest) {
            return true;
        }
        self.record(digest);
        false
    }

    /// Mark a digest as seen, evicting the oldest entry when full.
    /// Recording a digest already present is a no-op.
    pub fn record(&mut self, digest: &str) {
        if self.contains(digest) {
            return;
        }
        if self.hashes.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.hashes.remove(&old);
            }
        }
        self.hashes.insert(digest.to_owned());
        self.order.push_back(digest.to_owned());
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.hashes.contains(digest)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
