//! FIFO queue of votes waiting to be mined.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::vote::Vote;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingVotes(VecDeque<Vote>);

impl PendingVotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vote: Vote) {
        self.0.push_back(vote);
    }

    /// Remove every queued vote, oldest first.
    pub fn drain_all(&mut self) -> Vec<Vote> {
        self.0.drain(..).collect()
    }

    /// Put votes back at the head of the queue, keeping their order.
    pub fn requeue_front(&mut self, votes: Vec<Vote>) {
        for vote in votes.into_iter().rev() {
            self.0.push_front(vote);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.0.iter()
    }
}

impl FromIterator<Vote> for PendingVotes {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
