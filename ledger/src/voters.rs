//! The set of voter identities still allowed to have a ballot accepted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tally_types::PublicKey;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemainingVoters(BTreeSet<PublicKey>);

impl RemainingVoters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the voter was not already eligible.
    pub fn insert(&mut self, voter: PublicKey) -> bool {
        self.0.insert(voter)
    }

    /// Consume the voter's eligibility. Returns `false` if it was not eligible.
    pub fn take(&mut self, voter: &PublicKey) -> bool {
        self.0.remove(voter)
    }

    pub fn contains(&self, voter: &PublicKey) -> bool {
        self.0.contains(voter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.iter()
    }
}

impl FromIterator<PublicKey> for RemainingVoters {
    fn from_iter<I: IntoIterator<Item = PublicKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<PublicKey> for RemainingVoters {
    fn extend<I: IntoIterator<Item = PublicKey>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
