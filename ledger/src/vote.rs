//! Signed ballots.

use serde::{Deserialize, Serialize};
use tally_crypto::CryptoError;
use tally_types::{KeyPair, PrivateKey, PublicKey, Signature};

use crate::error::VoteError;

/// A ballot bound to a voter identity.
///
/// The signature covers `voter ‖ vote_value` and is `None` until signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter: PublicKey,
    pub vote_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Vote {
    /// Create an unsigned vote.
    pub fn new(voter: PublicKey, vote_value: i64) -> Self {
        Self {
            voter,
            vote_value,
            signature: None,
        }
    }

    /// Create a vote for `keys.public` and sign it with `keys.private`.
    pub fn signed(keys: &KeyPair, vote_value: i64) -> Result<Self, CryptoError> {
        let mut vote = Self::new(keys.public.clone(), vote_value);
        vote.sign(&keys.private)?;
        Ok(vote)
    }

    /// The exact bytes the signature covers.
    pub fn signing_data(&self) -> String {
        format!("{}{}", self.voter, self.vote_value)
    }

    /// Sign the vote, replacing any previous signature.
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), CryptoError> {
        let signature = tally_crypto::sign_message(self.signing_data().as_bytes(), private_key)?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Check the signature against the voter's own public key.
    ///
    /// Any failure (missing signature, mismatch, malformed key material)
    /// makes the vote invalid.
    pub fn is_valid(&self) -> Result<(), VoteError> {
        let Some(signature) = &self.signature else {
            return Err(VoteError::Unsigned {
                voter: self.voter.clone(),
            });
        };
        match tally_crypto::verify_signature(self.signing_data().as_bytes(), signature, &self.voter) {
            Ok(true) => Ok(()),
            Ok(false) => Err(VoteError::BadSignature {
                voter: self.voter.clone(),
            }),
            Err(source) => Err(VoteError::Crypto {
                voter: self.voter.clone(),
                source,
            }),
        }
    }

    /// Deterministic text form fed into block hashes:
    /// `voter|||voteValue|||signature`, with `null` for an unsigned vote.
    pub fn to_canonical_string(&self) -> String {
        let signature = self.signature.as_ref().map_or("null", Signature::as_str);
        format!("{}|||{}|||{}", self.voter, self.vote_value, signature)
    }
}
