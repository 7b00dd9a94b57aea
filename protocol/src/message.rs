//! The signed message envelope shared by requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_crypto::CryptoError;
use tally_types::{PrivateKey, RemotePeer, Signature};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    SendVote,
    SendVoter,
    SendBlock,
    RequestBlockchain,
    RequestConnection,
    Accepted,
    AcceptedRequest,
    Rejected,
    /// Any tag this node does not recognise.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendVote => "send_vote",
            Self::SendVoter => "send_voter",
            Self::SendBlock => "send_block",
            Self::RequestBlockchain => "request_blockchain",
            Self::RequestConnection => "request_connection",
            Self::Accepted => "accepted",
            Self::AcceptedRequest => "accepted_request",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        }
    }

    /// One of the five types a node accepts as an inbound request.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::SendVote
                | Self::SendVoter
                | Self::SendBlock
                | Self::RequestBlockchain
                | Self::RequestConnection
        )
    }

    /// Gossiped payloads, subject to de-duplication and re-broadcast.
    pub fn is_gossip(&self) -> bool {
        matches!(self, Self::SendVote | Self::SendVoter | Self::SendBlock)
    }

    /// The response type for a successfully handled request of this type.
    pub fn accepted_response(&self) -> MessageType {
        match self {
            Self::RequestBlockchain | Self::RequestConnection => Self::AcceptedRequest,
            _ => Self::Accepted,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope: who sent it, what it is, the payload, and the sender's
/// signature over the payload's canonical JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: RemotePeer,
    pub message_type: MessageType,
    pub data: Value,
    pub signature: Signature,
}

impl Message {
    /// Build and sign a message.
    pub fn signed(
        sender: RemotePeer,
        message_type: MessageType,
        data: Value,
        private_key: &PrivateKey,
    ) -> Result<Self, CryptoError> {
        let signature = tally_crypto::sign_message(canonical_json(&data).as_bytes(), private_key)?;
        Ok(Self {
            sender,
            message_type,
            data,
            signature,
        })
    }

    /// A signed `rejected` response carrying `{"reason": ...}`.
    pub fn rejection(
        sender: RemotePeer,
        reason: impl Into<String>,
        private_key: &PrivateKey,
    ) -> Result<Self, CryptoError> {
        let reason: String = reason.into();
        let data = serde_json::json!({ "reason": reason });
        Self::signed(sender, MessageType::Rejected, data, private_key)
    }

    /// The exact text the signature covers.
    ///
    /// `serde_json` keeps object keys sorted, so a payload re-serialized
    /// after parsing yields the same text the sender signed.
    pub fn canonical_data(&self) -> String {
        canonical_json(&self.data)
    }

    /// Check the signature against the sender's embedded public key.
    pub fn verify(&self) -> Result<bool, CryptoError> {
        tally_crypto::verify_signature(
            self.canonical_data().as_bytes(),
            &self.signature,
            &self.sender.public_key,
        )
    }

    /// Content hash identifying this message independent of who relayed it.
    pub fn digest(&self) -> String {
        tally_crypto::sha256_hex_multi(&[
            self.message_type.as_str().as_bytes(),
            self.canonical_data().as_bytes(),
        ])
    }

    /// The rejection reason, if this is a `rejected` response.
    pub fn reason(&self) -> Option<&str> {
        if self.message_type != MessageType::Rejected {
            return None;
        }
        self.data.get("reason").and_then(Value::as_str)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::Accepted | MessageType::AcceptedRequest
        )
    }
}

fn canonical_json(data: &Value) -> String {
    data.to_string()
}
