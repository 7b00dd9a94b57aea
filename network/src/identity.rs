//! This node's own identity: its peer id plus the private key.

use serde_json::Value;
use tally_crypto::CryptoError;
use tally_protocol::{Message, MessageType};
use tally_types::{KeyPair, PublicKey, RemotePeer};

#[derive(Debug)]
pub struct LocalIdentity {
    host: String,
    port: u16,
    keys: KeyPair,
}

impl LocalIdentity {
    /// Fails if the private key is malformed or does not match the public key.
    pub fn new(host: impl Into<String>, port: u16, keys: KeyPair) -> Result<Self, CryptoError> {
        let derived = tally_crypto::public_from_private(&keys.private)?;
        if derived != keys.public {
            return Err(CryptoError::MalformedKey(
                "public key does not match private key".into(),
            ));
        }
        Ok(Self {
            host: host.into(),
            port,
            keys,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keys.public
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// The public projection other peers know us by.
    pub fn peer_id(&self) -> RemotePeer {
        RemotePeer::new(self.host.clone(), self.port, self.keys.public.clone())
    }

    /// Wrap `data` in an envelope from this node and sign it.
    pub fn sign(&self, message_type: MessageType, data: Value) -> Result<Message, CryptoError> {
        Message::signed(self.peer_id(), message_type, data, &self.keys.private)
    }

    pub fn reject(&self, reason: impl Into<String>) -> Result<Message, CryptoError> {
        Message::rejection(self.peer_id(), reason, &self.keys.private)
    }
}
