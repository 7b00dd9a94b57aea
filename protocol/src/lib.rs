//! Wire protocol: the signed message envelope and its framing.
//!
//! One request and one response per TCP connection, each a single line of
//! JSON terminated by `\n`.

pub mod codec;
pub mod error;
pub mod message;
pub mod payload;

pub use codec::{decode, encode, read_frame, write_frame, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use message::{Message, MessageType};
pub use payload::VoterPayload;
