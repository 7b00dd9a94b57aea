//! Framing: one JSON document per line.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode a message for transmission (JSON followed by `\n`).
pub fn encode(message: &impl Serialize) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a message from raw bytes.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Read one newline-terminated frame. EOF before any byte is [`ProtocolError::Closed`].
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let limit = (MAX_MESSAGE_SIZE + 1) as u64;
    let n = AsyncReadExt::take(&mut *reader, limit)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Err(ProtocolError::Closed);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: buf.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    decode(&buf)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, message: &impl Serialize) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(message)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
