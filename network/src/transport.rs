//! Outbound request/response transport.
//!
//! [`TcpTransport`] opens one connection per request. [`NullTransport`]
//! records what would have been sent and answers from a script, so the
//! message protocol can be exercised without sockets.

use std::time::Duration;

use async_trait::async_trait;
use tally_protocol::{read_frame, write_frame, Message};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::NetworkError;

/// Bound on connect + write + read for a single request.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `addr` (`"host:port"`) and wait for the reply.
    async fn send(&self, addr: &str, message: &Message) -> Result<Message, NetworkError>;
}

/// One TCP connection per request: connect, write a frame, read a frame, close.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(addr: &str, message: &Message) -> Result<Message, NetworkError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(format!("TCP connect to {addr} failed: {e}")))?;
        let (read_half, mut write_half) = stream.split();
        write_frame(&mut write_half, message).await?;
        let mut reader = BufReader::new(read_half);
        let response = read_frame(&mut reader).await?;
        Ok(response)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, addr: &str, message: &Message) -> Result<Message, NetworkError> {
        tokio::time::timeout(self.timeout, Self::exchange(addr, message))
            .await
            .map_err(|_| NetworkError::Timeout(addr.to_owned()))?
    }
}

type Responder = Box<dyn Fn(&str, &Message) -> Option<Message> + Send + Sync>;

/// A transport that records messages instead of sending them.
///
/// Replies come from the responder closure; `None` simulates an
/// unreachable peer.
pub struct NullTransport {
    sent: Mutex<Vec<(String, Message)>>,
    responder: Responder,
}

impl NullTransport {
    /// Every peer is unreachable.
    pub fn new() -> Self {
        Self::with_responder(|_, _| None)
    }

    pub fn with_responder(
        responder: impl Fn(&str, &Message) -> Option<Message> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// All `(addr, message)` pairs sent so far.
    pub async fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().await.clone()
    }

    pub async fn reset(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, addr: &str, message: &Message) -> Result<Message, NetworkError> {
        self.sent
            .lock()
            .await
            .push((addr.to_owned(), message.clone()));
        (self.responder)(addr, message)
            .ok_or_else(|| NetworkError::ConnectionFailed(format!("{addr} unreachable")))
    }
}
