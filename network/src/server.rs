//! Inbound listener: one task per connection, one request and one response
//! per connection.

use std::time::Duration;

use tally_protocol::{read_frame, write_frame, Message, ProtocolError};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::manager::NetworkManager;

/// How long a connected client has to deliver its request.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until shutdown is signalled.
pub async fn run_listener(
    listener: TcpListener,
    manager: NetworkManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for peers");
    }
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("P2P listener shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &manager).await {
                                debug!(peer = %addr, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

/// Read one request, answer it, close.
pub async fn handle_connection(
    mut stream: TcpStream,
    manager: &NetworkManager,
) -> Result<(), crate::NetworkError> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let frame = tokio::time::timeout(READ_TIMEOUT, read_frame::<_, Message>(&mut reader))
        .await
        .map_err(|_| crate::NetworkError::Timeout("inbound request".into()))?;

    let response = match frame {
        Ok(message) => manager.handle_incoming_message(message).await?,
        Err(ProtocolError::Closed) => return Ok(()),
        Err(e) => {
            warn!(error = %e, "malformed inbound message");
            manager.reject_malformed(&e)?
        }
    };

    write_frame(&mut write_half, &response).await?;
    Ok(())
}
