//! WebSocket Connector
//!
//! Production [`Connector`] that opens the push channel with
//! `tokio-tungstenite`. The socket is split and pumped by two tasks:
//!
//! - read task: socket -> `inbound` (text and binary frames)
//! - write task: `outbound` -> socket (text frames)
//!
//! The read task ends on EOF, a close frame or a read error, which closes
//! `inbound` and tells the supervisor the connection is gone. The write task
//! sends a close frame once `outbound` is dropped.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::traits::{Connector, InboundFrame, PushConnection, TransportError};

/// Connector for `ws://` and `wss://` endpoints
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    capacity: usize,
}

impl WebSocketConnector {
    /// Create a connector whose per-connection queues hold `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<PushConnection, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to connect to {endpoint}: {e}"))
            })?;

        let (mut sink, mut source) = stream.split();
        let (inbound_tx, inbound) = mpsc::channel::<InboundFrame>(self.capacity);
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(self.capacity);

        // Spawn read task: socket -> inbound
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => InboundFrame::Text(text),
                    Ok(Message::Binary(bytes)) => InboundFrame::Binary(bytes),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Close frame received");
                        break;
                    }
                    // Pings are answered by tungstenite itself
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket read error");
                        break;
                    }
                };

                if inbound_tx.send(frame).await.is_err() {
                    tracing::debug!("Inbound receiver dropped");
                    break;
                }
            }
            tracing::debug!("WebSocket read task finished");
        });

        // Spawn write task: outbound -> socket
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "WebSocket write error");
                    return;
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "WebSocket close failed");
            }
        });

        tracing::info!(endpoint, "WebSocket connected");

        Ok(PushConnection { inbound, outbound })
    }
}
