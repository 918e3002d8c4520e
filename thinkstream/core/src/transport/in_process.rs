//! In-Process Connector
//!
//! Channel-backed [`Connector`] for embedding a push peer in the same process
//! (demos, tests, local simulations). Each call to
//! [`InProcessConnector::accept_next`] queues one connection for the next
//! `connect()` and hands back the peer's end of it. A `connect()` with nothing
//! queued fails the way an unreachable server would.
//!
//! # Usage
//!
//! ```ignore
//! let connector = InProcessConnector::new();
//! let peer = connector.accept_next();
//!
//! let transport = PushTransport::start(TransportConfig::default(), Arc::new(connector));
//! peer.push_envelope(&Envelope::thinking("looking things up")).await;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

use super::traits::{Connector, InboundFrame, PushConnection, TransportError};

/// Default channel capacity for in-process connections
const DEFAULT_CAPACITY: usize = 100;

#[derive(Default)]
struct ConnectorState {
    pending: VecDeque<PushConnection>,
    attempts: u32,
}

/// Connector that hands out pre-arranged in-process connections
#[derive(Clone, Default)]
pub struct InProcessConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl InProcessConnector {
    /// Create a connector with no pending connections
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for the next `connect()` and return the peer end
    #[must_use]
    pub fn accept_next(&self) -> PeerEnd {
        let (connection, peer) = PeerEnd::pair(DEFAULT_CAPACITY);
        self.state.lock().pending.push_back(connection);
        peer
    }

    /// Total number of `connect()` calls so far, successful or not
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    fn take_next(&self, endpoint: &str) -> Result<PushConnection, TransportError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        state.pending.pop_front().ok_or_else(|| {
            TransportError::ConnectionFailed(format!("no in-process peer for {endpoint}"))
        })
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, endpoint: &str) -> Result<PushConnection, TransportError> {
        self.take_next(endpoint)
    }
}

/// The server side of an in-process connection
///
/// Dropping it closes the connection from the peer's side.
#[derive(Debug)]
pub struct PeerEnd {
    inbound_tx: mpsc::Sender<InboundFrame>,
    outbound_rx: mpsc::Receiver<String>,
}

impl PeerEnd {
    /// Create a connected pair
    #[must_use]
    pub fn pair(capacity: usize) -> (PushConnection, Self) {
        let (inbound_tx, inbound) = mpsc::channel(capacity);
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        (
            PushConnection { inbound, outbound },
            Self {
                inbound_tx,
                outbound_rx,
            },
        )
    }

    /// Deliver a raw frame to the client
    ///
    /// Returns false if the client side has gone away.
    pub async fn push_frame(&self, frame: InboundFrame) -> bool {
        self.inbound_tx.send(frame).await.is_ok()
    }

    /// Deliver a raw text frame to the client
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        self.push_frame(InboundFrame::Text(text.into())).await
    }

    /// Encode and deliver an envelope to the client
    pub async fn push_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.push_text(text).await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode envelope for in-process peer");
                false
            }
        }
    }

    /// Wait for the next text frame sent by the client
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound_rx.recv().await
    }

    /// Whether the client side of this connection is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inbound_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_peer_fails() {
        let connector = InProcessConnector::new();
        let result = connector.connect("ws://nowhere").await;

        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(connector.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_hands_out_queued_connections_in_order() {
        let connector = InProcessConnector::new();
        let first = connector.accept_next();
        let _second = connector.accept_next();

        let mut conn = connector.connect("ws://local").await.unwrap();
        assert!(first.push_text("hello").await);
        assert_eq!(conn.inbound.recv().await, Some(InboundFrame::Text("hello".into())));
        assert_eq!(connector.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_peer_receives_outbound_and_sees_close() {
        let (conn, mut peer) = PeerEnd::pair(4);
        conn.outbound.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.next_outbound().await.as_deref(), Some("ping"));

        drop(conn);
        assert!(peer.is_closed());
        assert!(peer.next_outbound().await.is_none());
    }
}
