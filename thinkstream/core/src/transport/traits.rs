//! Transport Traits
//!
//! The [`Connector`] trait is the seam between the reconnect supervisor and
//! the mechanism that opens a physical connection. A successful connect yields
//! a [`PushConnection`]: a pair of channels the supervisor reads frames from
//! and writes outbound text to. Closing the inbound channel means the peer
//! went away.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to peer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send a frame
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Transport not in expected state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// A frame received from the peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text frame, expected to hold one JSON envelope
    Text(String),
    /// A binary frame; the push protocol never uses these
    Binary(Vec<u8>),
}

/// One open physical connection
///
/// Dropping `outbound` asks the connector to close the connection.
#[derive(Debug)]
pub struct PushConnection {
    /// Frames arriving from the peer; closes when the peer disconnects
    pub inbound: mpsc::Receiver<InboundFrame>,
    /// Text frames to deliver to the peer
    pub outbound: mpsc::Sender<String>,
}

/// Opens physical push connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one connection to `endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] when the peer cannot be
    /// reached. The supervisor treats every error as a reconnect trigger.
    async fn connect(&self, endpoint: &str) -> Result<PushConnection, TransportError>;
}
