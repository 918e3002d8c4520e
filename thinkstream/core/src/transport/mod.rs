//! Push Channel Transport
//!
//! Maintains one reconnecting push connection and fans decoded envelopes out
//! to any number of subscribers:
//! - [`PushTransport`]: handle to the connection supervisor
//! - [`Connector`]: pluggable factory for a single physical connection
//! - [`WebSocketConnector`]: production connector (tokio-tungstenite)
//! - [`InProcessConnector`]: channel-backed connector for embedding and tests
//!
//! # State Machine
//!
//! ```text
//!   ┌────────────┐  connect ok   ┌──────┐  peer closed / error
//!   │ Connecting │──────────────▶│ Open │─────────────────────┐
//!   └────────────┘               └──────┘                     │
//!      ▲     │ connect failed                                 ▼
//!      │     └───────────────────────────────────────────▶┌────────┐
//!      │        attempts < max: sleep(delay), attempts++  │ Closed │
//!      └──────────────────────────────────────────────────└────────┘
//!      │                                                      │ attempts == max
//!      │  reconnect()                                         ▼
//!      └───────────────────────────────────────────────── ┌────────┐
//!                                                         │ GaveUp │
//!                                                         └────────┘
//! ```
//!
//! The transport knows nothing about chat semantics. It only classifies
//! frames by their `type` tag and redistributes them.

pub mod client;
pub mod config;
pub mod in_process;
pub mod registry;
pub mod traits;
pub mod websocket;

// Re-exports for convenience
pub use client::{ConnectionState, PushTransport};
pub use config::{TransportConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS};
pub use in_process::{InProcessConnector, PeerEnd};
pub use registry::{BroadcastResult, SubscriberId, SubscriberRegistry, Subscription};
pub use traits::{Connector, InboundFrame, PushConnection, TransportError};
pub use websocket::WebSocketConnector;
