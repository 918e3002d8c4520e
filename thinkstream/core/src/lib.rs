//! Thinkstream Core - Streaming Session Correlation for Chat Clients
//!
//! A chat backend answers a prompt in two places at once: the HTTP call that
//! carries the prompt returns only an acknowledgement, while intermediate
//! "thinking" updates and the final answer arrive over a persistent push
//! channel. This crate reassembles those into one timeline per request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Presentation                             │
//! │        (terminal driver, GUI, tests: anything that renders)       │
//! └──────────────▲─────────────────────────────────┬─────────────────┘
//!                │ SessionUpdate / StatusUpdate    │ send(text)
//! ┌──────────────┴─────────────────────────────────▼─────────────────┐
//! │                           ChatClient                              │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │ SessionCorrelator│◀─│  PushTransport   │  │  ChatBackend   │  │
//! │  │  (sessions,      │  │ (reconnecting    │  │ (POST /api/    │  │
//! │  │   LiveTicker)    │  │  WebSocket)      │  │  chat/message) │  │
//! │  └──────────────────┘  └──────────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use thinkstream_core::{load_config, ChatClient, SessionUpdate};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let (client, mut outputs) = ChatClient::connect(&config)?;
//!
//!     client.send("What's the weather in Lisbon?").await?;
//!     while let Some(update) = outputs.sessions.recv().await {
//!         if let SessionUpdate::Finalized(session) = update {
//!             println!("{}", session.answer.unwrap_or_default());
//!             break;
//!         }
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`envelope`]: push channel wire envelopes
//! - [`transport`]: reconnecting push channel client and subscriber registry
//! - [`session`]: session and thinking step model, duration formatting
//! - [`correlator`]: the correlation engine and live duration ticker
//! - [`api`]: HTTP request client
//! - [`client`]: the `ChatClient` facade
//! - [`config`]: TOML and environment configuration

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod client;
pub mod config;
pub mod correlator;
pub mod envelope;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use api::{ApiError, ChatApiClient, ChatBackend, SendReceipt};
pub use client::{ChatClient, ClientError, SentRequest};
pub use correlator::{
    Clock, CorrelatorError, CorrelatorOutputs, DurationTick, LiveSnapshot, LiveTicker,
    ManualClock, SessionCorrelator, SessionUpdate, StatusUpdate, SystemClock,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeKind};
pub use session::{
    format_elapsed, timeline_visible, RequestId, Session, StepId, ThinkingStep,
    DEEP_THINKING_MARKER, TOOL_USE_MARKER,
};
pub use transport::{
    ConnectionState, Connector, InProcessConnector, PeerEnd, PushTransport, SubscriberId,
    Subscription, TransportConfig, TransportError, WebSocketConnector,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
