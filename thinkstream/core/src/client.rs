//! Chat Client
//!
//! [`ChatClient`] is the owner that wires the three moving parts together:
//!
//! ```text
//!             send(text)
//!                 │ 1. begin_session (synchronous)
//!                 ▼
//!   ┌──────── SessionCorrelator ◀──attach── PushTransport ◀── ws://
//!   │             ▲
//!   │             │ 3. abandon_session on failure
//!   │             │
//!   │        ChatBackend ── 2. POST /api/chat/message ──▶ http://
//!   ▼
//!  SessionUpdate / StatusUpdate streams ──▶ presentation
//! ```
//!
//! Opening the session before the HTTP call is what lets thinking events
//! that beat the HTTP response land in the right session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{ApiError, ChatApiClient, ChatBackend};
use crate::config::{ClientConfig, ConfigError};
use crate::correlator::{
    CorrelatorError, CorrelatorOutputs, DurationTick, LiveTicker, SessionCorrelator, SystemClock,
};
use crate::session::RequestId;
use crate::transport::{PushTransport, TransportError, WebSocketConnector};

/// Errors surfaced by [`ChatClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The message was empty or whitespace only
    #[error("Message is empty")]
    EmptyMessage,

    /// The chat request failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The correlator refused the session
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),

    /// The configuration was unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The push channel failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of a successful [`ChatClient::send`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentRequest {
    /// Session the answer will be correlated into
    pub request_id: RequestId,
    /// Server-side conversation ID
    pub conversation_id: String,
}

/// Facade over the request API, push channel and correlator
pub struct ChatClient<B: ChatBackend = ChatApiClient> {
    backend: B,
    transport: PushTransport,
    correlator: SessionCorrelator,
    conversation_id: Mutex<Option<String>>,
    pump: JoinHandle<()>,
    tick_interval: Duration,
}

impl ChatClient<ChatApiClient> {
    /// Build the production client from configuration
    ///
    /// Starts connecting the push channel immediately. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate or the HTTP client
    /// cannot be created.
    pub fn connect(config: &ClientConfig) -> Result<(Self, CorrelatorOutputs), ClientError> {
        config.validate()?;

        let backend = ChatApiClient::new(config.api_base_url.clone(), config.request_timeout)?;
        let connector = WebSocketConnector::new(config.transport.subscriber_capacity);
        let transport = PushTransport::start(config.transport.clone(), Arc::new(connector));
        let (correlator, outputs) = SessionCorrelator::new(Arc::new(SystemClock));

        tracing::info!(
            api = %config.api_base_url,
            push = %config.transport.endpoint,
            "Chat client started"
        );

        Ok((
            Self::new(backend, transport, correlator, config.tick_interval),
            outputs,
        ))
    }
}

impl<B: ChatBackend> ChatClient<B> {
    /// Assemble a client from its parts and attach the correlator
    pub fn new(
        backend: B,
        transport: PushTransport,
        correlator: SessionCorrelator,
        tick_interval: Duration,
    ) -> Self {
        let pump = correlator.attach(&transport);
        Self {
            backend,
            transport,
            correlator,
            conversation_id: Mutex::new(None),
            pump,
            tick_interval,
        }
    }

    /// Send a message under a freshly generated request ID
    ///
    /// # Errors
    ///
    /// [`ClientError::EmptyMessage`] for blank input (the correlator is not
    /// touched), [`ClientError::Correlator`] while another request is in
    /// flight, [`ClientError::Api`] if the request fails.
    pub async fn send(&self, text: &str) -> Result<SentRequest, ClientError> {
        self.send_as(RequestId::new(), text).await
    }

    /// Send a message under a caller-chosen request ID
    ///
    /// When the HTTP call fails the session begun for it is abandoned; an
    /// Answer that still arrives for it later is dropped as `NoLiveSession`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_as(
        &self,
        request_id: RequestId,
        text: &str,
    ) -> Result<SentRequest, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        self.correlator.begin_session(request_id.clone())?;

        let conversation = self.conversation_id.lock().clone();
        match self
            .backend
            .send_request(text, conversation.as_deref())
            .await
        {
            Ok(receipt) => {
                tracing::debug!(
                    request_id = %request_id,
                    conversation = %receipt.session_id,
                    "Chat request accepted"
                );
                *self.conversation_id.lock() = Some(receipt.session_id.clone());
                Ok(SentRequest {
                    request_id,
                    conversation_id: receipt.session_id,
                })
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Chat request failed");
                self.correlator.abandon_session(&request_id);
                Err(e.into())
            }
        }
    }

    /// Continue an existing server-side conversation
    pub fn resume_conversation(&self, conversation_id: impl Into<String>) {
        *self.conversation_id.lock() = Some(conversation_id.into());
    }

    /// Server-side conversation ID, once known
    #[must_use]
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id.lock().clone()
    }

    /// The correlation engine
    #[must_use]
    pub fn correlator(&self) -> &SessionCorrelator {
        &self.correlator
    }

    /// The push channel
    #[must_use]
    pub fn transport(&self) -> &PushTransport {
        &self.transport
    }

    /// Start a live duration ticker at the configured interval
    #[must_use]
    pub fn spawn_ticker(&self) -> (JoinHandle<()>, mpsc::Receiver<DurationTick>) {
        LiveTicker::spawn(self.correlator.clone(), self.tick_interval)
    }

    /// Close the push channel and wait for the correlator to detach
    pub async fn shutdown(self) {
        self.transport.shutdown();
        if let Err(e) = self.pump.await {
            tracing::warn!(error = %e, "Correlator pump ended abnormally");
        }
        tracing::info!("Chat client stopped");
    }
}
