//! Session Correlator Engine
//!
//! Turns the flat envelope stream into per-request [`Session`] timelines.
//! Correlation is purely temporal: every thinking envelope that arrives while
//! a session is live belongs to it, and the next Answer closes it.
//!
//! # Outputs
//!
//! ```text
//! on_envelope ──┬─ thinking ──▶ SessionUpdate::Live(snapshot)
//!               ├─ answer ────▶ SessionUpdate::Finalized(session)
//!               └─ status ────▶ StatusUpdate
//! ```
//!
//! State sits behind one mutex that is never held across an `.await`, and
//! updates are published while it is held, so consumers observe them in the
//! order they were applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::session::{elapsed_between, format_elapsed, timeline_visible, RequestId, Session, ThinkingStep};
use crate::transport::PushTransport;

use super::clock::Clock;

/// Errors returned by correlator operations
///
/// None of these are fatal; they report an operation that was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelatorError {
    /// A session is already live; at most one may be in flight
    #[error("Session {live} is still live, cannot begin {requested}")]
    SessionAlreadyLive {
        /// The session currently live
        live: RequestId,
        /// The request that was refused
        requested: RequestId,
    },

    /// The request ID belongs to an already finalized session
    #[error("Request {0} was already finalized")]
    DuplicateRequest(RequestId),

    /// A session-bound envelope arrived while no session was live
    #[error("No live session for {kind} envelope")]
    NoLiveSession {
        /// Kind of the dropped envelope
        kind: EnvelopeKind,
    },

    /// No live or finalized session has this ID
    #[error("Unknown session: {0}")]
    UnknownSession(RequestId),
}

/// Point-in-time view of the live session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSnapshot {
    /// Request the live session belongs to
    pub request_id: RequestId,
    /// Steps accumulated so far
    pub steps: Vec<ThinkingStep>,
    /// Time of the first thinking event, if any
    pub started_at: Option<DateTime<Utc>>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl LiveSnapshot {
    fn capture(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            request_id: session.request_id.clone(),
            steps: session.steps.clone(),
            started_at: session.started_at,
            captured_at: now,
        }
    }

    /// Thinking time as of the snapshot
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .map(|started| elapsed_between(started, self.captured_at))
    }

    /// Display label for [`elapsed`](Self::elapsed)
    #[must_use]
    pub fn duration_label(&self) -> Option<String> {
        self.elapsed().map(format_elapsed)
    }

    /// Whether the timeline so far passes the visibility gate
    #[must_use]
    pub fn has_visible_timeline(&self) -> bool {
        timeline_visible(&self.steps)
    }
}

/// Item on the session update stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The live session changed
    Live(LiveSnapshot),
    /// A session received its answer
    Finalized(Session),
}

/// A Status, Error or Notification envelope, passed through as-is
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Which of the status kinds this is
    pub kind: EnvelopeKind,
    /// Envelope payload
    pub message: String,
    /// Server timestamp, if one was sent
    pub timestamp: Option<String>,
}

/// Receiving ends of the correlator's output streams
#[derive(Debug)]
pub struct CorrelatorOutputs {
    /// Live snapshots and finalized sessions
    pub sessions: mpsc::UnboundedReceiver<SessionUpdate>,
    /// Status, Error and Notification envelopes
    pub status: mpsc::UnboundedReceiver<StatusUpdate>,
}

#[derive(Debug, Default)]
struct CorrelatorState {
    current: Option<Session>,
    history: Vec<Session>,
}

impl CorrelatorState {
    fn find_finalized_mut(&mut self, request_id: &RequestId) -> Option<&mut Session> {
        self.history
            .iter_mut()
            .rev()
            .find(|session| &session.request_id == request_id)
    }
}

/// Handle to the correlation engine
///
/// Cheap to clone; clones share state and output streams.
#[derive(Clone)]
pub struct SessionCorrelator {
    state: Arc<Mutex<CorrelatorState>>,
    clock: Arc<dyn Clock>,
    sessions_tx: mpsc::UnboundedSender<SessionUpdate>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl SessionCorrelator {
    /// Create an engine and the receivers for its output streams
    pub fn new(clock: Arc<dyn Clock>) -> (Self, CorrelatorOutputs) {
        let (sessions_tx, sessions) = mpsc::unbounded_channel();
        let (status_tx, status) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(CorrelatorState::default())),
                clock,
                sessions_tx,
                status_tx,
            },
            CorrelatorOutputs { sessions, status },
        )
    }

    /// Current time according to the engine clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a session for `request_id`
    ///
    /// Must happen before the request is sent so that early thinking events
    /// land in this session.
    pub fn begin_session(&self, request_id: RequestId) -> Result<(), CorrelatorError> {
        let mut state = self.state.lock();

        if let Some(live) = &state.current {
            tracing::warn!(
                live = %live.request_id,
                requested = %request_id,
                "Refusing to begin a session while another is live"
            );
            return Err(CorrelatorError::SessionAlreadyLive {
                live: live.request_id.clone(),
                requested: request_id,
            });
        }

        if state.find_finalized_mut(&request_id).is_some() {
            tracing::warn!(request_id = %request_id, "Refusing to reopen a finalized session");
            return Err(CorrelatorError::DuplicateRequest(request_id));
        }

        tracing::debug!(request_id = %request_id, "Session started");
        state.current = Some(Session::new(request_id));
        Ok(())
    }

    /// Open a session under a freshly generated request ID
    pub fn begin_new_session(&self) -> Result<RequestId, CorrelatorError> {
        let request_id = RequestId::new();
        self.begin_session(request_id.clone())?;
        Ok(request_id)
    }

    /// Apply one envelope
    ///
    /// Errors are already logged; callers pumping a stream may ignore them.
    pub fn on_envelope(&self, envelope: &Envelope) -> Result<(), CorrelatorError> {
        match envelope.kind {
            EnvelopeKind::ThinkingStep | EnvelopeKind::DeepThinkingChunk => {
                self.accumulate(envelope)
            }
            EnvelopeKind::Answer => self.finalize(envelope),
            EnvelopeKind::Status | EnvelopeKind::Error | EnvelopeKind::Notification => {
                self.forward_status(envelope);
                Ok(())
            }
        }
    }

    fn accumulate(&self, envelope: &Envelope) -> Result<(), CorrelatorError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(session) = state.current.as_mut() else {
            tracing::warn!(kind = %envelope.kind, "Dropping thinking event with no live session");
            return Err(CorrelatorError::NoLiveSession {
                kind: envelope.kind,
            });
        };

        if envelope.kind == EnvelopeKind::DeepThinkingChunk {
            session.record_deep_thinking(&envelope.payload, now);
        } else {
            session.record_thinking_step(&envelope.payload, now);
        }

        tracing::debug!(
            request_id = %session.request_id,
            kind = %envelope.kind,
            steps = session.steps.len(),
            "Thinking event accumulated"
        );

        self.publish(SessionUpdate::Live(LiveSnapshot::capture(session, now)));
        Ok(())
    }

    fn finalize(&self, envelope: &Envelope) -> Result<(), CorrelatorError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(mut session) = state.current.take() else {
            tracing::warn!("Dropping answer with no live session");
            return Err(CorrelatorError::NoLiveSession {
                kind: envelope.kind,
            });
        };

        session.finalize(&envelope.payload, now);
        let duration = session.duration_label(now).unwrap_or_else(|| "-".to_string());
        tracing::info!(
            request_id = %session.request_id,
            steps = session.steps.len(),
            duration = %duration,
            "Session finalized"
        );

        state.history.push(session.clone());
        self.publish(SessionUpdate::Finalized(session));
        Ok(())
    }

    fn forward_status(&self, envelope: &Envelope) {
        tracing::debug!(kind = %envelope.kind, "Forwarding status envelope");
        let update = StatusUpdate {
            kind: envelope.kind,
            message: envelope.payload.clone(),
            timestamp: envelope.timestamp.clone(),
        };
        if self.status_tx.send(update).is_err() {
            tracing::trace!("Status stream has no receiver");
        }
    }

    fn publish(&self, update: SessionUpdate) {
        if self.sessions_tx.send(update).is_err() {
            tracing::trace!("Session stream has no receiver");
        }
    }

    /// Snapshot of the live session, if one is in flight
    #[must_use]
    pub fn live_snapshot(&self) -> Option<LiveSnapshot> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .current
            .as_ref()
            .map(|session| LiveSnapshot::capture(session, now))
    }

    /// ID of the live session, if any
    #[must_use]
    pub fn live_request_id(&self) -> Option<RequestId> {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|session| session.request_id.clone())
    }

    /// Whether a session is in flight
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Flip the collapsed flag of a live or finalized session
    ///
    /// Returns the new value.
    pub fn toggle_collapsed(&self, request_id: &RequestId) -> Result<bool, CorrelatorError> {
        let mut state = self.state.lock();

        if let Some(live) = state.current.as_mut().filter(|s| &s.request_id == request_id) {
            return Ok(live.toggle_collapsed());
        }

        state
            .find_finalized_mut(request_id)
            .map(Session::toggle_collapsed)
            .ok_or_else(|| CorrelatorError::UnknownSession(request_id.clone()))
    }

    /// Discard the live session if it belongs to `request_id`
    ///
    /// Used when the request for it failed and no answer will arrive.
    pub fn abandon_session(&self, request_id: &RequestId) -> Option<Session> {
        let mut state = self.state.lock();
        let abandoned = if state
            .current
            .as_ref()
            .is_some_and(|session| &session.request_id == request_id)
        {
            state.current.take()
        } else {
            None
        };

        if let Some(session) = &abandoned {
            tracing::info!(
                request_id = %request_id,
                steps = session.steps.len(),
                "Session abandoned"
            );
        }
        abandoned
    }

    /// Look up a live or finalized session
    #[must_use]
    pub fn session(&self, request_id: &RequestId) -> Option<Session> {
        let state = self.state.lock();
        state
            .current
            .iter()
            .chain(state.history.iter().rev())
            .find(|session| &session.request_id == request_id)
            .cloned()
    }

    /// All finalized sessions, oldest first
    #[must_use]
    pub fn finalized(&self) -> Vec<Session> {
        self.state.lock().history.clone()
    }

    /// Feed every envelope from `transport` into this engine
    ///
    /// The subscription is registered before this returns, so no envelope
    /// dispatched afterwards is missed. The task ends when the transport
    /// shuts down.
    pub fn attach(&self, transport: &PushTransport) -> JoinHandle<()> {
        let mut subscription = transport.subscribe();
        let correlator = self.clone();

        tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                // Refusals are logged inside on_envelope
                let _ = correlator.on_envelope(&envelope);
            }
            tracing::debug!(subscriber = %subscription.id(), "Correlator detached");
        })
    }
}

impl std::fmt::Debug for SessionCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionCorrelator")
            .field(
                "live",
                &state.current.as_ref().map(|s| s.request_id.as_str()),
            )
            .field("finalized", &state.history.len())
            .finish()
    }
}
