//! Session Correlation
//!
//! The correlator consumes decoded envelopes and reassembles them into
//! per-request sessions.
//!
//! # Architecture
//!
//! ```text
//! PushTransport ──subscribe──▶ SessionCorrelator ──▶ SessionUpdate stream
//!                                     │          └─▶ StatusUpdate stream
//!                                     └──read──▶ LiveTicker ──▶ DurationTick
//! ```
//!
//! `ChatClient` (or any other owner) calls `begin_session` before it issues
//! the request so that thinking events racing ahead of the HTTP response are
//! still attributed correctly.

mod clock;
mod engine;
mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    CorrelatorError, CorrelatorOutputs, LiveSnapshot, SessionCorrelator, SessionUpdate,
    StatusUpdate,
};
pub use ticker::{DurationTick, LiveTicker, DEFAULT_TICK_INTERVAL};
