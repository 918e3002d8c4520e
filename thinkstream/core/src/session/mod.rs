//! Session Model
//!
//! A [`Session`] is the correlation unit for exactly one request/response
//! cycle: the ordered thinking steps observed while the request was
//! outstanding, their start/end timestamps, and the final answer.
//!
//! # Lifecycle
//!
//! ```text
//!  begin_session ──▶ live (steps append-only) ──Answer──▶ finalized (immutable)
//! ```
//!
//! Only the presentation flag `collapsed` may change after finalization.
//! Mutation of the timeline is restricted to this crate; the
//! [`correlator`](crate::correlator) is its only writer.

mod duration;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use duration::{elapsed_between, format_elapsed};

/// Marker that tags the (single) deep-thinking step of a session
pub const DEEP_THINKING_MARKER: &str = "🧠 Deep Thinking";

/// Marker the backend uses in steps that describe tool use
pub const TOOL_USE_MARKER: &str = "🔧";

/// Identifier of one request/response cycle
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the ID as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of one thinking step, monotonically assigned
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(u64);

impl StepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One discrete reasoning update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingStep {
    /// Unique step ID
    pub id: StepId,
    /// Step text
    pub content: String,
    /// When the step was captured
    pub created_at: DateTime<Utc>,
}

impl ThinkingStep {
    fn new(content: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: StepId::next(),
            content,
            created_at,
        }
    }

    fn deep_thinking(chunk: &str, created_at: DateTime<Utc>) -> Self {
        Self::new(format!("{DEEP_THINKING_MARKER}\n\n{chunk}"), created_at)
    }

    /// Whether this is the deep-thinking step of its session
    #[must_use]
    pub fn is_deep_thinking(&self) -> bool {
        self.content.starts_with(DEEP_THINKING_MARKER)
    }

    /// Whether this step describes tool use
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        self.content.contains(TOOL_USE_MARKER)
    }
}

/// Whether a timeline is worth surfacing to the user
///
/// Only timelines with at least one tool-use or deep-thinking step are shown;
/// sessions with generic steps only are accumulated the same way but hidden.
#[must_use]
pub fn timeline_visible(steps: &[ThinkingStep]) -> bool {
    steps
        .iter()
        .any(|step| step.is_tool_use() || step.content.contains(DEEP_THINKING_MARKER))
}

/// The correlation unit for one outstanding or completed request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Request this session belongs to
    pub request_id: RequestId,
    /// Thinking steps in arrival order
    pub steps: Vec<ThinkingStep>,
    /// Time of the first thinking event
    pub started_at: Option<DateTime<Utc>>,
    /// Time the answer arrived (only when thinking occurred)
    pub ended_at: Option<DateTime<Utc>>,
    /// Final answer text
    pub answer: Option<String>,
    /// Presentation flag: whether the timeline is folded away
    pub collapsed: bool,
}

impl Session {
    /// Create a fresh live session
    #[must_use]
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            steps: Vec::new(),
            started_at: None,
            ended_at: None,
            answer: None,
            collapsed: false,
        }
    }

    /// Whether the session is still waiting for its answer
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.answer.is_none()
    }

    /// Thinking time so far, or in total once finalized
    ///
    /// `None` when no thinking event was ever observed.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        Some(elapsed_between(started, self.ended_at.unwrap_or(now)))
    }

    /// Display label for [`elapsed`](Self::elapsed)
    #[must_use]
    pub fn duration_label(&self, now: DateTime<Utc>) -> Option<String> {
        self.elapsed(now).map(format_elapsed)
    }

    /// See [`timeline_visible`]
    #[must_use]
    pub fn has_visible_timeline(&self) -> bool {
        timeline_visible(&self.steps)
    }

    /// Flip the collapsed flag, returning the new value
    pub fn toggle_collapsed(&mut self) -> bool {
        self.collapsed = !self.collapsed;
        self.collapsed
    }

    fn mark_started(&mut self, at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
    }

    /// Append a discrete thinking step
    pub(crate) fn record_thinking_step(&mut self, content: &str, at: DateTime<Utc>) {
        self.mark_started(at);
        self.steps.push(ThinkingStep::new(content.to_string(), at));
    }

    /// Merge a deep-thinking chunk into the session's deep-thinking step
    pub(crate) fn record_deep_thinking(&mut self, chunk: &str, at: DateTime<Utc>) {
        self.mark_started(at);
        match self.steps.iter_mut().find(|step| step.is_deep_thinking()) {
            Some(step) => step.content.push_str(chunk),
            None => self.steps.push(ThinkingStep::deep_thinking(chunk, at)),
        }
    }

    /// Attach the answer and close the session
    pub(crate) fn finalize(&mut self, answer: &str, at: DateTime<Utc>) {
        if self.started_at.is_some() {
            self.ended_at = Some(at);
        }
        self.answer = Some(answer.to_string());
        self.collapsed = true;
    }
}
