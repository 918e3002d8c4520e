//! Plain-text rendering of sessions and status lines
//!
//! Everything here is pure so the transcript format can be tested without a
//! terminal.

use chrono::{DateTime, Utc};
use thinkstream_core::{DurationTick, EnvelopeKind, Session, StatusUpdate, ThinkingStep};

/// Erase the current terminal line
pub const CLEAR_LINE: &str = "\r\x1b[2K";

/// How finalized sessions are printed
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions {
    /// Show timelines unfolded regardless of the collapsed flag
    pub expand: bool,
    /// Print one JSON object per session instead of text
    pub json: bool,
}

/// Render a finalized session
///
/// The timeline only appears when it passes the visibility gate; it is
/// folded to a one-line summary while the session is collapsed.
pub fn render_session(session: &Session, now: DateTime<Utc>, expand: bool) -> String {
    let mut out = String::new();

    if session.has_visible_timeline() {
        let duration = session
            .duration_label(now)
            .unwrap_or_else(|| "0ms".to_string());
        let steps = session.steps.len();
        let noun = if steps == 1 { "step" } else { "steps" };

        if session.collapsed && !expand {
            out.push_str(&format!("▸ Thought for {duration} ({steps} {noun})\n"));
        } else {
            out.push_str(&format!("▾ Thought for {duration} ({steps} {noun})\n"));
            for (index, step) in session.steps.iter().enumerate() {
                out.push_str(&render_step(index + 1, step));
            }
        }
        out.push('\n');
    }

    out.push_str(session.answer.as_deref().unwrap_or_default());
    out.push('\n');
    out
}

fn render_step(number: usize, step: &ThinkingStep) -> String {
    let mut lines = step.content.lines();
    let first = lines.next().unwrap_or_default();
    let mut out = format!("  {number:>2}. {first}\n");
    for line in lines {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("      {line}\n"));
        }
    }
    out
}

/// Render a finalized session as a single JSON line
pub fn render_session_json(session: &Session) -> Result<String, serde_json::Error> {
    serde_json::to_string(session).map(|mut line| {
        line.push('\n');
        line
    })
}

/// Render the in-place live duration line (no trailing newline)
pub fn render_tick(tick: &DurationTick) -> String {
    format!("{CLEAR_LINE}… thinking {}", tick.label)
}

/// Render a status, error or notification line
pub fn render_status(update: &StatusUpdate) -> String {
    let tag = match update.kind {
        EnvelopeKind::Error => "error",
        EnvelopeKind::Notification => "notice",
        _ => "status",
    };
    format!("{CLEAR_LINE}[{tag}] {}\n", update.message)
}
