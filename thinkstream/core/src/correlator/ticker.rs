//! Live Duration Ticker
//!
//! While a session is live its thinking time keeps growing without any new
//! envelope arriving. [`LiveTicker`] samples the correlator on a fixed tick
//! and publishes a [`DurationTick`] for display. It only reads state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::RequestId;

use super::engine::SessionCorrelator;

/// Default display refresh interval
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Small buffer; stale ticks are worthless so overflow is dropped
const TICK_BUFFER: usize = 8;

/// Thinking time of the live session at one tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurationTick {
    /// Session being timed
    pub request_id: RequestId,
    /// Elapsed thinking time
    pub elapsed: Duration,
    /// Formatted `elapsed`
    pub label: String,
}

/// Periodic sampler for the live session's duration
pub struct LiveTicker;

impl LiveTicker {
    /// Spawn the ticker
    ///
    /// A tick is published only while a session is live and has started
    /// thinking. The task stops once the returned receiver is dropped.
    pub fn spawn(
        correlator: SessionCorrelator,
        interval: Duration,
    ) -> (JoinHandle<()>, mpsc::Receiver<DurationTick>) {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let Some(snapshot) = correlator.live_snapshot() else {
                    continue;
                };
                let (Some(elapsed), Some(label)) = (snapshot.elapsed(), snapshot.duration_label())
                else {
                    continue;
                };

                let tick = DurationTick {
                    request_id: snapshot.request_id,
                    elapsed,
                    label,
                };
                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(tick) {
                    break;
                }
            }
            tracing::debug!("Live ticker stopped");
        });

        (handle, rx)
    }
}
