//! Stream Metrics
//!
//! Records session activity through the `metrics` facade. The library never
//! installs a recorder; an embedding application that wants the numbers
//! installs its own exporter and calls [`describe_metrics`] once.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound data frames by kind, drops, malformed frames
//! - **Control**: subscribe/unsubscribe frames sent, resync frames
//! - **Connection**: reconnect attempts, resync duration
//! - **Subscriptions**: subscription counts by state

use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::application::ports::SubscriptionAction;
use crate::domain::streaming::DataKind;
use crate::domain::subscription::RegistryStats;

static DESCRIBE: Once = Once::new();

// =============================================================================
// Metric Registration
// =============================================================================

/// Register metric descriptions with the installed recorder.
///
/// Safe to call more than once; only the first call has an effect.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "invest_stream_frames_received_total",
            "Data frames received from the market data stream"
        );
        describe_counter!(
            "invest_stream_frames_dropped_total",
            "Data frames not delivered to a handler"
        );
        describe_counter!(
            "invest_stream_malformed_frames_total",
            "Inbound frames that could not be decoded"
        );
        describe_counter!(
            "invest_stream_control_frames_total",
            "Subscribe and unsubscribe frames written"
        );
        describe_counter!(
            "invest_stream_resync_frames_total",
            "Subscribe frames resent after a reconnect"
        );
        describe_counter!(
            "invest_stream_reconnects_total",
            "Reconnect attempts"
        );
        describe_gauge!(
            "invest_stream_subscriptions",
            "Subscriptions by lifecycle state"
        );
        describe_histogram!(
            "invest_stream_resync_seconds",
            "Time to resend all subscriptions on a new channel"
        );
    });
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a data frame was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No live subscription matched the frame.
    NoSubscriber,
    /// The handler panicked.
    HandlerPanic,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NoSubscriber => "no_subscriber",
            Self::HandlerPanic => "handler_panic",
        }
    }
}

/// Record a data frame received.
pub fn record_frame_received(kind: DataKind) {
    counter!("invest_stream_frames_received_total", "kind" => kind.as_str()).increment(1);
}

/// Record a data frame that was not delivered.
pub fn record_frame_dropped(kind: DataKind, reason: DropReason) {
    counter!(
        "invest_stream_frames_dropped_total",
        "kind" => kind.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an inbound frame that failed to decode.
pub fn record_malformed_frame() {
    counter!("invest_stream_malformed_frames_total").increment(1);
}

/// Record a control frame written to the channel.
pub fn record_control_frame(action: SubscriptionAction, kind: DataKind) {
    counter!(
        "invest_stream_control_frames_total",
        "action" => action.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a completed resync.
pub fn record_resync(frames: usize, duration: Duration) {
    counter!("invest_stream_resync_frames_total").increment(frames as u64);
    histogram!("invest_stream_resync_seconds").record(duration.as_secs_f64());
}

/// Record a reconnect attempt.
pub fn record_reconnect() {
    counter!("invest_stream_reconnects_total").increment(1);
}

/// Publish subscription counts.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(stats: &RegistryStats) {
    gauge!("invest_stream_subscriptions", "state" => "pending").set(stats.pending as f64);
    gauge!("invest_stream_subscriptions", "state" => "active").set(stats.active as f64);
    gauge!("invest_stream_subscriptions", "state" => "cancelling").set(stats.cancelling as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::NoSubscriber.as_str(), "no_subscriber");
        assert_eq!(DropReason::HandlerPanic.as_str(), "handler_panic");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        describe_metrics();
        describe_metrics();
        record_frame_received(DataKind::Candle);
        record_frame_dropped(DataKind::Trade, DropReason::NoSubscriber);
        record_control_frame(SubscriptionAction::Subscribe, DataKind::OrderBook);
        record_resync(3, Duration::from_millis(5));
        set_subscriptions(&RegistryStats::default());
    }
}
