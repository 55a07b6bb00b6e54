//! Port Interfaces
//!
//! Defines the transport contract the streaming session depends on,
//! following the Hexagonal Architecture pattern. Adapters in the
//! infrastructure layer implement these ports.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`ChannelFactory`]: opens a new bidirectional channel (TLS and auth are
//!   the adapter's concern)
//! - [`FrameSink`]: write half of a channel, carries control frames
//! - [`FrameSource`]: read half of a channel, yields inbound frames

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{InstrumentRef, MarketPayload, Ping};
use crate::domain::subscription::{Topic, TopicKind};

// =============================================================================
// Errors
// =============================================================================

/// Failure to open a channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Endpoint address could not be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Server refused or could not be reached.
    #[error("connection failed: {0}")]
    Unavailable(String),

    /// Server rejected the credentials.
    #[error("authentication rejected: {0}")]
    Unauthenticated(String),

    /// Credentials cannot be sent as request metadata.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Failure on an open channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed the channel.
    #[error("channel closed")]
    Closed,

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single inbound frame could not be decoded. The channel stays usable.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// Nothing was received within the idle timeout.
    #[error("no frames received within the idle timeout")]
    IdleTimeout,
}

impl ChannelError {
    /// Whether the channel is unusable after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Subscribe or unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    /// Start a stream.
    Subscribe,
    /// Stop a stream.
    Unsubscribe,
}

impl SubscriptionAction {
    /// Get the action as a label string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// An outbound subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Subscribe or unsubscribe.
    pub action: SubscriptionAction,
    /// Data kind and its parameters.
    pub kind: TopicKind,
    /// Instrument ids the request covers.
    pub instruments: Vec<String>,
}

impl ControlFrame {
    /// Subscribe request for one topic.
    #[must_use]
    pub fn subscribe(topic: &Topic) -> Self {
        Self::for_topic(SubscriptionAction::Subscribe, topic)
    }

    /// Unsubscribe request for one topic.
    #[must_use]
    pub fn unsubscribe(topic: &Topic) -> Self {
        Self::for_topic(SubscriptionAction::Unsubscribe, topic)
    }

    fn for_topic(action: SubscriptionAction, topic: &Topic) -> Self {
        Self {
            action,
            kind: topic.kind,
            instruments: vec![topic.instrument_id.clone()],
        }
    }

    /// Topics this frame covers.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.instruments
            .iter()
            .map(|id| Topic::new(id.clone(), self.kind))
            .collect()
    }
}

/// Outcome the server reported for one subscription request entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AckStatus {
    Unspecified,
    Success,
    InstrumentNotFound,
    InvalidAction,
    InvalidDepth,
    InvalidInterval,
    LimitExceeded,
    InternalError,
    TooManyRequests,
    SubscriptionNotFound,
}

impl AckStatus {
    /// Get the status as a label string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Success => "success",
            Self::InstrumentNotFound => "instrument_not_found",
            Self::InvalidAction => "invalid_action",
            Self::InvalidDepth => "invalid_depth",
            Self::InvalidInterval => "invalid_interval",
            Self::LimitExceeded => "limit_exceeded",
            Self::InternalError => "internal_error",
            Self::TooManyRequests => "too_many_requests",
            Self::SubscriptionNotFound => "subscription_not_found",
        }
    }

    /// Whether the request was accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Server status for one topic of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckEntry {
    /// Instrument as echoed by the server.
    pub instrument: InstrumentRef,
    /// Data kind and parameters.
    pub kind: TopicKind,
    /// Outcome.
    pub status: AckStatus,
}

impl AckEntry {
    /// Topics this entry may refer to, UID first.
    #[must_use]
    pub fn candidates(&self) -> Vec<Topic> {
        self.instrument
            .ids()
            .map(|id| Topic::new(id, self.kind))
            .collect()
    }
}

/// Server reply to a control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    /// Server-side request id, for correlating with support logs.
    pub tracking_id: String,
    /// Per-topic outcomes.
    pub entries: Vec<AckEntry>,
}

/// Any message received on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundFrame {
    /// Market data for a subscription.
    Data(MarketPayload),
    /// Reply to a control frame.
    SubscriptionAck(SubscriptionAck),
    /// Keep-alive.
    Ping(Ping),
}

// =============================================================================
// Channel Ports
// =============================================================================

/// Write half of a channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one control frame.
    async fn send(&mut self, frame: ControlFrame) -> Result<(), ChannelError>;

    /// Close the write half. Safe to call more than once.
    async fn close(&mut self);
}

/// Read half of a channel.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// `Err(ChannelError::Decode(_))` reports one bad frame; any other error
    /// means the channel is finished.
    async fn receive(&mut self) -> Result<InboundFrame, ChannelError>;
}

/// An open bidirectional channel.
pub struct Channel {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub source: Box<dyn FrameSource>,
}

impl Channel {
    /// Pair a sink and a source.
    #[must_use]
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens channels to the market data stream.
///
/// Called once when the session opens and again for every reconnect attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Open a new channel.
    async fn open_channel(&self) -> Result<Channel, ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::CandleInterval;

    #[test]
    fn control_frame_carries_topic_parameters() {
        let topic = Topic::order_book("Y", 10);
        let frame = ControlFrame::subscribe(&topic);

        assert_eq!(frame.action, SubscriptionAction::Subscribe);
        assert_eq!(frame.kind, TopicKind::OrderBook { depth: 10 });
        assert_eq!(frame.instruments, vec!["Y".to_string()]);
        assert_eq!(frame.topics(), vec![topic]);
    }

    #[test]
    fn unsubscribe_frame() {
        let topic = Topic::candles("X", CandleInterval::OneMinute);
        let frame = ControlFrame::unsubscribe(&topic);
        assert_eq!(frame.action, SubscriptionAction::Unsubscribe);
        assert_eq!(frame.action.as_str(), "unsubscribe");
    }

    #[test]
    fn only_decode_errors_are_recoverable() {
        assert!(!ChannelError::Decode("bad".into()).is_fatal());
        assert!(ChannelError::Closed.is_fatal());
        assert!(ChannelError::Transport("reset".into()).is_fatal());
        assert!(ChannelError::IdleTimeout.is_fatal());
    }

    #[test]
    fn ack_candidates_use_both_ids() {
        let entry = AckEntry {
            instrument: InstrumentRef::new("FIGI", "UID"),
            kind: TopicKind::Trades,
            status: AckStatus::Success,
        };
        assert_eq!(
            entry.candidates(),
            vec![Topic::trades("UID"), Topic::trades("FIGI")]
        );
        assert!(entry.status.is_success());
    }

    #[tokio::test]
    async fn mock_factory_reports_failure() {
        let mut factory = MockChannelFactory::new();
        factory
            .expect_open_channel()
            .times(1)
            .returning(|| Err(ConnectionError::Unavailable("refused".into())));

        let err = factory.open_channel().await.unwrap_err();
        assert_eq!(err, ConnectionError::Unavailable("refused".into()));
    }
}
