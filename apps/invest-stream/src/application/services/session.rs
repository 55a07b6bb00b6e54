//! Streaming Session
//!
//! Owns one bidirectional channel at a time, turns registry intents into
//! control frames, routes inbound frames to handlers, and recovers from
//! transport failure.
//!
//! # Connection State Machine
//!
//! ```text
//! Connected ──receive error──► Reconnecting ──channel opened──► Resyncing
//!     ▲                             │  ▲                            │
//!     └───────────all live topics resent────────────────────────────┘
//!                                   │  └──────resync send failed────┘
//!                                   └──retry budget spent──► Closed
//! ```
//!
//! All sends on the channel happen under one async lock. Resync holds it
//! from the moment the new channel is installed until every live topic has
//! been resent, so a concurrent `subscribe` waits and can never write on
//! the new channel ahead of the resync frames. Every write also races the
//! session's cancellation token, so a stalled channel cannot block `close`.
//!
//! The server answers subscribe and unsubscribe requests with the same
//! acknowledgement shape, in request order. Unsubscribes written on the
//! current channel are counted per topic and the next acknowledgement for
//! that topic is consumed by them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use super::watchdog::IdleWatchdog;
use crate::application::ports::{
    Channel, ChannelError, ChannelFactory, ConnectionError, ControlFrame, FrameSink, FrameSource,
    InboundFrame, SubscriptionAck,
};
use crate::domain::streaming::{
    Candle, CandleInterval, LastPrice, MarketPayload, OrderBook, Trade, TradingStatus,
};
use crate::domain::subscription::{
    DispatchOutcome, RegistryStats, SubscriptionRegistry, SubscriptionState, Topic, TopicError,
    TopicHandler, TopicKind,
};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Configuration and Status Types
// =============================================================================

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Backoff policy for reconnects.
    pub reconnect: ReconnectConfig,
    /// Reconnect when nothing arrives for this long (`None` = never).
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(Duration::from_secs(180)),
        }
    }
}

impl SessionConfig {
    /// Build from stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_stream_settings(settings),
            idle_timeout: settings.idle_timeout,
        }
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Channel open, control frames are written immediately.
    Connected,
    /// Channel lost, waiting to open a new one.
    Reconnecting,
    /// New channel open, live subscriptions being resent.
    Resyncing,
    /// Permanently closed.
    Closed,
}

impl SessionState {
    /// Get the state as a label string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Resyncing => "resyncing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedReason {
    /// The caller closed it.
    Requested,
    /// Reconnection failed for the whole retry budget.
    RetriesExhausted(ReconnectError),
}

/// Point-in-time session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Connection state.
    pub state: SessionState,
    /// Channels replaced so far.
    pub generation: u64,
    /// Subscription counts and dispatch counters.
    pub subscriptions: RegistryStats,
    /// Inbound frames that failed to decode.
    pub malformed_frames: u64,
    /// Reconnect attempts made.
    pub reconnect_attempts: u64,
    /// Keep-alive pings received.
    pub pings: u64,
    /// Set once the session is closed.
    pub closed_reason: Option<ClosedReason>,
}

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Subscription parameters are malformed.
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    /// The initial channel could not be opened.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The session was closed or gave up reconnecting.
    #[error("session closed")]
    SessionClosed,
}

// =============================================================================
// Shared Session State
// =============================================================================

/// The send half and everything that must change atomically with it.
struct Link {
    sink: Option<Box<dyn FrameSink>>,
}

struct SessionInner {
    id: Uuid,
    registry: SubscriptionRegistry,
    factory: Arc<dyn ChannelFactory>,
    link: Mutex<Link>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    closing: AtomicBool,
    cancel: CancellationToken,
    watchdog: IdleWatchdog,
    malformed: AtomicU64,
    reconnects: AtomicU64,
    closed_reason: parking_lot::Mutex<Option<ClosedReason>>,
    /// Unsubscribes written on the current channel and not yet acknowledged.
    unsubscribes_in_flight: parking_lot::Mutex<HashMap<Topic, u32>>,
}

enum PumpExit {
    Cancelled,
    Failed(ChannelError),
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Must be called with the link lock held.
    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Session state changed");
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closing.load(Ordering::SeqCst) || self.state() == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// Write one frame, giving up if the session is cancelled first.
    ///
    /// Returns `None` on cancellation.
    async fn send_or_cancel(
        &self,
        sink: &mut dyn FrameSink,
        frame: ControlFrame,
    ) -> Option<Result<(), ChannelError>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            sent = sink.send(frame) => Some(sent),
        }
    }

    /// Write a control frame if the channel is up. Failures are logged; the
    /// affected topics stay registered and are resent by the next resync.
    ///
    /// Returns whether the frame was written.
    async fn send_if_connected(&self, link: &mut Link, frame: ControlFrame) -> bool {
        let (action, kind) = (frame.action, frame.kind);
        if self.state() != SessionState::Connected {
            tracing::debug!(
                action = action.as_str(),
                kind = %kind,
                "Channel down, control frame deferred to resync"
            );
            return false;
        }
        let Some(sink) = link.sink.as_mut() else {
            return false;
        };
        let instruments = frame.instruments.len();
        match self.send_or_cancel(sink.as_mut(), frame).await {
            Some(Ok(())) => {
                metrics::record_control_frame(action, kind.data_kind());
                tracing::debug!(action = action.as_str(), kind = %kind, instruments, "Control frame sent");
                true
            }
            Some(Err(e)) => {
                tracing::warn!(
                    action = action.as_str(),
                    kind = %kind,
                    error = %e,
                    "Control frame not sent, will resync after reconnect"
                );
                false
            }
            None => {
                tracing::debug!(action = action.as_str(), kind = %kind, "Session closing, control frame abandoned");
                false
            }
        }
    }

    fn expect_unsubscribe_ack(&self, topic: &Topic) {
        *self
            .unsubscribes_in_flight
            .lock()
            .entry(topic.clone())
            .or_default() += 1;
    }

    /// Consume one outstanding unsubscribe for any of `candidates`.
    fn take_unsubscribe_ack(&self, candidates: &[Topic]) -> bool {
        let mut in_flight = self.unsubscribes_in_flight.lock();
        for topic in candidates {
            if let Some(count) = in_flight.get_mut(topic) {
                *count -= 1;
                if *count == 0 {
                    in_flight.remove(topic);
                }
                return true;
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // Receive loop
    // -------------------------------------------------------------------------

    async fn run(self: Arc<Self>, mut source: Box<dyn FrameSource>, mut policy: ReconnectPolicy) {
        tracing::info!("Receive loop started");
        loop {
            match self.pump(source.as_mut()).await {
                PumpExit::Cancelled => break,
                PumpExit::Failed(error) => {
                    tracing::warn!(error = %error, "Stream channel failed");
                    match self.reconnect(&mut policy).await {
                        Some(next) => source = next,
                        None => break,
                    }
                }
            }
        }
        tracing::info!("Receive loop stopped");
    }

    async fn pump(&self, source: &mut dyn FrameSource) -> PumpExit {
        self.watchdog.record_activity();
        loop {
            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PumpExit::Cancelled,
                () = self.watchdog.expired() => Err(ChannelError::IdleTimeout),
                frame = source.receive() => frame,
            };

            match received {
                Ok(frame) => {
                    self.watchdog.record_activity();
                    self.handle_frame(frame);
                }
                Err(ChannelError::Decode(reason)) => {
                    self.watchdog.record_activity();
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    metrics::record_malformed_frame();
                    tracing::warn!(reason = %reason, "Dropping malformed frame");
                }
                Err(error) => return PumpExit::Failed(error),
            }
        }
    }

    fn handle_frame(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Data(payload) => self.route(&payload),
            InboundFrame::SubscriptionAck(ack) => self.apply_ack(&ack),
            InboundFrame::Ping(_) => self.watchdog.record_ping(),
        }
    }

    fn route(&self, payload: &MarketPayload) {
        let kind = payload.kind();
        metrics::record_frame_received(kind);

        let candidates = Topic::candidates(payload);
        match self.registry.route(&candidates, payload) {
            DispatchOutcome::Delivered => {}
            DispatchOutcome::Dropped => {
                metrics::record_frame_dropped(kind, DropReason::NoSubscriber);
                tracing::trace!(kind = %kind, instrument = ?payload.instrument(), "No subscriber for frame");
            }
            DispatchOutcome::HandlerPanicked => {
                metrics::record_frame_dropped(kind, DropReason::HandlerPanic);
                tracing::error!(kind = %kind, instrument = ?payload.instrument(), "Subscription handler panicked");
            }
        }
    }

    fn apply_ack(&self, ack: &SubscriptionAck) {
        for entry in &ack.entries {
            let candidates = entry.candidates();
            if self.take_unsubscribe_ack(&candidates) {
                tracing::debug!(
                    instrument = ?entry.instrument,
                    kind = %entry.kind,
                    status = entry.status.as_str(),
                    tracking_id = %ack.tracking_id,
                    "Unsubscribe acknowledged"
                );
                continue;
            }
            for topic in candidates {
                if entry.status.is_success() {
                    if self.registry.mark_active(&topic) {
                        tracing::debug!(topic = %topic, tracking_id = %ack.tracking_id, "Subscription active");
                    }
                } else if self.registry.mark_rejected(&topic) {
                    tracing::warn!(
                        topic = %topic,
                        status = entry.status.as_str(),
                        tracking_id = %ack.tracking_id,
                        "Subscription rejected by server"
                    );
                }
            }
        }
        metrics::set_subscriptions(&self.registry.stats());
    }

    // -------------------------------------------------------------------------
    // Reconnection
    // -------------------------------------------------------------------------

    /// Replace the failed channel and resync. Returns the new read half, or
    /// `None` if the session closed meanwhile.
    async fn reconnect(&self, policy: &mut ReconnectPolicy) -> Option<Box<dyn FrameSource>> {
        {
            let mut link = self.link.lock().await;
            if let Some(mut sink) = link.sink.take() {
                sink.close().await;
            }
            if self.cancel.is_cancelled() {
                return None;
            }
            self.set_state(SessionState::Reconnecting);
        }

        let mut last_error = String::from("channel failed");
        loop {
            let Some(delay) = policy.next_delay() else {
                self.give_up(ReconnectError::RetriesExhausted {
                    attempts: policy.attempt_count(),
                    last_error,
                })
                .await;
                return None;
            };

            self.reconnects.fetch_add(1, Ordering::Relaxed);
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to market data stream"
            );

            let opened = tokio::select! {
                () = self.cancel.cancelled() => return None,
                opened = async {
                    tokio::time::sleep(delay).await;
                    self.factory.open_channel().await
                } => opened,
            };

            let channel = match opened {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::warn!(error = %e, attempt = policy.attempt_count(), "Reconnect attempt failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            match self.resync(channel).await {
                Ok(source) => {
                    policy.reset();
                    return Some(source);
                }
                Err(Some(error)) => {
                    tracing::warn!(error = %error, "Resync failed on new channel");
                    last_error = error.to_string();
                }
                Err(None) => return None,
            }
        }
    }

    /// Install a fresh channel and resend every live subscription on it.
    ///
    /// `Err(None)` means the session was closed while the channel opened or
    /// while a resync frame was being written.
    async fn resync(
        &self,
        channel: Channel,
    ) -> Result<Box<dyn FrameSource>, Option<ChannelError>> {
        let Channel { mut sink, source } = channel;
        let mut link = self.link.lock().await;

        if self.cancel.is_cancelled() {
            sink.close().await;
            return Err(None);
        }

        self.set_state(SessionState::Resyncing);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let snapshot = self.registry.snapshot_for_resync();
        for (topic, _) in &snapshot {
            match self
                .send_or_cancel(sink.as_mut(), ControlFrame::subscribe(topic))
                .await
            {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    sink.close().await;
                    self.set_state(SessionState::Reconnecting);
                    return Err(Some(e));
                }
                None => {
                    sink.close().await;
                    return Err(None);
                }
            }
        }

        self.unsubscribes_in_flight.lock().clear();
        link.sink = Some(sink);
        self.set_state(SessionState::Connected);
        drop(link);

        metrics::record_resync(snapshot.len(), started.elapsed());
        metrics::set_subscriptions(&self.registry.stats());
        tracing::info!(generation, topics = snapshot.len(), "Resync complete");
        Ok(source)
    }

    async fn give_up(&self, error: ReconnectError) {
        let mut link = self.link.lock().await;
        tracing::error!(error = %error, "Market data stream lost, closing session");

        self.closing.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        *self.closed_reason.lock() = Some(ClosedReason::RetriesExhausted(error));
        link.sink = None;
        self.set_state(SessionState::Closed);
        self.registry.clear();
        metrics::set_subscriptions(&self.registry.stats());
    }
}

// =============================================================================
// Streaming Session
// =============================================================================

/// A long-lived market data stream multiplexing many subscriptions.
///
/// Subscribe and unsubscribe are best-effort: if the channel is down the
/// request is recorded and takes effect on the next successful resync.
///
/// Handlers run on the session's receive task and must not block.
pub struct StreamingSession {
    inner: Arc<SessionInner>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    /// Open the initial channel and start the receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the factory cannot open a
    /// channel.
    pub async fn open(
        factory: Arc<dyn ChannelFactory>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let Channel { sink, source } = factory.open_channel().await?;
        let (state, _) = watch::channel(SessionState::Connected);

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            registry: SubscriptionRegistry::new(),
            factory,
            link: Mutex::new(Link { sink: Some(sink) }),
            state,
            generation: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            watchdog: IdleWatchdog::new(config.idle_timeout),
            malformed: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            closed_reason: parking_lot::Mutex::new(None),
            unsubscribes_in_flight: parking_lot::Mutex::new(HashMap::new()),
        });

        let span = tracing::info_span!("stream_session", session_id = %inner.id);
        let policy = ReconnectPolicy::new(config.reconnect);
        let task = tokio::spawn(Arc::clone(&inner).run(source, policy).instrument(span));

        tracing::info!(session_id = %inner.id, "Streaming session opened");
        Ok(Self {
            inner,
            task: parking_lot::Mutex::new(Some(task)),
        })
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// A new topic sends a subscribe frame. Re-subscribing an existing topic
    /// only replaces the handler.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTopic`] for malformed parameters and
    /// [`SessionError::SessionClosed`] after close.
    pub async fn subscribe(&self, topic: Topic, handler: TopicHandler) -> Result<(), SessionError> {
        self.subscribe_all(vec![topic], &handler).await
    }

    /// Unsubscribe from `topic`.
    ///
    /// Returns `false` if the topic was unknown or already being cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] after close.
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<bool, SessionError> {
        self.inner.ensure_open()?;
        let mut link = self.inner.link.lock().await;
        self.inner.ensure_open()?;

        if !self.inner.registry.unregister(topic) {
            return Ok(false);
        }
        // Counted before the write so an immediate reply is still matched.
        self.inner.expect_unsubscribe_ack(topic);
        let sent = self
            .inner
            .send_if_connected(&mut link, ControlFrame::unsubscribe(topic))
            .await;
        if !sent {
            self.inner.take_unsubscribe_ack(std::slice::from_ref(topic));
        }
        self.inner.registry.finish_cancel(topic);
        metrics::set_subscriptions(&self.inner.registry.stats());

        tracing::info!(topic = %topic, "Unsubscribed");
        Ok(true)
    }

    /// Subscribe to candles of `interval` for each instrument.
    ///
    /// # Errors
    ///
    /// See [`StreamingSession::subscribe`].
    pub async fn subscribe_candles<I, S>(
        &self,
        instruments: I,
        interval: CandleInterval,
        handler: impl Fn(&Candle) + Send + Sync + 'static,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = TopicKind::Candles { interval };
        self.subscribe_kind(instruments, kind, TopicHandler::candle(handler))
            .await
    }

    /// Subscribe to trades for each instrument.
    ///
    /// # Errors
    ///
    /// See [`StreamingSession::subscribe`].
    pub async fn subscribe_trades<I, S>(
        &self,
        instruments: I,
        handler: impl Fn(&Trade) + Send + Sync + 'static,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_kind(instruments, TopicKind::Trades, TopicHandler::trade(handler))
            .await
    }

    /// Subscribe to order books of `depth` levels for each instrument.
    ///
    /// # Errors
    ///
    /// See [`StreamingSession::subscribe`].
    pub async fn subscribe_order_book<I, S>(
        &self,
        instruments: I,
        depth: u32,
        handler: impl Fn(&OrderBook) + Send + Sync + 'static,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = TopicKind::OrderBook { depth };
        self.subscribe_kind(instruments, kind, TopicHandler::order_book(handler))
            .await
    }

    /// Subscribe to last prices for each instrument.
    ///
    /// # Errors
    ///
    /// See [`StreamingSession::subscribe`].
    pub async fn subscribe_last_prices<I, S>(
        &self,
        instruments: I,
        handler: impl Fn(&LastPrice) + Send + Sync + 'static,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handler = TopicHandler::last_price(handler);
        self.subscribe_kind(instruments, TopicKind::LastPrice, handler)
            .await
    }

    /// Subscribe to trading status changes for each instrument.
    ///
    /// # Errors
    ///
    /// See [`StreamingSession::subscribe`].
    pub async fn subscribe_trading_status<I, S>(
        &self,
        instruments: I,
        handler: impl Fn(&TradingStatus) + Send + Sync + 'static,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handler = TopicHandler::trading_status(handler);
        self.subscribe_kind(instruments, TopicKind::TradingStatus, handler)
            .await
    }

    async fn subscribe_kind<I, S>(
        &self,
        instruments: I,
        kind: TopicKind,
        handler: TopicHandler,
    ) -> Result<Vec<Topic>, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<Topic> = instruments
            .into_iter()
            .map(|id| Topic::new(id, kind))
            .collect();
        self.subscribe_all(topics.clone(), &handler).await?;
        Ok(topics)
    }

    /// Register every topic and send one subscribe frame per data kind for
    /// the topics that need one. Nothing is registered unless all topics
    /// are valid.
    async fn subscribe_all(
        &self,
        topics: Vec<Topic>,
        handler: &TopicHandler,
    ) -> Result<(), SessionError> {
        self.inner.ensure_open()?;
        for topic in &topics {
            SubscriptionRegistry::check(topic, handler)?;
        }

        let mut link = self.inner.link.lock().await;
        self.inner.ensure_open()?;

        let mut frames: Vec<ControlFrame> = Vec::new();
        for topic in topics {
            let handle = self.inner.registry.register(topic, handler.clone())?;
            tracing::debug!(topic = %handle.topic, state = %handle.state, "Subscription registered");
            if !handle.needs_control_frame {
                continue;
            }
            match frames.last_mut() {
                Some(frame) if frame.kind == handle.topic.kind => {
                    frame.instruments.push(handle.topic.instrument_id);
                }
                _ => frames.push(ControlFrame::subscribe(&handle.topic)),
            }
        }

        for frame in frames {
            self.inner.send_if_connected(&mut link, frame).await;
        }
        metrics::set_subscriptions(&self.inner.registry.stats());
        Ok(())
    }

    /// Stop the receive loop, close the channel, and discard all
    /// subscriptions. Calling it again has no effect.
    pub async fn close(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Receive loop ended abnormally");
        }

        let mut link = self.inner.link.lock().await;
        if let Some(mut sink) = link.sink.take() {
            sink.close().await;
        }
        {
            let mut reason = self.inner.closed_reason.lock();
            if reason.is_none() {
                *reason = Some(ClosedReason::Requested);
            }
        }
        self.inner.set_state(SessionState::Closed);
        self.inner.registry.clear();
        metrics::set_subscriptions(&self.inner.registry.stats());

        tracing::info!(session_id = %self.inner.id, "Streaming session closed");
    }

    /// Unique id of this session, also recorded on its tracing span.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Number of times the channel has been replaced.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Lifecycle state of one topic.
    #[must_use]
    pub fn subscription_state(&self, topic: &Topic) -> SubscriptionState {
        self.inner.registry.state(topic)
    }

    /// Why the session closed, once it has.
    #[must_use]
    pub fn closed_reason(&self) -> Option<ClosedReason> {
        self.inner.closed_reason.lock().clone()
    }

    /// Point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.inner.state(),
            generation: self.generation(),
            subscriptions: self.inner.registry.stats(),
            malformed_frames: self.inner.malformed.load(Ordering::Relaxed),
            reconnect_attempts: self.inner.reconnects.load(Ordering::Relaxed),
            pings: self.inner.watchdog.pings(),
            closed_reason: self.closed_reason(),
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockChannelFactory;
    use crate::infrastructure::memory::MemoryTransport;

    fn quiet_config() -> SessionConfig {
        SessionConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                ..ReconnectConfig::default()
            }
            .without_jitter(),
            idle_timeout: None,
        }
    }

    #[tokio::test]
    async fn open_failure_is_connection_error() {
        let mut factory = MockChannelFactory::new();
        factory
            .expect_open_channel()
            .times(1)
            .returning(|| Err(ConnectionError::Unauthenticated("bad token".into())));

        let result = StreamingSession::open(Arc::new(factory), quiet_config()).await;

        assert!(matches!(
            result,
            Err(SessionError::Connection(ConnectionError::Unauthenticated(_)))
        ));
    }

    #[tokio::test]
    async fn invalid_topic_never_reaches_transport() {
        let transport = MemoryTransport::new();
        let session = StreamingSession::open(Arc::new(transport.clone()), quiet_config())
            .await
            .unwrap();

        let err = session
            .subscribe_order_book(["Y"], 0, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidTopic(TopicError::InvalidDepth(0))));
        assert!(transport.connection(0).unwrap().sent_frames().is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn batch_with_one_bad_topic_registers_nothing() {
        let transport = MemoryTransport::new();
        let session = StreamingSession::open(Arc::new(transport.clone()), quiet_config())
            .await
            .unwrap();

        let err = session.subscribe_trades(["A", ""], |_| {}).await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidTopic(TopicError::EmptyInstrumentId)));
        assert_eq!(session.stats().subscriptions.total(), 0);
        session.close().await;
    }

    #[tokio::test]
    async fn wrapper_batches_instruments_into_one_frame() {
        let transport = MemoryTransport::new();
        let session = StreamingSession::open(Arc::new(transport.clone()), quiet_config())
            .await
            .unwrap();

        let topics = session
            .subscribe_last_prices(["A", "B", "C"], |_| {})
            .await
            .unwrap();

        let sent = transport.connection(0).unwrap().sent_frames();
        assert_eq!(topics.len(), 3);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].instruments, vec!["A", "B", "C"]);
        session.close().await;
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let transport = MemoryTransport::new();
        let session = StreamingSession::open(Arc::new(transport.clone()), quiet_config())
            .await
            .unwrap();

        session.close().await;

        let topic = Topic::trades("X");
        assert!(matches!(
            session.subscribe(topic.clone(), TopicHandler::trade(|_| {})).await,
            Err(SessionError::SessionClosed)
        ));
        assert!(matches!(
            session.unsubscribe(&topic).await,
            Err(SessionError::SessionClosed)
        ));
        assert_eq!(session.closed_reason(), Some(ClosedReason::Requested));
    }
}
