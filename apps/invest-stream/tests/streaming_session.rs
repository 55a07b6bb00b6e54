//! Streaming Session Integration Tests
//!
//! Drives a session end to end against the in-memory transport: delivery,
//! acknowledgements, unsubscribe, reconnect with resync, and close.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio_test::{assert_err, assert_ok};

use invest_stream::application::ports::{AckEntry, SubscriptionAck};
use invest_stream::{
    AckStatus, Candle, CandleInterval, ChannelError, ClosedReason, ControlFrame, InboundFrame,
    InstrumentRef, LastPrice, MarketPayload, MemoryConnection, Ping, MemoryTransport, ReconnectConfig,
    SessionConfig, SessionError, SessionState, StreamingSession, SubscriptionAction,
    SubscriptionState, Topic, TopicHandler, TopicKind,
};

// =============================================================================
// Helpers
// =============================================================================

fn config() -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        },
        idle_timeout: None,
    }
}

async fn open(transport: &MemoryTransport, config: SessionConfig) -> StreamingSession {
    assert_ok!(StreamingSession::open(Arc::new(transport.clone()), config).await)
}

/// Poll `condition` until it holds. Time is paused in these tests, so every
/// sleep lets the session task run and advances the clock.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn candle(figi: &str, interval: CandleInterval, close: Decimal) -> MarketPayload {
    MarketPayload::Candle(Candle {
        instrument: InstrumentRef::figi(figi),
        interval,
        open: Decimal::new(10_000, 2),
        high: Decimal::new(10_250, 2),
        low: Decimal::new(9_975, 2),
        close,
        volume: 1_200,
        time: Utc::now(),
        last_trade_at: None,
    })
}

fn last_price(instrument: InstrumentRef, price: i64) -> MarketPayload {
    MarketPayload::LastPrice(LastPrice {
        instrument,
        price: Decimal::from(price),
        time: Utc::now(),
    })
}

fn ack(instrument: InstrumentRef, kind: TopicKind, status: AckStatus) -> InboundFrame {
    InboundFrame::SubscriptionAck(SubscriptionAck {
        tracking_id: "test-tracking-id".to_string(),
        entries: vec![AckEntry {
            instrument,
            kind,
            status,
        }],
    })
}

/// Subscribe, wait for the frame, and acknowledge it.
async fn subscribe_active(
    session: &StreamingSession,
    conn: &MemoryConnection,
    topic: &Topic,
    handler: TopicHandler,
) {
    let before = conn.sent_frames().len();
    assert_ok!(session.subscribe(topic.clone(), handler).await);
    let frames = conn.wait_for_frames(before + 1).await;
    conn.acknowledge(&frames[before], AckStatus::Success);
    eventually(|| session.subscription_state(topic) == SubscriptionState::Active).await;
}

fn price_recorder() -> (Arc<Mutex<Vec<Decimal>>>, TopicHandler) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = TopicHandler::last_price(move |p: &LastPrice| sink.lock().push(p.price));
    (seen, handler)
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn acknowledged_candle_reaches_handler_once() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let received: Arc<Mutex<Vec<Candle>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let topic = Topic::candles("X", CandleInterval::OneMinute);
    subscribe_active(
        &session,
        &conn,
        &topic,
        TopicHandler::candle(move |c: &Candle| sink.lock().push(c.clone())),
    )
    .await;

    let frame = candle("X", CandleInterval::OneMinute, Decimal::new(10_125, 2));
    conn.push(InboundFrame::Data(frame.clone()));
    eventually(|| received.lock().len() == 1).await;

    let MarketPayload::Candle(expected) = frame else {
        unreachable!()
    };
    assert_eq!(received.lock()[0], expected);

    // Same instrument, other interval: no subscriber.
    conn.push(InboundFrame::Data(candle(
        "X",
        CandleInterval::FiveMinutes,
        Decimal::ONE,
    )));
    eventually(|| session.stats().subscriptions.dropped_frames == 1).await;
    assert_eq!(received.lock().len(), 1);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn frame_for_unknown_topic_is_counted_as_dropped() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    conn.push(InboundFrame::Data(last_price(InstrumentRef::figi("NOPE"), 1)));
    conn.push(InboundFrame::Data(last_price(InstrumentRef::figi("NOPE"), 2)));

    eventually(|| session.stats().subscriptions.dropped_frames == 2).await;
    assert_eq!(session.state(), SessionState::Connected);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn frames_are_matched_by_either_instrument_id() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let (seen, handler) = price_recorder();
    let topic = Topic::last_price("uid-1");
    assert_ok!(session.subscribe(topic.clone(), handler).await);
    conn.wait_for_frames(1).await;

    // The server echoes both ids; the topic was keyed by UID.
    let echoed = InstrumentRef::new("BBG000000001", "uid-1");
    conn.push(ack(echoed.clone(), TopicKind::LastPrice, AckStatus::Success));
    eventually(|| session.subscription_state(&topic) == SubscriptionState::Active).await;

    conn.push(InboundFrame::Data(last_price(echoed, 42)));
    eventually(|| seen.lock().len() == 1).await;
    assert_eq!(seen.lock()[0], Decimal::from(42));

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_stop_delivery() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let bad = Topic::last_price("BAD");
    assert_ok!(
        session
            .subscribe(
                bad,
                TopicHandler::last_price(|_: &LastPrice| panic!("handler bug"))
            )
            .await
    );
    let (seen, handler) = price_recorder();
    assert_ok!(session.subscribe(Topic::last_price("GOOD"), handler).await);

    conn.push(InboundFrame::Data(last_price(InstrumentRef::figi("BAD"), 1)));
    conn.push(InboundFrame::Data(last_price(InstrumentRef::figi("GOOD"), 2)));

    eventually(|| seen.lock().len() == 1).await;
    let stats = session.stats();
    assert_eq!(stats.subscriptions.handler_panics, 1);
    assert_eq!(stats.state, SessionState::Connected);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_counted_without_reconnecting() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    conn.push_error(ChannelError::Decode("truncated message".into()));
    conn.push_error(ChannelError::Decode("unknown interval".into()));

    eventually(|| session.stats().malformed_frames == 2).await;
    assert_eq!(transport.connection_count(), 1);
    assert_eq!(session.generation(), 0);

    session.close().await;
}

// =============================================================================
// Subscription Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn resubscribing_active_topic_swaps_handler_without_new_frame() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let topic = Topic::last_price("X");
    let (first, handler) = price_recorder();
    subscribe_active(&session, &conn, &topic, handler).await;

    let (second, handler) = price_recorder();
    assert_ok!(session.subscribe(topic.clone(), handler).await);

    conn.push(InboundFrame::Data(last_price(InstrumentRef::figi("X"), 7)));
    eventually(|| second.lock().len() == 1).await;

    assert!(first.lock().is_empty());
    assert_eq!(conn.sent_frames().len(), 1);
    assert_eq!(session.subscription_state(&topic), SubscriptionState::Active);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_sends_one_frame_and_is_not_repeated() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    assert!(!assert_ok!(session.unsubscribe(&Topic::trades("UNKNOWN")).await));
    assert!(conn.sent_frames().is_empty());

    let topic = Topic::order_book("Y", 20);
    let (_, handler) = price_recorder();
    // Handler kind mismatch is rejected before anything is registered.
    assert!(matches!(
        session.subscribe(topic.clone(), handler).await,
        Err(SessionError::InvalidTopic(_))
    ));

    assert_ok!(
        session
            .subscribe_order_book(["Y"], 20, |_| {})
            .await
    );
    assert!(assert_ok!(session.unsubscribe(&topic).await));
    assert!(!assert_ok!(session.unsubscribe(&topic).await));

    let frames = conn.sent_frames();
    let unsubscribes: Vec<&ControlFrame> = frames
        .iter()
        .filter(|f| f.action == SubscriptionAction::Unsubscribe)
        .collect();
    assert_eq!(unsubscribes.len(), 1);
    assert_eq!(unsubscribes[0].kind, TopicKind::OrderBook { depth: 20 });
    assert_eq!(session.subscription_state(&topic), SubscriptionState::Cancelled);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_ack_does_not_activate_resubscribed_topic() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let topic = Topic::trades("X");
    subscribe_active(&session, &conn, &topic, TopicHandler::trade(|_| {})).await;

    assert!(assert_ok!(session.unsubscribe(&topic).await));
    assert_ok!(session.subscribe(topic.clone(), TopicHandler::trade(|_| {})).await);
    let frames = conn.wait_for_frames(3).await;
    assert_eq!(frames[1].action, SubscriptionAction::Unsubscribe);
    assert_eq!(frames[2].action, SubscriptionAction::Subscribe);

    // The ping marks the point where the unsubscribe ack has been handled.
    conn.acknowledge(&frames[1], AckStatus::Success);
    conn.push(InboundFrame::Ping(Ping::default()));
    eventually(|| session.stats().pings == 1).await;
    assert_eq!(session.subscription_state(&topic), SubscriptionState::Pending);

    conn.acknowledge(&frames[2], AckStatus::Success);
    eventually(|| session.subscription_state(&topic) == SubscriptionState::Active).await;

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_subscription_is_removed() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let topic = Topic::trades("DELISTED");
    assert_ok!(session.subscribe_trades(["DELISTED"], |_| {}).await);
    let frames = conn.wait_for_frames(1).await;
    conn.acknowledge(&frames[0], AckStatus::InstrumentNotFound);

    eventually(|| session.subscription_state(&topic) == SubscriptionState::Cancelled).await;
    assert_eq!(session.stats().subscriptions.total(), 0);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn batch_subscribe_sends_one_frame_per_kind() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let topics = assert_ok!(
        session
            .subscribe_candles(["A", "B"], CandleInterval::OneHour, |_| {})
            .await
    );
    assert_eq!(topics.len(), 2);

    let frames = conn.wait_for_frames(1).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].instruments, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(
        frames[0].kind,
        TopicKind::Candles {
            interval: CandleInterval::OneHour
        }
    );

    session.close().await;
}

// =============================================================================
// Reconnect and Resync
// =============================================================================

#[tokio::test(start_paused = true)]
async fn reconnect_resends_every_live_topic_once() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let active = Topic::trades("A");
    let pending = Topic::last_price("B");
    let (_, handler) = price_recorder();
    subscribe_active(&session, &conn, &active, TopicHandler::trade(|_| {})).await;
    assert_ok!(session.subscribe(pending.clone(), handler).await);
    conn.wait_for_frames(2).await;

    conn.close();

    let next = transport.wait_for_connection(1).await;
    let frames = next.wait_for_frames(2).await;
    eventually(|| session.state() == SessionState::Connected).await;

    assert_eq!(
        frames,
        vec![ControlFrame::subscribe(&active), ControlFrame::subscribe(&pending)]
    );
    assert_eq!(session.generation(), 1);
    assert!(conn.closed_by_client());

    // Resynced topics wait for a fresh ack.
    assert_eq!(session.subscription_state(&active), SubscriptionState::Pending);
    for frame in &frames {
        next.acknowledge(frame, AckStatus::Success);
    }
    eventually(|| session.stats().subscriptions.active == 2).await;

    // Nothing else was written on the new channel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(next.sent_frames().len(), 2);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn order_book_depth_survives_reconnect_with_growing_backoff() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let topic = Topic::order_book("Y", 10);
    subscribe_active(&session, &conn, &topic, TopicHandler::order_book(|_| {})).await;

    transport.fail_next_opens(2);
    conn.close();

    let next = transport.wait_for_connection(1).await;
    let frames = next.wait_for_frames(1).await;
    assert_eq!(frames, vec![ControlFrame::subscribe(&topic)]);
    assert_eq!(frames[0].kind, TopicKind::OrderBook { depth: 10 });

    // Initial open plus three reconnect attempts.
    let attempts = transport.open_attempts();
    assert_eq!(attempts.len(), 4);
    let gaps: Vec<Duration> = attempts[1..].windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] < gaps[1], "backoff did not grow: {gaps:?}");

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_send_is_repaired_by_resync() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    conn.break_sink();
    let topic = Topic::trading_status("Z");
    assert_ok!(session.subscribe_trading_status(["Z"], |_| {}).await);
    assert!(conn.sent_frames().is_empty());
    assert_eq!(session.subscription_state(&topic), SubscriptionState::Pending);

    conn.close();

    let next = transport.wait_for_connection(1).await;
    let frames = next.wait_for_frames(1).await;
    assert_eq!(frames, vec![ControlFrame::subscribe(&topic)]);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn subscribe_while_reconnecting_is_deferred_to_resync() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    transport.set_refusing(true);
    conn.close();
    eventually(|| session.state() == SessionState::Reconnecting).await;

    let topic = Topic::last_price("LATE");
    let (_, handler) = price_recorder();
    assert_ok!(session.subscribe(topic.clone(), handler).await);
    transport.set_refusing(false);

    let next = transport.wait_for_connection(1).await;
    let frames = next.wait_for_frames(1).await;
    assert_eq!(frames, vec![ControlFrame::subscribe(&topic)]);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn subscribe_during_resync_is_written_after_resync_frames() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    assert_ok!(session.subscribe_trades(["A"], |_| {}).await);
    assert_ok!(session.subscribe_last_prices(["B"], |_| {}).await);
    assert_ok!(session.subscribe_trading_status(["C"], |_| {}).await);
    conn.wait_for_frames(3).await;

    transport.hold_writes_after(1);
    conn.close();

    let next = transport.wait_for_connection(1).await;
    eventually(|| next.held_writes() == 1).await;
    assert_eq!(session.state(), SessionState::Resyncing);

    let late = Topic::candles("D", CandleInterval::OneMinute);
    let subscribe = session.subscribe_candles(["D"], CandleInterval::OneMinute, |_| {});
    let release = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(next.sent_frames().len(), 1);
        next.release_writes();
    };
    let (subscribed, ()) = tokio::join!(subscribe, release);
    assert_ok!(subscribed);

    let frames = next.wait_for_frames(4).await;
    assert_eq!(
        frames,
        vec![
            ControlFrame::subscribe(&Topic::trades("A")),
            ControlFrame::subscribe(&Topic::last_price("B")),
            ControlFrame::subscribe(&Topic::trading_status("C")),
            ControlFrame::subscribe(&late),
        ]
    );
    assert_eq!(session.state(), SessionState::Connected);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_closes_session() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let (_, handler) = price_recorder();
    assert_ok!(session.subscribe(Topic::last_price("X"), handler).await);

    transport.set_refusing(true);
    conn.close();

    let mut states = session.state_changes();
    assert_ok!(states.wait_for(|s| *s == SessionState::Closed).await);

    assert!(matches!(
        session.closed_reason(),
        Some(ClosedReason::RetriesExhausted(_))
    ));
    assert_eq!(transport.open_attempts().len(), 6);
    assert_eq!(session.stats().subscriptions.total(), 0);

    let (_, handler) = price_recorder();
    assert!(matches!(
        assert_err!(session.subscribe(Topic::last_price("Y"), handler).await),
        SessionError::SessionClosed
    ));
}

#[tokio::test(start_paused = true)]
async fn idle_channel_is_replaced() {
    let transport = MemoryTransport::new();
    let config = SessionConfig {
        idle_timeout: Some(Duration::from_secs(5)),
        ..config()
    };
    let session = open(&transport, config).await;

    let (_, handler) = price_recorder();
    assert_ok!(session.subscribe(Topic::last_price("X"), handler).await);

    let next = transport.wait_for_connection(1).await;
    next.wait_for_frames(1).await;
    assert!(transport.connection(0).unwrap().closed_by_client());

    session.close().await;
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    let (_, handler) = price_recorder();
    assert_ok!(session.subscribe(Topic::last_price("X"), handler).await);

    session.close().await;
    let after_first = (conn.sent_frames(), session.stats());

    session.close().await;

    assert_eq!((conn.sent_frames(), session.stats()), after_first);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.closed_reason(), Some(ClosedReason::Requested));
    assert!(conn.closed_by_client());
    assert_eq!(transport.connection_count(), 1);

    assert!(matches!(
        session.unsubscribe(&Topic::last_price("X")).await,
        Err(SessionError::SessionClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn close_abandons_stalled_resync_write() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    assert_ok!(session.subscribe_trades(["X"], |_| {}).await);
    conn.wait_for_frames(1).await;

    transport.hold_writes_after(0);
    conn.close();

    let next = transport.wait_for_connection(1).await;
    eventually(|| next.held_writes() == 1).await;
    assert_eq!(session.state(), SessionState::Resyncing);

    assert_ok!(tokio::time::timeout(Duration::from_secs(3), session.close()).await);

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.closed_reason(), Some(ClosedReason::Requested));
    assert_eq!(next.held_writes(), 0);
    assert!(next.sent_frames().is_empty());
    assert!(next.closed_by_client());
}

#[tokio::test(start_paused = true)]
async fn close_releases_subscribe_blocked_on_write() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();
    conn.hold_writes_after(0);

    let blocked = session.subscribe_trades(["X"], |_| {});
    let closer = async {
        eventually(|| conn.held_writes() == 1).await;
        session.close().await;
    };
    let (subscribed, ()) = assert_ok!(
        tokio::time::timeout(Duration::from_secs(3), async { tokio::join!(blocked, closer) }).await
    );

    assert_ok!(subscribed);
    assert!(conn.sent_frames().is_empty());
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn close_during_reconnect_stops_retrying() {
    let transport = MemoryTransport::new();
    let session = open(&transport, config()).await;
    let conn = transport.connection(0).unwrap();

    transport.set_refusing(true);
    conn.close();
    eventually(|| session.state() == SessionState::Reconnecting).await;

    session.close().await;
    let attempts = transport.open_attempts().len();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.open_attempts().len(), attempts);
    assert_eq!(session.closed_reason(), Some(ClosedReason::Requested));
}
