//! In-Memory Transport
//!
//! A [`ChannelFactory`] whose channels live entirely in process. Each opened
//! channel gets a [`MemoryConnection`] handle that plays the server side:
//! it records the control frames the session wrote and injects inbound
//! frames or failures. Writes can be held at a chosen point to stand in
//! for a flow-controlled channel.
//!
//! Used by the integration tests and by callers that want to drive a session
//! without a network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use crate::application::ports::{
    AckEntry, AckStatus, Channel, ChannelError, ChannelFactory, ConnectionError, ControlFrame,
    FrameSink, FrameSource, InboundFrame, SubscriptionAck,
};
use crate::domain::streaming::InstrumentRef;

type Inbound = Result<InboundFrame, ChannelError>;

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug)]
struct ConnectionState {
    sent: Mutex<Vec<ControlFrame>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    sink_broken: AtomicBool,
    closed_by_client: AtomicBool,
    frame_written: Notify,
    /// Writes block once this many frames were recorded.
    hold_after: Mutex<Option<usize>>,
    held_writes: AtomicUsize,
    released: Notify,
}

/// Server-side handle of one in-memory channel.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    state: Arc<ConnectionState>,
}

impl MemoryConnection {
    /// Control frames the client wrote on this channel, in order.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<ControlFrame> {
        self.state.sent.lock().clone()
    }

    /// Wait until at least `count` control frames were written.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<ControlFrame> {
        loop {
            let notified = self.state.frame_written.notified();
            let sent = self.sent_frames();
            if sent.len() >= count {
                return sent;
            }
            notified.await;
        }
    }

    /// Deliver a frame to the client.
    pub fn push(&self, frame: InboundFrame) {
        let _ = self.state.inbound.send(Ok(frame));
    }

    /// Deliver a receive error to the client.
    pub fn push_error(&self, error: ChannelError) {
        let _ = self.state.inbound.send(Err(error));
    }

    /// Acknowledge every topic of `frame` with `status`.
    pub fn acknowledge(&self, frame: &ControlFrame, status: AckStatus) {
        let entries = frame
            .instruments
            .iter()
            .map(|id| AckEntry {
                instrument: InstrumentRef::figi(id.clone()),
                kind: frame.kind,
                status,
            })
            .collect();
        self.push(InboundFrame::SubscriptionAck(SubscriptionAck {
            tracking_id: uuid::Uuid::new_v4().to_string(),
            entries,
        }));
    }

    /// Simulate the server hanging up.
    pub fn close(&self) {
        self.break_sink();
        self.push_error(ChannelError::Closed);
    }

    /// Make every further write on this channel fail.
    pub fn break_sink(&self) {
        self.state.sink_broken.store(true, Ordering::SeqCst);
    }

    /// Block every write once `count` frames were recorded, until
    /// [`MemoryConnection::release_writes`].
    pub fn hold_writes_after(&self, count: usize) {
        *self.state.hold_after.lock() = Some(count);
    }

    /// Let held and future writes through.
    pub fn release_writes(&self) {
        *self.state.hold_after.lock() = None;
        self.state.released.notify_waiters();
    }

    /// Writes currently blocked by a hold.
    #[must_use]
    pub fn held_writes(&self) -> usize {
        self.state.held_writes.load(Ordering::SeqCst)
    }

    /// Whether the client closed its write half.
    #[must_use]
    pub fn closed_by_client(&self) -> bool {
        self.state.closed_by_client.load(Ordering::SeqCst)
    }
}

struct MemorySink {
    state: Arc<ConnectionState>,
}

impl MemorySink {
    async fn wait_while_held(&self) {
        loop {
            let released = self.state.released.notified();
            let limit = *self.state.hold_after.lock();
            if !limit.is_some_and(|limit| self.state.sent.lock().len() >= limit) {
                return;
            }
            let _held = HeldWrite::new(&self.state.held_writes);
            released.await;
        }
    }
}

/// Counts a blocked write for as long as it waits, including when the write
/// future is dropped.
struct HeldWrite<'a>(&'a AtomicUsize);

impl<'a> HeldWrite<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for HeldWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: ControlFrame) -> Result<(), ChannelError> {
        self.wait_while_held().await;
        if self.state.sink_broken.load(Ordering::SeqCst)
            || self.state.closed_by_client.load(Ordering::SeqCst)
        {
            return Err(ChannelError::Transport("broken pipe".to_string()));
        }
        self.state.sent.lock().push(frame);
        self.state.frame_written.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) {
        self.state.closed_by_client.store(true, Ordering::SeqCst);
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<InboundFrame, ChannelError> {
        self.rx.recv().await.unwrap_or(Err(ChannelError::Closed))
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Default)]
struct TransportState {
    connections: Mutex<Vec<MemoryConnection>>,
    attempts: Mutex<Vec<Instant>>,
    fail_next: AtomicU32,
    refusing: AtomicBool,
    hold_after: Mutex<Option<usize>>,
    opened: Notify,
}

/// In-process channel factory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<TransportState>,
}

impl MemoryTransport {
    /// Create a transport that accepts every open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` open attempts.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Refuse (or accept again) every open attempt.
    pub fn set_refusing(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Hold writes on every channel opened from now on once `count` frames
    /// were recorded on it. See [`MemoryConnection::hold_writes_after`].
    pub fn hold_writes_after(&self, count: usize) {
        *self.state.hold_after.lock() = Some(count);
    }

    /// Times at which opens were attempted, successful or not.
    #[must_use]
    pub fn open_attempts(&self) -> Vec<Instant> {
        self.state.attempts.lock().clone()
    }

    /// Number of channels opened successfully.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.connections.lock().len()
    }

    /// Handle of the `index`-th opened channel.
    #[must_use]
    pub fn connection(&self, index: usize) -> Option<MemoryConnection> {
        self.state.connections.lock().get(index).cloned()
    }

    /// Wait until the `index`-th channel has been opened.
    pub async fn wait_for_connection(&self, index: usize) -> MemoryConnection {
        loop {
            let notified = self.state.opened.notified();
            if let Some(conn) = self.connection(index) {
                return conn;
            }
            notified.await;
        }
    }

    fn take_failure(&self) -> bool {
        if self.state.refusing.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChannelFactory for MemoryTransport {
    async fn open_channel(&self) -> Result<Channel, ConnectionError> {
        self.state.attempts.lock().push(Instant::now());
        if self.take_failure() {
            return Err(ConnectionError::Unavailable("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(ConnectionState {
            sent: Mutex::new(Vec::new()),
            inbound: tx,
            sink_broken: AtomicBool::new(false),
            closed_by_client: AtomicBool::new(false),
            frame_written: Notify::new(),
            hold_after: Mutex::new(*self.state.hold_after.lock()),
            held_writes: AtomicUsize::new(0),
            released: Notify::new(),
        });
        self.state.connections.lock().push(MemoryConnection {
            state: Arc::clone(&state),
        });
        self.state.opened.notify_waiters();

        Ok(Channel::new(MemorySink { state }, MemorySource { rx }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::Ping;
    use crate::domain::subscription::Topic;

    #[tokio::test]
    async fn records_frames_and_delivers_pushes() {
        let transport = MemoryTransport::new();
        let Channel { mut sink, mut source } = transport.open_channel().await.unwrap();
        let conn = transport.connection(0).unwrap();

        let frame = ControlFrame::subscribe(&Topic::trades("X"));
        sink.send(frame.clone()).await.unwrap();
        assert_eq!(conn.sent_frames(), vec![frame]);

        conn.push(InboundFrame::Ping(Ping::default()));
        assert!(matches!(source.receive().await, Ok(InboundFrame::Ping(_))));
    }

    #[tokio::test]
    async fn close_fails_both_halves() {
        let transport = MemoryTransport::new();
        let Channel { mut sink, mut source } = transport.open_channel().await.unwrap();
        let conn = transport.connection(0).unwrap();

        conn.close();

        assert_eq!(source.receive().await.unwrap_err(), ChannelError::Closed);
        assert!(sink.send(ControlFrame::subscribe(&Topic::trades("X"))).await.is_err());
    }

    #[tokio::test]
    async fn scripted_open_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next_opens(2);

        assert!(transport.open_channel().await.is_err());
        assert!(transport.open_channel().await.is_err());
        assert!(transport.open_channel().await.is_ok());

        assert_eq!(transport.open_attempts().len(), 3);
        assert_eq!(transport.connection_count(), 1);
    }

    #[tokio::test]
    async fn client_close_is_observable() {
        let transport = MemoryTransport::new();
        let Channel { mut sink, .. } = transport.open_channel().await.unwrap();

        sink.close().await;

        assert!(transport.connection(0).unwrap().closed_by_client());
    }

    #[tokio::test]
    async fn held_write_completes_after_release() {
        let transport = MemoryTransport::new();
        let Channel { mut sink, .. } = transport.open_channel().await.unwrap();
        let conn = transport.connection(0).unwrap();
        conn.hold_writes_after(1);

        sink.send(ControlFrame::subscribe(&Topic::trades("A")))
            .await
            .unwrap();
        let second = ControlFrame::subscribe(&Topic::trades("B"));
        let mut write = tokio_test::task::spawn(sink.send(second));

        assert!(write.poll().is_pending());
        assert_eq!(conn.held_writes(), 1);

        conn.release_writes();
        assert!(write.is_woken());
        assert!(matches!(write.poll(), std::task::Poll::Ready(Ok(()))));
        assert_eq!(conn.held_writes(), 0);
        assert_eq!(conn.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn acknowledge_echoes_each_instrument() {
        let transport = MemoryTransport::new();
        let Channel { mut source, .. } = transport.open_channel().await.unwrap();
        let conn = transport.connection(0).unwrap();

        let mut frame = ControlFrame::subscribe(&Topic::trades("A"));
        frame.instruments.push("B".to_string());
        conn.acknowledge(&frame, AckStatus::Success);

        let Ok(InboundFrame::SubscriptionAck(ack)) = source.receive().await else {
            panic!("expected ack");
        };
        assert_eq!(ack.entries.len(), 2);
        assert_eq!(ack.entries[1].instrument.figi, "B");
    }
}
