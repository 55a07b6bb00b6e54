//! Subscription Registry
//!
//! Authoritative in-memory table of topic to subscription, independent of
//! the transport. All operations are safe to call concurrently from caller
//! tasks and the session's receive loop.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{SubscriptionState, Topic, TopicError, TopicHandler};
use crate::domain::streaming::MarketPayload;

// =============================================================================
// Types
// =============================================================================

/// Result of [`SubscriptionRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct SubscriptionHandle {
    /// The registered topic.
    pub topic: Topic,
    /// State after registration.
    pub state: SubscriptionState,
    /// Whether a subscribe control frame must be sent.
    pub needs_control_frame: bool,
}

/// Result of dispatching one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler received the payload.
    Delivered,
    /// No live subscription matched. The drop counter was incremented.
    Dropped,
    /// The handler panicked. The panic was contained.
    HandlerPanicked,
}

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Subscriptions awaiting an ack.
    pub pending: usize,
    /// Acknowledged subscriptions.
    pub active: usize,
    /// Subscriptions being cancelled.
    pub cancelling: usize,
    /// Frames dropped for lack of a subscriber.
    pub dropped_frames: u64,
    /// Handler invocations that panicked.
    pub handler_panics: u64,
}

impl RegistryStats {
    /// Total tracked subscriptions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.active + self.cancelling
    }
}

#[derive(Debug)]
struct Entry {
    handler: TopicHandler,
    state: SubscriptionState,
    /// Insertion order, used to keep resync deterministic.
    seq: u64,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<Topic, Entry>,
    next_seq: u64,
}

impl Table {
    const fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe store of subscriptions keyed by [`Topic`].
///
/// Handlers are invoked with the lock released, so a slow handler never
/// blocks registration. Handlers must not call `register`/`unregister`
/// synchronously.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    table: Mutex<Table>,
    dropped: AtomicU64,
    panics: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `handler` may be registered for `topic` without touching
    /// the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is not fully specified or the handler
    /// accepts a different payload kind than the topic delivers.
    pub fn check(topic: &Topic, handler: &TopicHandler) -> Result<(), TopicError> {
        topic.validate()?;
        let expected = topic.kind.data_kind();
        if handler.kind() == expected {
            Ok(())
        } else {
            Err(TopicError::HandlerMismatch {
                topic: expected,
                handler: handler.kind(),
            })
        }
    }

    /// Insert a subscription or replace the handler of an existing one.
    ///
    /// A new topic starts `Pending` and signals that a control frame is
    /// needed. An existing `Pending` or `Active` subscription only swaps its
    /// handler. A `Cancelling` one is re-armed to `Pending` and signals a
    /// control frame again.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is not fully specified or the handler
    /// accepts a different payload kind than the topic delivers.
    pub fn register(
        &self,
        topic: Topic,
        handler: TopicHandler,
    ) -> Result<SubscriptionHandle, TopicError> {
        Self::check(&topic, &handler)?;

        let mut table = self.table.lock();
        let seq = table.take_seq();

        if let Some(entry) = table.entries.get_mut(&topic) {
            entry.handler = handler;
            let needs_control_frame = entry.state == SubscriptionState::Cancelling;
            if needs_control_frame {
                entry.state = SubscriptionState::Pending;
                entry.seq = seq;
            }
            return Ok(SubscriptionHandle {
                state: entry.state,
                topic,
                needs_control_frame,
            });
        }

        table.entries.insert(
            topic.clone(),
            Entry {
                handler,
                state: SubscriptionState::Pending,
                seq,
            },
        );

        Ok(SubscriptionHandle {
            topic,
            state: SubscriptionState::Pending,
            needs_control_frame: true,
        })
    }

    /// Transition `Pending -> Active`.
    ///
    /// Unknown topics are ignored: an ack may race an unsubscribe. Returns
    /// whether the state changed.
    pub fn mark_active(&self, topic: &Topic) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(topic) {
            Some(entry) if entry.state == SubscriptionState::Pending => {
                entry.state = SubscriptionState::Active;
                true
            }
            _ => false,
        }
    }

    /// Remove a `Pending` subscription the server refused.
    ///
    /// Returns whether an entry was removed.
    pub fn mark_rejected(&self, topic: &Topic) -> bool {
        let mut table = self.table.lock();
        let pending = table
            .entries
            .get(topic)
            .is_some_and(|e| e.state == SubscriptionState::Pending);
        if pending {
            table.entries.remove(topic);
        }
        pending
    }

    /// Transition to `Cancelling`.
    ///
    /// Returns `true` if an unsubscribe control frame must be sent, `false`
    /// if the topic is unknown or already cancelling.
    pub fn unregister(&self, topic: &Topic) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(topic) {
            Some(entry) if entry.state.is_live() => {
                entry.state = SubscriptionState::Cancelling;
                true
            }
            _ => false,
        }
    }

    /// Remove a `Cancelling` subscription once its unsubscribe was handled.
    ///
    /// Returns whether an entry was removed.
    pub fn finish_cancel(&self, topic: &Topic) -> bool {
        let mut table = self.table.lock();
        let cancelling = table
            .entries
            .get(topic)
            .is_some_and(|e| e.state == SubscriptionState::Cancelling);
        if cancelling {
            table.entries.remove(topic);
        }
        cancelling
    }

    /// Deliver a payload to the handler of `topic`.
    pub fn dispatch(&self, topic: &Topic, payload: &MarketPayload) -> DispatchOutcome {
        self.route(std::slice::from_ref(topic), payload)
    }

    /// Deliver a payload to the first live subscription among `candidates`.
    ///
    /// The handler runs with the lock released. A panicking handler is
    /// contained and reported as [`DispatchOutcome::HandlerPanicked`].
    pub fn route(&self, candidates: &[Topic], payload: &MarketPayload) -> DispatchOutcome {
        let handler = {
            let table = self.table.lock();
            candidates
                .iter()
                .filter_map(|t| table.entries.get(t))
                .find(|e| e.state.is_live())
                .map(|e| e.handler.clone())
        };

        let Some(handler) = handler else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Dropped;
        };

        match catch_unwind(AssertUnwindSafe(|| handler.invoke(payload))) {
            Ok(true) => DispatchOutcome::Delivered,
            Ok(false) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Dropped
            }
            Err(_) => {
                self.panics.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::HandlerPanicked
            }
        }
    }

    /// Topics to restore after a reconnect, in insertion order.
    ///
    /// Returns every `Pending` or `Active` subscription with its state at the
    /// time of the call, and demotes `Active` ones to `Pending` since the new
    /// channel has not acknowledged them yet.
    pub fn snapshot_for_resync(&self) -> Vec<(Topic, SubscriptionState)> {
        let mut table = self.table.lock();
        let mut live: Vec<_> = table
            .entries
            .iter_mut()
            .filter(|(_, e)| e.state.is_live())
            .map(|(topic, e)| {
                let before = e.state;
                e.state = SubscriptionState::Pending;
                (e.seq, topic.clone(), before)
            })
            .collect();
        live.sort_by_key(|(seq, _, _)| *seq);
        live.into_iter().map(|(_, t, s)| (t, s)).collect()
    }

    /// Current state of a topic. Unknown topics report `Cancelled`.
    #[must_use]
    pub fn state(&self, topic: &Topic) -> SubscriptionState {
        self.table
            .lock()
            .entries
            .get(topic)
            .map_or(SubscriptionState::Cancelled, |e| e.state)
    }

    /// Frames dropped because no live subscription matched.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Counters and per-state subscription counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let table = self.table.lock();
        let mut stats = RegistryStats {
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            handler_panics: self.panics.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for entry in table.entries.values() {
            match entry.state {
                SubscriptionState::Pending => stats.pending += 1,
                SubscriptionState::Active => stats.active += 1,
                SubscriptionState::Cancelling => stats.cancelling += 1,
                SubscriptionState::Cancelled => {}
            }
        }
        stats
    }

    /// Discard every subscription.
    pub fn clear(&self) {
        self.table.lock().entries.clear();
    }

    /// Number of tracked subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether no subscriptions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
