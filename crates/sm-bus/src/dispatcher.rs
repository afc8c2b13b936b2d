//! Typed publish/subscribe dispatcher, the backbone every component talks
//! through.
//!
//! Entries go onto an unbounded FIFO queue and are drained by exactly one
//! cooperative worker at a time: the first `publish` call that finds no drain
//! in progress becomes the worker and delivers until the queue is empty. A
//! publish issued from inside a callback therefore only enqueues: its entry
//! lands behind everything already pending and is never delivered inline.
//! With a single worker this yields FIFO delivery in publication order,
//! at-most-once per subscriber per event, and no reentrancy into component
//! state.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

use sm_types::{EngineError, EngineResult, EventPayload, Topic};

/// Subscriber callback. Receives the sender's name and the payload.
///
/// Returning a non-fatal `Err` is logged and swallowed so one bad subscriber
/// cannot stall the replay; a fatal error (see [`EngineError::is_fatal`])
/// stops the drain and propagates to the outermost publisher.
pub type Callback = Arc<dyn Fn(&str, &EventPayload) -> EngineResult<()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    name: String,
    callback: Callback,
}

struct Envelope {
    topic: Topic,
    sender: String,
    payload: EventPayload,
}

struct Inner {
    subscribers: RwLock<HashMap<Topic, Vec<Subscriber>>>,
    queue_tx: Sender<Envelope>,
    queue_rx: Receiver<Envelope>,
    draining: AtomicBool,
}

/// Handle to the process's event bus.
///
/// Clones are cheap and share one subscriber set and one queue, so every
/// component holding a handle sees the same bus.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                queue_tx,
                queue_rx,
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Register `callback` for `topic`.
    ///
    /// Callbacks fire in registration order; subscribing the same callback
    /// twice yields two deliveries per event. Safe to call while a delivery
    /// is in flight; in-flight deliveries use the subscriber list snapshot
    /// taken when they started.
    pub fn subscribe<F>(&self, topic: Topic, name: impl Into<String>, callback: F)
    where
        F: Fn(&str, &EventPayload) -> EngineResult<()> + Send + Sync + 'static,
    {
        let subscriber = Subscriber {
            name: name.into(),
            callback: Arc::new(callback),
        };
        self.inner
            .subscribers
            .write()
            .entry(topic)
            .or_default()
            .push(subscriber);
    }

    /// Number of callbacks registered for `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .subscribers
            .read()
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Enqueue one event. Never blocks; the queue is unbounded.
    ///
    /// If no drain is in progress the caller becomes the worker and delivers
    /// the queue to empty before returning, so a fatal subscriber error
    /// surfaces here. Called from inside a callback it only enqueues and
    /// returns `Ok` immediately.
    pub fn publish(
        &self,
        topic: Topic,
        sender: impl Into<String>,
        payload: EventPayload,
    ) -> EngineResult<()> {
        let envelope = Envelope {
            topic,
            sender: sender.into(),
            payload,
        };
        self.inner
            .queue_tx
            .send(envelope)
            .map_err(|_| EngineError::Internal("event queue closed".to_string()))?;
        self.pump()
    }

    /// Become the single worker if nobody else is, and drain the queue.
    fn pump(&self) -> EngineResult<()> {
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            // A drain is already running; it will pick our entry up.
            return Ok(());
        }
        loop {
            while let Ok(envelope) = self.inner.queue_rx.try_recv() {
                if let Err(e) = self.deliver(envelope) {
                    self.inner.draining.store(false, Ordering::Release);
                    return Err(e);
                }
            }
            self.inner.draining.store(false, Ordering::Release);
            // Re-check: an entry may have slipped in after try_recv emptied
            // but before the flag cleared.
            if self.inner.queue_rx.is_empty() || self.inner.draining.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
        }
    }

    fn deliver(&self, envelope: Envelope) -> EngineResult<()> {
        let snapshot: Vec<Subscriber> = self
            .inner
            .subscribers
            .read()
            .get(&envelope.topic)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            trace!(topic = %envelope.topic, "no subscribers, dropping event");
            return Ok(());
        }

        for subscriber in &snapshot {
            if let Err(e) = (subscriber.callback)(&envelope.sender, &envelope.payload) {
                if e.is_fatal() {
                    error!(
                        subscriber = %subscriber.name,
                        topic = %envelope.topic,
                        error = %e,
                        "fatal subscriber error, aborting dispatch"
                    );
                    return Err(e);
                }
                error!(
                    subscriber = %subscriber.name,
                    topic = %envelope.topic,
                    error = %e,
                    "subscriber failed, continuing"
                );
            }
        }
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
