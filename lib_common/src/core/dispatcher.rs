//! # Subscriber Registry and Broadcaster
//!
//! The `Dispatcher` is the fan-out stage of the relay. It owns the set of
//! currently connected observers and pushes every ingested record to all of
//! them in ingestion order.
//!
//! ## Core Design:
//!
//! 1.  **Serialize once, share everywhere**: a record is serialized to JSON a
//!     single time per broadcast and wrapped in an `Arc<str>`; every
//!     subscriber receives a pointer to the same payload, so fan-out cost
//!     does not scale with payload size.
//!
//! 2.  **Message-passing fan-out**: each subscriber owns an unbounded MPSC
//!     receiver drained by its own transport task. The registry is only ever
//!     touched under one mutex, so a subscriber connecting or disconnecting
//!     mid-broadcast cannot corrupt an iteration.
//!
//! 3.  **Gap-free seeding**: the most recently broadcast frame is retained
//!     inside the same lock that orders broadcasts. A subscriber connecting
//!     mid-stream is seeded with that frame and registered atomically, so it
//!     sees the current last state once, then every subsequent record, with
//!     no gap and no duplicate.
//!
//! 4.  **Liveness tracking**: every subscriber carries an `Alive`/`Suspect`
//!     state driven by the periodic sweep. A sweep turns `Alive` into
//!     `Suspect` and emits a ping; a pong (reported via [`Dispatcher::mark_alive`])
//!     turns `Suspect` back into `Alive`; a subscriber still `Suspect` at the
//!     next sweep is evicted. Eviction is terminal: the handle is dropped
//!     from the registry and the transport task is told to close.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::core::metrics::RelayMetrics;
use crate::core::model::EventRecord;

/// What a subscriber's transport task receives from the dispatcher.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A serialized event record to forward verbatim.
    Data(Arc<str>),
    /// Send a liveness probe on the transport.
    Ping,
    /// The subscriber was evicted; close the transport and stop.
    Close,
}

/// Liveness of one subscriber between sweeps. Eviction has no state of its
/// own: an evicted subscriber is simply no longer in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Alive,
    Suspect,
}

struct SubscriberHandle {
    id: String,
    liveness: Liveness,
    sender: mpsc::UnboundedSender<Frame>,
}

struct Inner {
    subscribers: Vec<SubscriberHandle>,
    /// The most recently broadcast payload, used to seed new subscribers.
    last_frame: Option<Arc<str>>,
}

/// Registry of open observer connections plus the broadcast path.
pub struct Dispatcher {
    inner: Mutex<Inner>,
    metrics: Arc<RelayMetrics>,
}

impl Dispatcher {
    /// Creates an empty registry. The metrics handle keeps the
    /// `active_subscribers` gauge in step with the registry size.
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                last_frame: None,
            }),
            metrics,
        }
    }

    /// Registers a new subscriber and returns the receiving half of its
    /// frame channel.
    ///
    /// If a record has been broadcast before, the channel is seeded with it
    /// under the registry lock, so the subscriber observes the last state
    /// followed by every later record in order.
    pub fn subscribe(&self, id: &str) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("Dispatcher lock poisoned");

        if let Some(last) = &inner.last_frame {
            let _ = tx.send(Frame::Data(Arc::clone(last)));
        }
        inner.subscribers.push(SubscriberHandle {
            id: id.to_string(),
            liveness: Liveness::Alive,
            sender: tx,
        });
        self.metrics
            .active_subscribers
            .set(inner.subscribers.len() as i64);
        tracing::info!(subscriber = id, "subscriber registered");
        rx
    }

    /// Removes a subscriber, regardless of liveness state. Used by the
    /// transport on close or error; removing an unknown id is a no-op.
    pub fn unsubscribe(&self, id: &str) {
        let mut inner = self.inner.lock().expect("Dispatcher lock poisoned");
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        if inner.subscribers.len() != before {
            tracing::info!(subscriber = id, "subscriber removed");
        }
        self.metrics
            .active_subscribers
            .set(inner.subscribers.len() as i64);
    }

    /// Records a liveness response: a `Suspect` subscriber becomes `Alive`
    /// again and survives the next sweep.
    pub fn mark_alive(&self, id: &str) {
        let mut inner = self.inner.lock().expect("Dispatcher lock poisoned");
        if let Some(handle) = inner.subscribers.iter_mut().find(|s| s.id == id) {
            handle.liveness = Liveness::Alive;
        }
    }

    /// Serializes `record` once and delivers the identical payload to every
    /// registered subscriber.
    ///
    /// A subscriber whose channel is gone (transport task exited) is dropped
    /// from the registry; it never fails the broadcast as a whole. Broadcast
    /// order is the lock acquisition order, which is the ingestion order.
    pub fn publish(&self, record: &EventRecord) {
        let frame: Arc<str> = match serde_json::to_string(record) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize record for broadcast");
                return;
            }
        };

        let mut inner = self.inner.lock().expect("Dispatcher lock poisoned");
        inner.last_frame = Some(Arc::clone(&frame));
        inner.subscribers.retain(|s| {
            match s.sender.send(Frame::Data(Arc::clone(&frame))) {
                Ok(()) => true,
                Err(_) => {
                    tracing::info!(subscriber = %s.id, "subscriber channel closed, removing");
                    false
                }
            }
        });
        self.metrics
            .active_subscribers
            .set(inner.subscribers.len() as i64);
    }

    /// One liveness sweep: evicts every subscriber still `Suspect` from the
    /// previous sweep and probes the rest.
    ///
    /// Returns the number of evicted subscribers. A subscriber that never
    /// responds is therefore gone by the start of the second interval after
    /// falling silent: it tolerates at most one missed response.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().expect("Dispatcher lock poisoned");
        let mut evicted = 0;
        inner.subscribers.retain_mut(|s| match s.liveness {
            Liveness::Suspect => {
                tracing::warn!(subscriber = %s.id, "no liveness response, evicting");
                let _ = s.sender.send(Frame::Close);
                evicted += 1;
                false
            }
            Liveness::Alive => {
                s.liveness = Liveness::Suspect;
                let _ = s.sender.send(Frame::Ping);
                true
            }
        });
        self.metrics
            .active_subscribers
            .set(inner.subscribers.len() as i64);
        evicted
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("Dispatcher lock poisoned")
            .subscribers
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::StrokeEvent;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(RelayMetrics::new().unwrap()))
    }

    fn record(topic: &str, t_ms: f64) -> EventRecord {
        EventRecord {
            topic: topic.to_string(),
            event: StrokeEvent::Top,
            t_ms,
            v_rms_g: None,
            v_peak_g: None,
            analysis: None,
        }
    }

    fn drain_data(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Frame::Data(text) = frame {
                out.push(text.to_string());
            }
        }
        out
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_record_in_order() {
        let d = dispatcher();
        let mut rx_a = d.subscribe("a");
        let mut rx_b = d.subscribe("b");

        for t in [1.0, 2.0, 3.0] {
            d.publish(&record("press-01", t));
        }

        let a = drain_data(&mut rx_a);
        let b = drain_data(&mut rx_b);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
        assert!(a[0].contains("\"t_ms\":1.0"));
        assert!(a[2].contains("\"t_ms\":3.0"));
    }

    #[tokio::test]
    async fn late_subscriber_is_seeded_with_last_state_once() {
        let d = dispatcher();
        d.publish(&record("press-01", 1.0));
        d.publish(&record("press-01", 2.0));

        let mut rx = d.subscribe("late");
        d.publish(&record("press-01", 3.0));

        let got = drain_data(&mut rx);
        assert_eq!(got.len(), 2); // last state, then the new record; no gap, no duplicate
        assert!(got[0].contains("\"t_ms\":2.0"));
        assert!(got[1].contains("\"t_ms\":3.0"));
    }

    #[tokio::test]
    async fn subscriber_before_first_record_gets_no_seed() {
        let d = dispatcher();
        let mut rx = d.subscribe("early");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_without_failing_broadcast() {
        let d = dispatcher();
        let rx_dead = d.subscribe("dead");
        let mut rx_live = d.subscribe("live");
        drop(rx_dead);

        d.publish(&record("press-01", 1.0));
        assert_eq!(d.subscriber_count(), 1);
        assert_eq!(drain_data(&mut rx_live).len(), 1);
    }

    #[tokio::test]
    async fn silent_subscriber_is_evicted_on_second_sweep() {
        let d = dispatcher();
        let mut rx = d.subscribe("silent");

        assert_eq!(d.sweep(), 0); // Alive -> Suspect, ping sent
        assert!(matches!(rx.try_recv(), Ok(Frame::Ping)));
        assert_eq!(d.subscriber_count(), 1);

        assert_eq!(d.sweep(), 1); // still Suspect -> evicted
        assert!(matches!(rx.try_recv(), Ok(Frame::Close)));
        assert_eq!(d.subscriber_count(), 0);

        // Evicted subscribers receive no further broadcasts.
        d.publish(&record("press-01", 1.0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pong_between_sweeps_keeps_subscriber_registered() {
        let d = dispatcher();
        let mut rx = d.subscribe("responsive");

        for _ in 0..3 {
            d.sweep();
            assert!(matches!(rx.try_recv(), Ok(Frame::Ping)));
            d.mark_alive("responsive");
        }
        assert_eq!(d.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_terminal_regardless_of_state() {
        let d = dispatcher();
        let _rx = d.subscribe("x");
        d.sweep(); // x is now Suspect
        d.unsubscribe("x");
        assert_eq!(d.subscriber_count(), 0);
        d.unsubscribe("x"); // no-op
    }
}
