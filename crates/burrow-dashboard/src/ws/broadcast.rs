//! Fan-out of pre-serialized events to every connected browser.
//!
//! Each subscriber owns a bounded queue. `publish` snapshots the subscriber
//! set under the lock and sends with the lock released, so a stalled browser
//! can never block the publisher or other registrations. A full queue drops
//! the event for that subscriber only.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

/// One immutable, pre-serialized message. Cloning shares the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event(Bytes);

impl Event {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<&'static str> for Event {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Event {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Event {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

/// Opaque subscriber handle. Never reused within one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Registry {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Event>>,
    closed: bool,
}

struct Shared {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    buffer: usize,
}

/// The subscriber set plus the publish primitive. Cloneable; store in AppState.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
}

impl Hub {
    /// `buffer` is the per-subscriber queue capacity (minimum 1).
    pub fn new(buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    subscribers: HashMap::new(),
                    closed: false,
                }),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a new subscriber. Only events published after this returns are
    /// delivered to it. On a closed hub the subscription is already at
    /// end-of-stream.
    pub fn register(&self) -> Subscription {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.shared.buffer);

        let active = {
            let mut registry = self.registry();
            if !registry.closed {
                registry.subscribers.insert(id, tx);
            }
            registry.subscribers.len()
        };
        debug!(subscriber = %id, active, "subscriber registered");

        Subscription {
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Remove a subscriber and close its queue. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        let (removed, active) = {
            let mut registry = self.registry();
            let removed = registry.subscribers.remove(&id);
            (removed, registry.subscribers.len())
        };
        if removed.is_some() {
            debug!(subscriber = %id, active, "subscriber unregistered");
        }
    }

    /// Deliver `event` to every subscriber registered at the time of the call.
    pub fn publish(&self, event: Event) {
        let targets: Vec<(SubscriberId, mpsc::Sender<Event>)> = self
            .registry()
            .subscribers
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(subscriber = %id, "subscriber queue full, event dropped");
                }
                // Receiver is gone; its Subscription drop is unregistering it.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Close every subscriber queue and refuse further registrations.
    /// Gateways see end-of-stream and unregister on their own.
    pub fn close(&self) {
        let drained = {
            let mut registry = self.registry();
            registry.closed = true;
            std::mem::take(&mut registry.subscribers)
        };
        if !drained.is_empty() {
            debug!(closed = drained.len(), "hub closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Events dropped across all subscribers because their queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of one subscriber. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    hub: Hub,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the subscriber is unregistered or the hub
    /// is closed and the queue has drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain(sub: &mut Subscription) -> Vec<Event> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    fn value(event: &Event) -> u64 {
        std::str::from_utf8(event.as_bytes()).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn unregistered_subscriber_keeps_only_earlier_events() {
        let hub = Hub::new(16);
        let mut s1 = hub.register();
        let mut s2 = hub.register();

        hub.publish(Event::from("x"));
        hub.unregister(s1.id());
        hub.publish(Event::from("y"));

        assert_eq!(s1.recv().await, Some(Event::from("x")));
        assert_eq!(s1.recv().await, None);
        assert_eq!(drain(&mut s2), vec![Event::from("x"), Event::from("y")]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = Hub::new(16);
        hub.publish(Event::from("z"));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.dropped_events(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_backfill() {
        let hub = Hub::new(16);
        let mut early = hub.register();
        hub.publish(Event::from("a"));
        let mut late = hub.register();
        hub.publish(Event::from("b"));

        assert_eq!(drain(&mut early), vec![Event::from("a"), Event::from("b")]);
        assert_eq!(drain(&mut late), vec![Event::from("b")]);
    }

    #[tokio::test]
    async fn double_and_unknown_unregister_are_harmless() {
        let hub = Hub::new(16);
        let mut keep = hub.register();
        let gone = hub.register();
        let gone_id = gone.id();

        hub.unregister(gone_id);
        hub.unregister(gone_id);
        drop(gone); // Drop unregisters a third time
        hub.unregister(SubscriberId(9_999));

        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(Event::from("still here"));
        assert_eq!(keep.try_recv(), Some(Event::from("still here")));
    }

    #[tokio::test]
    async fn drop_unregisters() {
        let hub = Hub::new(16);
        let sub = hub.register();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let hub = Hub::new(1);
        let first = hub.register().id();
        let second = hub.register().id();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn per_subscriber_order_is_preserved() {
        let hub = Hub::new(1024);
        let mut sub = hub.register();
        for i in 0..500u32 {
            hub.publish(Event::from(i.to_string()));
        }
        let got: Vec<u64> = drain(&mut sub).iter().map(value).collect();
        assert_eq!(got, (0..500u64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn full_queue_drops_newest_for_that_subscriber_only() {
        let hub = Hub::new(2);
        let mut slow = hub.register();
        let mut fast = hub.register();

        for msg in ["1", "2", "3"] {
            hub.publish(Event::from(msg));
            // fast keeps up
            assert_eq!(fast.try_recv(), Some(Event::from(msg)));
        }

        assert_eq!(drain(&mut slow), vec![Event::from("1"), Event::from("2")]);
        assert_eq!(hub.dropped_events(), 1);
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_others() {
        let hub = Hub::new(4);
        let _stalled = hub.register(); // never drained
        let mut live: Vec<Subscription> = (0..8).map(|_| hub.register()).collect();
        let mut received = vec![0usize; live.len()];

        tokio::time::timeout(Duration::from_secs(5), async {
            for i in 0..100u32 {
                hub.publish(Event::from(i.to_string()));
                for (count, sub) in received.iter_mut().zip(live.iter_mut()) {
                    if sub.recv().await.is_some() {
                        *count += 1;
                    }
                }
            }
        })
        .await
        .expect("publisher stalled behind a full subscriber");

        assert!(received.iter().all(|&n| n == 100));
        assert_eq!(hub.dropped_events(), 96);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn churn_across_threads_keeps_order_and_skips_history() {
        const EVENTS: u64 = 50_000;
        let hub = Hub::new(64);
        // Set to `i` just before `i` is published, so everything below the
        // value read before `register` was fully published beforehand.
        let started = Arc::new(AtomicU64::new(0));

        let mut steady = hub.register();
        let steady_task = tokio::spawn(async move {
            let mut last = 0;
            while let Some(event) = steady.recv().await {
                let v = value(&event);
                assert!(v > last, "{v} arrived after {last}");
                last = v;
            }
        });

        let publisher = {
            let hub = hub.clone();
            let started = Arc::clone(&started);
            tokio::task::spawn_blocking(move || {
                for i in 1..=EVENTS {
                    started.store(i, Ordering::SeqCst);
                    hub.publish(Event::from(i.to_string()));
                }
            })
        };

        let churn: Vec<_> = (0..16)
            .map(|_| {
                let hub = hub.clone();
                let started = Arc::clone(&started);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let floor = started.load(Ordering::SeqCst);
                        let mut sub = hub.register();
                        tokio::task::yield_now().await;
                        let mut last = 0;
                        while let Some(event) = sub.try_recv() {
                            let v = value(&event);
                            assert!(v >= floor, "{v} was published before registering at {floor}");
                            assert!(v > last, "{v} arrived after {last}");
                            last = v;
                        }
                    }
                })
            })
            .collect();

        publisher.await.unwrap();
        for task in churn {
            task.await.unwrap();
        }
        hub.close();
        steady_task.await.unwrap();

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_ends_every_subscription() {
        let hub = Hub::new(16);
        let mut a = hub.register();
        let mut b = hub.register();
        hub.publish(Event::from("last"));
        hub.close();

        assert_eq!(a.recv().await, Some(Event::from("last")));
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, Some(Event::from("last")));
        assert_eq!(b.recv().await, None);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn register_after_close_is_already_ended() {
        let hub = Hub::new(16);
        hub.close();
        hub.close();
        let mut sub = hub.register();
        hub.publish(Event::from("ignored"));

        assert!(hub.is_closed());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(sub.recv().await, None);
    }
}
