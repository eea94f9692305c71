//! Asynchronous delivery of telemetry to subscribers.
//!
//! Producers publish into a bounded queue; one dispatcher thread drains it
//! in batches and hands every item to every subscriber in publish order.
//! The subscriber set is snapshotted per batch, so subscribing or
//! unsubscribing while a batch is being delivered only affects the next
//! batch.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{LinkError, Result};

/// Error type subscribers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber<T> = Arc<dyn Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Receives subscriber failures. Runs on the dispatcher thread.
pub type ErrorSink = Arc<dyn Fn(SubscriptionId, &DeliveryError) + Send + Sync>;

const DISPATCHER_THREAD_NAME: &str = "xbmesh-fanout";

/// What `publish` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait until the dispatcher makes room.
    ///
    /// On a link, the publisher is the link monitor: while it waits, no
    /// command responses are routed either. Subscribers slower than the
    /// queue capacity stall the link; keep them fast or use `DropOldest`.
    #[default]
    Block,
    /// Discard the oldest queued item.
    DropOldest,
}

/// Handle returned by [`FanoutQueue::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscriber that did not accept an item.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber returned an error: {0}")]
    Failed(BoxError),

    #[error("subscriber panicked: {0}")]
    Panicked(String),
}

struct Queue<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_id: AtomicU64,
    error_sink: ErrorSink,
}

/// Bounded publish/subscribe queue with a dedicated dispatcher thread.
pub struct FanoutQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> FanoutQueue<T> {
    /// Create a queue whose subscriber failures are logged.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        Self::with_error_sink(
            capacity,
            policy,
            Arc::new(|id: SubscriptionId, err: &DeliveryError| {
                tracing::warn!(subscription = %id, error = %err, "telemetry subscriber failed");
            }),
        )
    }

    /// Create a queue that reports subscriber failures to `error_sink`.
    pub fn with_error_sink(
        capacity: usize,
        policy: OverflowPolicy,
        error_sink: ErrorSink,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            policy,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            error_sink,
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(DISPATCHER_THREAD_NAME.to_string())
                .spawn(move || dispatch(&shared))
                .map_err(|source| LinkError::Spawn {
                    name: DISPATCHER_THREAD_NAME,
                    source,
                })?
        };

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Enqueue an item for delivery.
    ///
    /// Blocks while the queue is full under [`OverflowPolicy::Block`].
    /// Fails with [`LinkError::Closed`] once the queue is closed.
    pub fn publish(&self, item: T) -> Result<()> {
        let mut queue = lock(&self.shared.queue);
        loop {
            if queue.closed {
                return Err(LinkError::Closed);
            }
            if queue.items.len() < self.shared.capacity {
                break;
            }
            match self.shared.policy {
                OverflowPolicy::Block => {
                    queue = self
                        .shared
                        .not_full
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                OverflowPolicy::DropOldest => {
                    queue.items.pop_front();
                    tracing::warn!(
                        capacity = self.shared.capacity,
                        "telemetry queue full, dropped oldest item"
                    );
                }
            }
        }

        queue.items.push_back(item);
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Register a subscriber. It receives items from the next batch on.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.subscribers).push((id, Arc::new(subscriber)));
        tracing::debug!(subscription = %id, "telemetry subscriber added");
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.shared.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "telemetry subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Items waiting for the dispatcher.
    pub fn len(&self) -> usize {
        lock(&self.shared.queue).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared.queue).closed
    }

    /// Stop accepting items. The dispatcher still delivers what is queued,
    /// then exits. Never blocks, so it is safe from any thread.
    pub fn close(&self) {
        {
            let mut queue = lock(&self.shared.queue);
            queue.closed = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
    }

    /// Wait for the dispatcher to exit. Returns immediately when called
    /// from a subscriber, or when the dispatcher was already joined.
    pub fn join(&self) {
        let mut dispatcher = lock(&self.dispatcher);
        let on_dispatcher = dispatcher
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id());
        if on_dispatcher {
            return;
        }
        if let Some(handle) = dispatcher.take() {
            drop(dispatcher);
            if handle.join().is_err() {
                tracing::error!("telemetry dispatcher thread panicked");
            }
        }
    }

    /// [`close`](Self::close), then [`join`](Self::join).
    pub fn shutdown(&self) {
        self.close();
        self.join();
    }
}

impl<T: Send + 'static> Drop for FanoutQueue<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch<T>(shared: &Shared<T>) {
    tracing::debug!("telemetry dispatcher started");
    loop {
        let (batch, subscribers) = {
            let mut queue = lock(&shared.queue);
            while queue.items.is_empty() && !queue.closed {
                queue = shared
                    .not_empty
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if queue.items.is_empty() {
                break;
            }
            let subscribers = lock(&shared.subscribers).clone();
            (std::mem::take(&mut queue.items), subscribers)
        };
        shared.not_full.notify_all();

        tracing::trace!(
            items = batch.len(),
            subscribers = subscribers.len(),
            "delivering telemetry batch"
        );
        for item in &batch {
            for (id, subscriber) in &subscribers {
                deliver(shared, *id, subscriber, item);
            }
        }
    }
    tracing::debug!("telemetry dispatcher stopped");
}

fn deliver<T>(shared: &Shared<T>, id: SubscriptionId, subscriber: &Subscriber<T>, item: &T) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber(item)));
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => DeliveryError::Failed(err),
        Err(payload) => DeliveryError::Panicked(panic_message(payload.as_ref())),
    };

    let sink = &shared.error_sink;
    if panic::catch_unwind(AssertUnwindSafe(|| sink(id, &failure))).is_err() {
        tracing::error!(subscription = %id, "telemetry error sink panicked");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn collector() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&u32) -> std::result::Result<(), BoxError>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |item: &u32| {
            sink.lock().unwrap().push(*item);
            Ok(())
        })
    }

    /// Subscriber that blocks on item 0 until released, then forwards every
    /// item it sees.
    fn gate() -> (
        mpsc::Receiver<()>,
        mpsc::Sender<()>,
        mpsc::Receiver<u32>,
        impl Fn(&u32) -> std::result::Result<(), BoxError>,
    ) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (seen_tx, seen_rx) = mpsc::channel();
        let release_rx = Mutex::new(release_rx);

        let subscriber = move |item: &u32| {
            if *item == 0 {
                entered_tx.send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
            seen_tx.send(*item).unwrap();
            Ok(())
        };
        (entered_rx, release_tx, seen_rx, subscriber)
    }

    #[test]
    fn every_subscriber_sees_every_item_in_order() {
        let queue = FanoutQueue::new(8, OverflowPolicy::Block).unwrap();
        let collected: Vec<_> = (0..3)
            .map(|_| {
                let (seen, subscriber) = collector();
                queue.subscribe(subscriber);
                seen
            })
            .collect();

        for item in 0..50 {
            queue.publish(item).unwrap();
        }
        queue.shutdown();

        let expected: Vec<u32> = (0..50).collect();
        for seen in collected {
            assert_eq!(*seen.lock().unwrap(), expected);
        }
    }

    #[test]
    fn subscriber_changes_apply_to_next_batch() {
        let queue = FanoutQueue::new(8, OverflowPolicy::Block).unwrap();
        let (entered, release, _gate_seen, gate) = gate();
        queue.subscribe(gate);
        let (early_seen, early) = collector();
        let early_id = queue.subscribe(early);

        queue.publish(0).unwrap();
        entered.recv_timeout(WAIT).unwrap();

        // Batch [0] is in flight; [1, 2, 3] will be the next batch.
        for item in 1..=3 {
            queue.publish(item).unwrap();
        }
        assert!(queue.unsubscribe(early_id));
        let (late_tx, late_rx) = mpsc::channel();
        queue.subscribe(move |item: &u32| {
            late_tx.send(*item).unwrap();
            Ok(())
        });
        release.send(()).unwrap();

        let late: Vec<u32> = (0..3).map(|_| late_rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(late, vec![1, 2, 3]);
        assert_eq!(*early_seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn failing_and_panicking_subscribers_go_to_sink() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink: ErrorSink = {
            let failures = Arc::clone(&failures);
            Arc::new(move |id: SubscriptionId, err: &DeliveryError| {
                failures.lock().unwrap().push((id, err.to_string()));
            })
        };
        let queue = FanoutQueue::with_error_sink(4, OverflowPolicy::Block, sink).unwrap();

        let failing = queue.subscribe(|item: &u32| {
            if *item == 1 {
                return Err("bad item".into());
            }
            Ok(())
        });
        let panicking = queue.subscribe(|item: &u32| {
            if *item == 2 {
                panic!("boom");
            }
            Ok(())
        });
        let (seen, healthy) = collector();
        queue.subscribe(healthy);

        for item in 0..4 {
            queue.publish(item).unwrap();
        }
        queue.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, failing);
        assert!(failures[0].1.contains("bad item"));
        assert_eq!(failures[1].0, panicking);
        assert!(failures[1].1.contains("boom"));
    }

    #[test]
    fn block_policy_waits_for_room() {
        let queue = Arc::new(FanoutQueue::new(1, OverflowPolicy::Block).unwrap());
        let (entered, release, gate_seen, gate) = gate();
        queue.subscribe(gate);

        queue.publish(0).unwrap();
        entered.recv_timeout(WAIT).unwrap();
        queue.publish(1).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.publish(2).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        release.send(()).unwrap();
        done_rx.recv_timeout(WAIT).unwrap();
        producer.join().unwrap();

        let seen: Vec<u32> = (0..3).map(|_| gate_seen.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn drop_oldest_policy_discards_when_full() {
        let queue = FanoutQueue::new(2, OverflowPolicy::DropOldest).unwrap();
        let (entered, release, gate_seen, gate) = gate();
        queue.subscribe(gate);

        queue.publish(0).unwrap();
        entered.recv_timeout(WAIT).unwrap();
        for item in 1..=3 {
            queue.publish(item).unwrap();
        }
        assert_eq!(queue.len(), 2);
        release.send(()).unwrap();
        queue.shutdown();

        let seen: Vec<u32> = gate_seen.try_iter().collect();
        assert_eq!(seen, vec![0, 2, 3]);
    }

    #[test]
    fn close_drains_then_rejects_publish() {
        let queue = FanoutQueue::new(4, OverflowPolicy::Block).unwrap();
        let (seen, subscriber) = collector();
        queue.subscribe(subscriber);

        queue.publish(7).unwrap();
        queue.close();
        queue.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert!(queue.is_closed());
        assert!(matches!(queue.publish(8), Err(LinkError::Closed)));
    }

    #[test]
    fn subscriber_can_shut_down_its_own_queue() {
        let queue = Arc::new(FanoutQueue::new(4, OverflowPolicy::Block).unwrap());
        let (done_tx, done_rx) = mpsc::channel();
        {
            let handle = Arc::downgrade(&queue);
            queue.subscribe(move |_: &u32| {
                if let Some(queue) = handle.upgrade() {
                    queue.shutdown();
                }
                done_tx.send(()).unwrap();
                Ok(())
            });
        }

        queue.publish(1).unwrap();
        done_rx.recv_timeout(WAIT).unwrap();
        assert!(queue.is_closed());
        queue.join();
    }

    #[test]
    fn unsubscribe_unknown_id() {
        let queue = FanoutQueue::<u32>::new(1, OverflowPolicy::Block).unwrap();
        let id = queue.subscribe(|_| Ok(()));
        assert_eq!(queue.subscriber_count(), 1);
        assert!(queue.unsubscribe(id));
        assert!(!queue.unsubscribe(id));
        assert_eq!(queue.subscriber_count(), 0);
    }
}
