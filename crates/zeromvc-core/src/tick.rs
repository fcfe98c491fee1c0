//! Tick-batched delivery for ticked models.
//!
//! Writes to a ticked model do not notify subscribers right away. The write
//! is recorded in the model's pending map (one entry per field, latest value
//! wins) and the model is pushed onto the context's [`TickQueue`]. A
//! [`TickQueue::flush`], normally driven by a [`Ticker`] every
//! [`Config::tick_interval`](crate::Config::tick_interval), delivers
//! everything that accumulated since the previous flush.

use crate::lock;
use crate::model::Subscriber;
use futures::StreamExt;
use indexmap::IndexMap;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

/// A model with pending tick deliveries.
pub(crate) trait Flush: Send + Sync {
    /// Swap the pending map out for an empty one.
    fn take_pending(&self) -> IndexMap<String, Vec<Value>>;

    fn subscribers(&self) -> Vec<Subscriber>;

    fn model_name(&self) -> &'static str;
}

/// The dirty sequence: models with undelivered changes.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct TickQueue {
    dirty: Arc<Mutex<Vec<Arc<dyn Flush>>>>,
}

impl TickQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicates are allowed; a flush drains each model once.
    pub(crate) fn push(&self, model: Arc<dyn Flush>) {
        lock(&self.dirty).push(model);
    }

    /// Number of queued entries, duplicates included.
    pub fn len(&self) -> usize {
        lock(&self.dirty).len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        lock(&self.dirty).is_empty()
    }

    /// Deliver every pending change and return how many subscriber calls
    /// were made.
    ///
    /// The queue is swapped out before delivery starts, so writes made by
    /// subscribers during this flush are queued for the next one. A
    /// subscriber that panics is logged and skipped; the rest of the flush
    /// still runs.
    pub fn flush(&self) -> usize {
        let dirty = std::mem::take(&mut *lock(&self.dirty));
        let mut delivered = 0;
        for model in dirty {
            let pending = model.take_pending();
            if pending.is_empty() {
                continue;
            }
            let subscribers = model.subscribers();
            for (field, args) in &pending {
                for subscriber in &subscribers {
                    let call = catch_unwind(AssertUnwindSafe(|| subscriber.call(field, args)));
                    if call.is_err() {
                        tracing::error!(
                            model = model.model_name(),
                            field = %field,
                            "subscriber panicked during tick flush"
                        );
                    }
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Forget every queued model without delivering.
    pub(crate) fn clear(&self) {
        lock(&self.dirty).clear();
    }
}

/// A running tick loop. Stops when dropped.
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn a task flushing `queue` every `interval`.
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    /// Missed ticks are skipped rather than bursted.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(queue: TickQueue, interval: Duration) -> Self {
        let mut interval = tokio::time::interval(interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        let handle = tokio::spawn(async move {
            while ticks.next().await.is_some() {
                queue.flush();
            }
        });
        Self { handle }
    }

    /// Whether the loop is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop.
    pub fn stop(self) {}
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelRef};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Default, Serialize, Deserialize)]
    struct Position {
        x: i64,
    }

    impl Model for Position {
        const TICKED: bool = true;
    }

    type Log = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    fn watched() -> (ModelRef<Position>, Log) {
        let model = ModelRef::detached(Position::default());
        let log: Log = Arc::default();
        let sink = log.clone();
        model.subscribe(Subscriber::new(move |field, args| {
            sink.lock().unwrap().push((field.to_owned(), args.to_vec()));
        }));
        (model, log)
    }

    #[test]
    fn flush_coalesces_per_field() {
        let queue = TickQueue::new();
        let (model, log) = watched();
        for x in 1..=3 {
            model.mark_pending("x", vec![json!(x)]);
            queue.push(model.as_flush());
        }
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.flush(), 1);
        assert_eq!(log.lock().unwrap().as_slice(), &[("x".to_owned(), vec![json!(3)])]);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_with_nothing_pending_delivers_nothing() {
        let queue = TickQueue::new();
        let (model, log) = watched();
        queue.push(model.as_flush());
        assert_eq!(queue.flush(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn writes_during_flush_wait_for_next_flush() {
        let queue = TickQueue::new();
        let model = ModelRef::detached(Position::default());
        let count = Arc::new(Mutex::new(0));

        let requeue = queue.clone();
        let again = model.clone();
        let seen = count.clone();
        model.subscribe(Subscriber::new(move |_, _| {
            let mut seen = seen.lock().unwrap();
            *seen += 1;
            if *seen == 1 {
                again.mark_pending("x", vec![json!(2)]);
                requeue.push(again.as_flush());
            }
        }));

        model.mark_pending("x", vec![json!(1)]);
        queue.push(model.as_flush());

        assert_eq!(queue.flush(), 1);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.flush(), 1);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_flush() {
        let queue = TickQueue::new();
        let (model, log) = watched();
        model.subscribe(Subscriber::new(|_, _| panic!("boom")));

        model.mark_pending("x", vec![json!(1)]);
        queue.push(model.as_flush());
        assert_eq!(queue.flush(), 2);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn clear_drops_queue() {
        let queue = TickQueue::new();
        let (model, _) = watched();
        queue.push(model.as_flush());
        queue.clear();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn ticker_flushes_on_interval() {
        let queue = TickQueue::new();
        let (model, log) = watched();
        let ticker = Ticker::spawn(queue.clone(), Duration::from_millis(5));

        model.mark_pending("x", vec![json!(7)]);
        queue.push(model.as_flush());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(log.lock().unwrap().as_slice(), &[("x".to_owned(), vec![json!(7)])]);
        assert!(ticker.is_running());
        ticker.stop();
    }

    #[tokio::test]
    async fn dropped_ticker_stops_flushing() {
        let queue = TickQueue::new();
        let (model, log) = watched();
        drop(Ticker::spawn(queue.clone(), Duration::from_millis(5)));
        tokio::task::yield_now().await;

        model.mark_pending("x", vec![json!(1)]);
        queue.push(model.as_flush());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.len(), 1);
    }
}
