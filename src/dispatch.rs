//! Bounded FIFO admission of outbound requests.
//!
//! Waiters are admitted in arrival order through a fair mutex. The head of
//! the line holds that mutex while it waits for a concurrency permit and for
//! the dispatch spacing, so nobody can overtake it.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore},
    time::{sleep_until, Instant},
};

#[derive(Debug)]
pub(crate) struct Dispatcher {
    slots: Arc<Semaphore>,
    gate: Mutex<Option<Instant>>,
    interval: Duration,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    queued: AtomicUsize,
}

/// A dispatched request's concurrency slot. Dropping it frees the slot.
///
/// The permit is `None` only if the semaphore was closed, which the
/// dispatcher never does.
#[derive(Debug)]
pub(crate) struct Slot {
    _permit: Option<OwnedSemaphorePermit>,
    counters: Arc<Counters>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct QueuedGuard<'a>(&'a Counters);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub(crate) fn new(max_concurrent: usize, interval: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            gate: Mutex::new(None),
            interval,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Waits for this request's turn and returns its slot.
    pub(crate) async fn acquire(&self) -> Slot {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedGuard(&self.counters);

        let mut last_dispatch = self.gate.lock().await;
        let permit = Arc::clone(&self.slots).acquire_owned().await.ok();
        if let Some(previous) = *last_dispatch {
            sleep_until(previous + self.interval).await;
        }
        *last_dispatch = Some(Instant::now());
        drop(queued);

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        tracing::debug!(active, "dispatching request");

        Slot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio::time::Instant;

    use super::Dispatcher;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_ceiling() {
        let dispatcher = Arc::new(Dispatcher::new(2, Duration::ZERO));
        let mut tasks = Vec::new();
        for _ in 0..6 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                let _slot = dispatcher.acquire().await;
                assert!(dispatcher.active() <= 2);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }));
        }
        for task in tasks {
            task.await.expect("task must finish");
        }
        assert_eq!(dispatcher.peak(), 2);
        assert_eq!(dispatcher.active(), 0);
        assert_eq!(dispatcher.queued(), 0);
    }

    #[tokio::test]
    async fn slot_holds_a_permit_until_dropped() {
        let dispatcher = Dispatcher::new(1, Duration::ZERO);
        let slot = dispatcher.acquire().await;
        assert!(slot._permit.is_some());
        assert_eq!(dispatcher.slots.available_permits(), 0);
        assert_eq!(dispatcher.active(), 1);

        drop(slot);
        assert_eq!(dispatcher.slots.available_permits(), 1);
        assert_eq!(dispatcher.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_spaced_and_fifo() {
        let dispatcher = Arc::new(Dispatcher::new(4, Duration::from_millis(500)));
        let order = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let mut tasks = Vec::new();
        for id in 0..3 {
            let dispatcher = Arc::clone(&dispatcher);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let _slot = dispatcher.acquire().await;
                order.lock().expect("order lock").push((id, start.elapsed()));
            }));
            // make arrival order deterministic
            tokio::task::yield_now().await;
        }
        for task in tasks {
            task.await.expect("task must finish");
        }

        let order = order.lock().expect("order lock");
        let ids: Vec<_> = order.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(order[1].1 >= Duration::from_millis(500));
        assert!(order[2].1 >= Duration::from_millis(1_000));
    }
}
