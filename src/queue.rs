//! A bounded-in-spirit (actually unbounded), FIFO, multi-producer/
//! multi-consumer blocking container used as both the decode job queue and
//! the decode result queue.
//!
//! This is the Rust generalization of the original C++ `threadsafe_queue` /
//! `Threadpool::jobs` + `Threadpool::results`: a `VecDeque` behind a mutex
//! and condvar, with the cancellation, sorting and inspection operations the
//! Streamer Controller needs that a channel (crossbeam or std::mpsc) cannot
//! provide — you cannot remove an arbitrary element from a channel, nor sort
//! its pending contents.
//!
//! Every method takes the lock for the duration of its critical section and
//! releases it on every exit path (Rust's `MutexGuard` drop makes "releases
//! on all exits, including panics" automatic, unlike the C++ original which
//! had to rely on RAII lock guards manually).

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Result of [`BlockingQueue::pop_or_stop`].
#[derive(Debug)]
pub enum PopOutcome<T> {
    Item(T),
    Stopped,
}

/// Which end of the queue to start iterating from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterDirection {
    FrontToBack,
    BackToFront,
}

struct Inner<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// A FIFO queue shared across worker and render threads.
///
/// `push`/`pop`/`try_pop` preserve arrival order. `cancel` and `sort` are the
/// only operations that reorder or remove elements out of FIFO order, and
/// both are only ever called from the render thread in `queries_end`.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Append to the tail and wake one waiter.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Block until non-empty, then return the head. Never observes `stop_all`
    /// — callers that must react to shutdown should use [`Self::pop_or_stop`].
    pub fn pop(&self) -> T {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return item;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Block until non-empty or [`Self::stop_all`] has been called and the
    /// queue has drained.
    pub fn pop_or_stop(&self) -> PopOutcome<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return PopOutcome::Item(item);
            }
            if inner.stopped {
                return PopOutcome::Stopped;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Set the stop flag and wake every waiter. Idempotent.
    pub fn stop_all(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        self.not_empty.notify_all();
    }

    /// Snapshot-style iteration under the lock. `callback` must not call back
    /// into this queue (it's already locked).
    pub fn iterate(&self, direction: IterDirection, mut callback: impl FnMut(&T)) {
        let inner = self.inner.lock();
        match direction {
            IterDirection::FrontToBack => inner.items.iter().for_each(&mut callback),
            IterDirection::BackToFront => inner.items.iter().rev().for_each(&mut callback),
        }
    }

    /// Remove every element for which `predicate` returns `true`.
    pub fn cancel(&self, mut predicate: impl FnMut(&T) -> bool) {
        let mut inner = self.inner.lock();
        inner.items.retain(|item| !predicate(item));
    }

    /// Remove every element, discarding them.
    pub fn cancel_all(&self) {
        self.inner.lock().items.clear();
    }

    /// Remove every element, invoking `callback` on each before it is
    /// dropped (e.g. to clear a `job_in_flight` flag).
    pub fn cancel_all_and_call(&self, mut callback: impl FnMut(T)) {
        let drained: Vec<T> = {
            let mut inner = self.inner.lock();
            inner.items.drain(..).collect()
        };
        for item in drained {
            callback(item);
        }
    }

    /// Stable-sort the queue's current contents by `compare`.
    pub fn sort(&self, mut compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        let mut inner = self.inner.lock();
        // `make_contiguous` + slice sort keeps this a stable sort, matching
        // `std::stable_sort` in the original.
        inner.items.make_contiguous().sort_by(&mut compare);
    }

    /// Number of items currently queued. Racy by nature; useful for stats
    /// only.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_preserved() {
        let q = BlockingQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn pop_blocks_until_pushed() {
        let q = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn pop_or_stop_returns_stopped_once_drained() {
        let q: BlockingQueue<i32> = BlockingQueue::new();
        q.push(1);
        q.stop_all();
        // Drains remaining item first...
        match q.pop_or_stop() {
            PopOutcome::Item(1) => {}
            other => panic!("expected Item(1), got {other:?}"),
        }
        // ...then reports Stopped.
        match q.pop_or_stop() {
            PopOutcome::Stopped => {}
            other => panic!("expected Stopped, got {other:?}"),
        }
    }

    #[test]
    fn cancel_removes_matching_and_preserves_order_of_rest() {
        let q = BlockingQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        q.cancel(|v| v % 2 == 0);
        let mut remaining = Vec::new();
        q.iterate(IterDirection::FrontToBack, |v| remaining.push(*v));
        assert_eq!(remaining, vec![1, 3]);
    }

    #[test]
    fn cancel_all_and_call_invokes_callback_per_item() {
        let q = BlockingQueue::new();
        q.push("a");
        q.push("b");
        let mut seen = Vec::new();
        q.cancel_all_and_call(|v| seen.push(v));
        assert_eq!(seen, vec!["a", "b"]);
        assert!(q.is_empty());
    }

    #[test]
    fn sort_is_stable() {
        let q = BlockingQueue::new();
        // Two equal-priority items; insertion order must survive the sort.
        q.push(("a", 1));
        q.push(("b", 1));
        q.push(("c", 0));
        q.sort(|l, r| l.1.cmp(&r.1));
        let mut order = Vec::new();
        q.iterate(IterDirection::FrontToBack, |v| order.push(v.0));
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn iterate_back_to_front() {
        let q = BlockingQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        let mut order = Vec::new();
        q.iterate(IterDirection::BackToFront, |v| order.push(*v));
        assert_eq!(order, vec![3, 2, 1]);
    }
}
