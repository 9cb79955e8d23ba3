//! Thread-safe FIFO used for both directions of a session.
//!
//! A [`Channel`] owns both halves of an unbounded `crossbeam-channel`, so any
//! clone can push and any clone can pop: producers and consumers are fully
//! decoupled and any number of either is fine. Because the channel keeps its
//! own sender alive, a receive can only ever end by data or by timeout, never
//! by disconnection.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Default bounded wait of [`Channel::pop`] callers (the session poll tick).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Multi-producer multi-consumer FIFO with a bounded-wait pop.
///
/// Items pushed by one thread are popped in push order; items from different
/// producers interleave arbitrarily. Every item is delivered exactly once.
#[derive(Debug)]
pub struct Channel<T = String> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Enqueue without blocking and wake one waiting popper.
    #[inline]
    pub fn push(&self, item: T) {
        // Cannot fail: `self.rx` keeps the channel connected.
        let _ = self.tx.send(item);
    }

    /// Take the front item if there is one.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Take the front item, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` once the full timeout elapsed with the queue empty.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Racy snapshot; only meaningful for diagnostics.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Racy snapshot; only meaningful for diagnostics.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Pop everything currently queued without waiting.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), rx: self.rx.clone() }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn try_pop_on_empty_returns_none() {
        let ch: Channel = Channel::new();
        assert!(ch.is_empty());
        assert_eq!(ch.try_pop(), None);
    }

    #[test]
    fn fifo_single_producer() {
        let ch = Channel::new();
        ch.push("a".to_string());
        ch.push("b".to_string());
        ch.push("c".to_string());
        assert_eq!(ch.len(), 3);
        assert_eq!(ch.try_pop().as_deref(), Some("a"));
        assert_eq!(ch.pop(DEFAULT_POLL_TIMEOUT).as_deref(), Some("b"));
        assert_eq!(ch.try_pop().as_deref(), Some("c"));
        assert!(ch.is_empty());
    }

    #[test]
    fn pop_times_out_after_full_wait() {
        let ch: Channel = Channel::new();
        let timeout = Duration::from_millis(50);
        let t0 = Instant::now();
        assert_eq!(ch.pop(timeout), None);
        assert!(t0.elapsed() >= timeout);
    }

    #[test]
    fn pop_wakes_on_push_from_other_thread() {
        let ch: Channel = Channel::new();
        let producer = ch.clone();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push("late".into());
        });
        assert_eq!(ch.pop(Duration::from_secs(5)).as_deref(), Some("late"));
        h.join().unwrap();
    }

    #[test]
    fn many_producers_many_consumers_exactly_once() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;
        let ch: Channel<(usize, usize)> = Channel::new();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let ch = ch.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        ch.push((p, i));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let ch = ch.clone();
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(item) = ch.pop(Duration::from_millis(200)) {
                        got.push(item);
                    }
                    got
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        let per_consumer: Vec<Vec<(usize, usize)>> =
            consumers.into_iter().map(|c| c.join().unwrap()).collect();

        // per-producer order holds inside each consumer's view
        for got in &per_consumer {
            let mut last = vec![None::<usize>; PRODUCERS];
            for &(p, i) in got {
                if let Some(prev) = last[p] {
                    assert!(i > prev, "producer {p} reordered: {prev} then {i}");
                }
                last[p] = Some(i);
            }
        }

        let all: Vec<_> = per_consumer.into_iter().flatten().collect();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = all.into_iter().collect();
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn drain_takes_everything_queued() {
        let ch = Channel::new();
        for i in 0..5 {
            ch.push(i);
        }
        assert_eq!(ch.drain(), vec![0, 1, 2, 3, 4]);
        assert!(ch.is_empty());
    }
}
