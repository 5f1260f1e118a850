use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Bounded blocking FIFO with close broadcast.
///
/// `put` blocks while the queue is full; `take` blocks while it is empty.
/// Closing wakes every waiter, but items already queued are still drained
/// before `take` reports closure.
pub struct Chan<T> {
    inner: Mutex<Inner<T>>,
    take_cv: Condvar,
    put_cv: Condvar,
    capacity: usize,
}

struct Inner<T> {
    queue: VecDeque<T>,
    closed: bool,
}

impl<T> Chan<T> {
    pub fn new(capacity: usize) -> Chan<T> {
        assert!(capacity > 0, "channel capacity must be positive");
        Chan {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            take_cv: Condvar::new(),
            put_cv: Condvar::new(),
            capacity,
        }
    }

    /// Queue an item, blocking while the channel is full.
    /// Returns false when the channel is closed.
    pub fn put(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.len() >= self.capacity && !inner.closed {
            inner = self.put_cv.wait(inner).unwrap();
        }
        if inner.closed {
            return false;
        }
        inner.queue.push_back(item);
        self.take_cv.notify_one();
        true
    }

    /// Dequeue the next item, blocking while the channel is empty.
    /// Returns `None` only once the channel is closed and drained.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                self.put_cv.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self.take_cv.wait(inner).unwrap();
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.take_cv.notify_all();
        self.put_cv.notify_all();
    }
}
