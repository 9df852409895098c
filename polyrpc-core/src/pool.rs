//! Lock-free object pool (§5): a bounded MPMC queue of reusable values.
//! Used for handler contexts, codec message instances, and frame byte
//! buffers. `crossbeam-queue`'s `ArrayQueue` is the ecosystem's standard
//! choice for exactly this "pool of short-lived pooled objects" shape; the
//! teacher has no pool crate of its own since it is a client.

use crossbeam_queue::ArrayQueue;

pub struct Pool<T> {
    queue: ArrayQueue<T>,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Pool {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Take a pooled value if one is available. Returns `None` on an empty
    /// pool; the caller is expected to allocate fresh in that case.
    pub fn take(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Return a value to the pool. Silently drops it if the pool is full.
    pub fn put(&self, value: T) {
        let _ = self.queue.push(value);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
