use alloc::collections::VecDeque;
use core::fmt::Display;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::spin_lock::SpinLock;

#[derive(Debug, PartialEq, Eq)]
pub enum Status {
    /// Queue has been run down; no more entries will ever arrive.
    Abandoned,
    /// Caller's wait budget elapsed with nothing to pop.
    Timeout,
    /// Queue is empty right now (non-blocking `pop`).
    Empty,
}

impl Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Status::Abandoned => write!(f, "Abandoned"),
            Status::Timeout => write!(f, "Timeout"),
            Status::Empty => write!(f, "Empty"),
        }
    }
}

/// Generic FIFO with kernel-queue semantics: a blocking `wait_and_pop`, a
/// non-blocking `pop`, and a `rundown` that drains and permanently disables
/// the queue. The teacher's `IOQueue<T>` wraps `KeInitializeQueue` /
/// `KeInsertQueue` / `KeRemoveQueue` / `KeRundownQueue` directly; this crate
/// has no kernel thread scheduler to hand those calls to, so blocking is
/// expressed as a caller-supplied `park` hook invoked between poll attempts
/// — the embedding module plugs in a real wait primitive (a futex, a wait
/// queue, a condvar) there.
pub struct Queue<T> {
    items: SpinLock<VecDeque<T>>,
    abandoned: AtomicBool,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(VecDeque::new()),
            abandoned: AtomicBool::new(false),
        }
    }

    /// Pushes an entry. Fails only once the queue has been run down.
    pub fn push(&self, entry: T) -> Result<(), Status> {
        if self.abandoned.load(Ordering::Acquire) {
            return Err(Status::Abandoned);
        }
        self.items.lock().push_back(entry);
        Ok(())
    }

    /// Pops without waiting.
    pub fn pop(&self) -> Result<T, Status> {
        if let Some(v) = self.items.lock().pop_front() {
            return Ok(v);
        }
        if self.abandoned.load(Ordering::Acquire) {
            return Err(Status::Abandoned);
        }
        Err(Status::Empty)
    }

    /// Waits until an entry is available, the queue is run down, or
    /// `max_iterations` polls of `park` have elapsed without one.
    pub fn wait_and_pop(&self, max_iterations: u32, mut park: impl FnMut()) -> Result<T, Status> {
        let mut iterations = 0u32;
        loop {
            match self.pop() {
                Ok(v) => return Ok(v),
                Err(Status::Abandoned) => return Err(Status::Abandoned),
                Err(_) => {}
            }
            if iterations >= max_iterations {
                return Err(Status::Timeout);
            }
            iterations += 1;
            park();
        }
    }

    /// Removes every queued entry and permanently disables further pushes.
    pub fn rundown(&self) -> alloc::vec::Vec<T> {
        self.abandoned.store(true, Ordering::Release);
        let mut guard = self.items.lock();
        guard.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo_order() {
        let q = Queue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.pop(), Ok(1));
        assert_eq!(q.pop(), Ok(2));
        assert_eq!(q.pop(), Err(Status::Empty));
    }

    #[test]
    fn rundown_drains_and_blocks_future_pushes() {
        let q = Queue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        let drained = q.rundown();
        assert_eq!(drained, alloc::vec![1, 2]);
        assert_eq!(q.push(3), Err(Status::Abandoned));
        assert_eq!(q.pop(), Err(Status::Abandoned));
    }

    #[test]
    fn wait_and_pop_times_out() {
        let q: Queue<i32> = Queue::new();
        let mut parks = 0;
        let result = q.wait_and_pop(3, || parks += 1);
        assert_eq!(result, Err(Status::Timeout));
        assert_eq!(parks, 3);
    }
}
