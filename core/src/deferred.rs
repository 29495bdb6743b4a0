//! The two deferred-work paths named in §4.3: a per-DM application-removal
//! queue and a per-DM flow-removal queue. Both are a spinlock-guarded
//! `VecDeque` drained in process context — the application path exists
//! specifically because taking the per-IPCP mutex is not allowed from
//! soft-IRQ, so the last-reference drop on the receive path only enqueues.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use ripc_sync::spin_lock::SpinLock;

pub struct DeferredQueue<T> {
    items: SpinLock<VecDeque<T>>,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(VecDeque::new()),
        }
    }

    /// Safe to call from soft-IRQ context: only a spinlock is taken.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    pub fn pending(&self) -> usize {
        self.items.lock().len()
    }

    /// Drains the queue and invokes `f` on each item in process context.
    /// The embedding kernel module is responsible for scheduling this call
    /// on a work queue; this type only guarantees the drain is atomic with
    /// respect to concurrent `push`.
    pub fn run_pending<F: FnMut(T)>(&self, mut f: F) {
        let drained: Vec<T> = self.items.lock().drain(..).collect();
        for item in drained {
            f(item);
        }
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_pending_drains_in_push_order() {
        let q = DeferredQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        let mut seen = Vec::new();
        q.run_pending(|item| seen.push(item));
        assert_eq!(seen, alloc::vec![1, 2, 3]);
        assert_eq!(q.pending(), 0);
    }
}
