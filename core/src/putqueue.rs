//! The sorted flow put-queue (§3, §4.3, §8): flows whose last reference
//! dropped while ALLOCATED with non-empty CWQ/RTXQ are granted a grace
//! period before their destructor actually runs. Sorted by `expires`
//! ascending, `uid` breaking ties, exactly the ordering spec §8 requires of
//! the DM's flow-put timer.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use ripc_sync::spin_lock::SpinLock;

pub struct PutQueue<T> {
    entries: SpinLock<BTreeMap<(u64, u64), T>>,
}

impl<T> PutQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, expires: u64, uid: u64, value: T) {
        self.entries.lock().insert((expires, uid), value);
    }

    pub fn remove(&self, expires: u64, uid: u64) -> Option<T> {
        self.entries.lock().remove(&(expires, uid))
    }

    /// The deadline the DM's single hardware timer should be armed to, or
    /// `None` if the queue is empty.
    pub fn arm_to_head(&self) -> Option<u64> {
        self.entries.lock().keys().next().map(|(expires, _)| *expires)
    }

    /// Drains and returns every entry whose `expires` is `<= now`, in
    /// ascending `expires` order.
    pub fn expire_up_to(&self, now: u64) -> Vec<((u64, u64), T)> {
        let mut guard = self.entries.lock();
        let split_key = (now.saturating_add(1), 0);
        let tail = guard.split_off(&split_key);
        let expired = core::mem::replace(&mut *guard, tail);
        expired.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PutQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arms_to_earliest_entry() {
        let q = PutQueue::new();
        q.insert(500, 1, "b");
        q.insert(100, 2, "a");
        assert_eq!(q.arm_to_head(), Some(100));
    }

    #[test]
    fn expire_up_to_drains_in_expires_order() {
        let q = PutQueue::new();
        q.insert(500, 1, "late");
        q.insert(100, 2, "early");
        q.insert(100, 1, "early-tiebreak");
        let expired = q.expire_up_to(100);
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].0, (100, 1));
        assert_eq!(expired[1].0, (100, 2));
        assert_eq!(q.len(), 1);
        assert_eq!(q.arm_to_head(), Some(500));
    }

    #[test]
    fn expire_up_to_leaves_future_entries_queued() {
        let q = PutQueue::new();
        q.insert(100, 1, "soon");
        q.insert(9000, 1, "later");
        let expired = q.expire_up_to(50);
        assert!(expired.is_empty());
        assert_eq!(q.len(), 2);
    }
}
