//! Control Device (§3, §4.4, §6): a byte-stream endpoint per namespace.
//! Generalizes the teacher's `device.rs` (open/close/read/write/poll
//! dispatch over an `IOQueue<Info>`) to the spec's upqueue byte-budget and
//! paginated `FETCH` semantics. Unlike the teacher's `array_holder.rs`
//! leftover buffer, `read()` here never splits a message across calls:
//! §4.4 is explicit that a too-small buffer fails the call with `NoBufs`
//! and leaves the head message queued.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use ripc_sync::spin_lock::SpinLock;

use crate::error::{CoreError, CoreResult};

pub type ControlDeviceId = u64;
pub type NamespaceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Admin,
    None,
}

/// §4.4: privileged operations require [`Capability::Admin`].
pub fn require_admin(cap: Capability) -> CoreResult<()> {
    match cap {
        Capability::Admin => Ok(()),
        Capability::None => Err(CoreError::Permission),
    }
}

/// Bounded FIFO of already-serialized messages (§4.4). `append` enqueues
/// immediately if the byte budget allows; otherwise, if blocking, it polls
/// up to `max_iterations` times via the caller-supplied `park` hook before
/// dropping with `NoSpace` — this crate has no scheduler of its own to
/// actually sleep on, matching [`ripc_sync::queue::Queue`]'s park-hook
/// design.
pub struct Upqueue {
    messages: SpinLock<VecDeque<Vec<u8>>>,
    used_bytes: AtomicUsize,
    budget: usize,
}

impl Upqueue {
    pub fn new(budget: usize) -> Self {
        Self {
            messages: SpinLock::new(VecDeque::new()),
            used_bytes: AtomicUsize::new(0),
            budget,
        }
    }

    fn try_enqueue(&self, bytes: Vec<u8>) -> Result<(), Vec<u8>> {
        let mut guard = self.messages.lock();
        let used = self.used_bytes.load(Ordering::Acquire);
        if used + bytes.len() > self.budget {
            return Err(bytes);
        }
        self.used_bytes.fetch_add(bytes.len(), Ordering::AcqRel);
        guard.push_back(bytes);
        Ok(())
    }

    pub fn append(
        &self,
        mut bytes: Vec<u8>,
        maysleep: bool,
        mut park: impl FnMut(),
        max_iterations: u32,
    ) -> CoreResult<()> {
        match self.try_enqueue(bytes) {
            Ok(()) => return Ok(()),
            Err(back) => bytes = back,
        }
        if !maysleep {
            return Err(CoreError::NoSpace);
        }
        for _ in 0..max_iterations {
            park();
            match self.try_enqueue(bytes) {
                Ok(()) => return Ok(()),
                Err(back) => bytes = back,
            }
        }
        Err(CoreError::NoSpace)
    }

    /// Strict §4.4 `read`: pops exactly one message if `buf_len` is large
    /// enough, otherwise fails with `NoBufs` and leaves the head queued.
    /// `Ok(None)` means the queue is currently empty.
    pub fn read_one(&self, buf_len: usize) -> CoreResult<Option<Vec<u8>>> {
        let mut guard = self.messages.lock();
        match guard.front() {
            None => Ok(None),
            Some(head) if head.len() > buf_len => Err(CoreError::NoBufs),
            Some(_) => {
                let msg = guard.pop_front().expect("front just checked Some");
                self.used_bytes.fetch_sub(msg.len(), Ordering::AcqRel);
                Ok(Some(msg))
            }
        }
    }

    pub fn is_readable(&self) -> bool {
        !self.messages.lock().is_empty()
    }

    /// §4.4: back-pressure is handled inside `append`, so `poll` always
    /// reports writable.
    pub fn is_writable(&self) -> bool {
        true
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Acquire)
    }
}

/// Per-device cursor over a paginated `FETCH` enumeration (flows or
/// registrations), preserved across calls so consumption can resume where
/// the previous `FETCH` left off.
pub struct FetchCursor<T> {
    items: Vec<T>,
    pos: usize,
}

impl<T: Clone> FetchCursor<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, pos: 0 }
    }

    pub fn next(&mut self) -> Option<T> {
        if self.pos < self.items.len() {
            let item = self.items[self.pos].clone();
            self.pos += 1;
            Some(item)
        } else {
            None
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.items.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionFlags {
    pub ipcps: bool,
}

/// One paginated `FlowFetch` entry (§4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowView {
    pub port_id: u16,
    pub remote_port: u16,
    pub remote_addr: u64,
}

/// One paginated `RegFetch` entry (§4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegView {
    pub appl_name: alloc::string::String,
    pub pending: bool,
}

pub struct ControlDevice {
    pub id: ControlDeviceId,
    pub namespace: NamespaceId,
    pub upqueue: Upqueue,
    pub flow_fetch: Option<FetchCursor<FlowView>>,
    pub reg_fetch: Option<FetchCursor<RegView>>,
    pub subscriptions: SubscriptionFlags,
}

impl ControlDevice {
    pub fn new(id: ControlDeviceId, namespace: NamespaceId, upqueue_budget: usize) -> Self {
        Self {
            id,
            namespace,
            upqueue: Upqueue::new(upqueue_budget),
            flow_fetch: None,
            reg_fetch: None,
            subscriptions: SubscriptionFlags::default(),
        }
    }

    /// §4.4 `read`: pops exactly one upqueue message into `buf`. Fails with
    /// `NoBufs` and leaves the head message queued if `buf` is too small.
    pub fn read(&self, buf: &mut [u8]) -> CoreResult<usize> {
        match self.upqueue.read_one(buf.len())? {
            None => Ok(0),
            Some(message) => {
                buf[..message.len()].copy_from_slice(&message);
                Ok(message.len())
            }
        }
    }

    pub fn poll_readable(&self) -> bool {
        self.upqueue.is_readable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_with_buffer_smaller_than_head_does_not_consume() {
        let q = Upqueue::new(1024);
        q.append(alloc::vec![1, 2, 3, 4], false, || {}, 0).unwrap();
        assert_eq!(q.read_one(2), Err(CoreError::NoBufs));
        assert_eq!(q.read_one(4), Ok(Some(alloc::vec![1, 2, 3, 4])));
    }

    #[test]
    fn append_drops_with_nospace_after_timeout_when_full() {
        let q = Upqueue::new(4);
        q.append(alloc::vec![0, 0, 0, 0], false, || {}, 0).unwrap();
        let mut parks = 0;
        let result = q.append(alloc::vec![1], true, || parks += 1, 3);
        assert_eq!(result, Err(CoreError::NoSpace));
        assert_eq!(parks, 3);
    }

    #[test]
    fn blocked_writer_unblocks_once_reader_drains_one_message() {
        let q = Upqueue::new(4);
        q.append(alloc::vec![0, 0, 0, 0], false, || {}, 0).unwrap();
        let mut parked_once = false;
        let result = q.append(
            alloc::vec![1],
            true,
            || {
                if !parked_once {
                    parked_once = true;
                    q.read_one(4).unwrap();
                }
            },
            3,
        );
        assert_eq!(result, Ok(()));
    }

    /// §8 boundary test: read with a buffer smaller than the head message
    /// returns `NoBufs` without consuming it; a large-enough buffer then
    /// reads the same message intact.
    #[test]
    fn control_device_read_with_small_buffer_fails_without_consuming() {
        let dev = ControlDevice::new(1, 0, 1024);
        dev.upqueue
            .append(alloc::vec![1, 2, 3, 4, 5], false, || {}, 0)
            .unwrap();
        let mut small = [0u8; 3];
        assert_eq!(dev.read(&mut small), Err(CoreError::NoBufs));
        let mut big = [0u8; 5];
        assert_eq!(dev.read(&mut big).unwrap(), 5);
        assert_eq!(big, [1, 2, 3, 4, 5]);
    }
}
