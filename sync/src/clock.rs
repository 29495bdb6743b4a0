//! System-time abstraction.
//!
//! The teacher reaches straight into `ffi::pm_QuerySystemTime`
//! (`wdk::utils::get_system_timestamp_ms`) because it only ever runs under
//! one kernel. This crate has no kernel of its own, so time is a trait the
//! embedding module implements; tests use a `TestClock` they can step by
//! hand.

pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary epoch. Must be monotonic.
    fn now_ms(&self) -> u64;
}

#[cfg(test)]
pub struct TestClock(core::sync::atomic::AtomicU64);

#[cfg(test)]
impl TestClock {
    pub fn new(start_ms: u64) -> Self {
        Self(core::sync::atomic::AtomicU64::new(start_ms))
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0
            .fetch_add(delta_ms, core::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.0.load(core::sync::atomic::Ordering::SeqCst)
    }
}
