use core::ops::{Deref, DerefMut};

use spin::mutex::{SpinMutex, SpinMutexGuard};

/// Process-context mutex. Unlike [`crate::spin_lock::SpinLock`] this is the
/// lock callers may hold across a suspension point (`maysleep = true`);
/// taking it from receive-path (soft-IRQ) context is a caller bug, not
/// something this type can check without an OS underneath it — the
/// embedding kernel module is expected to only ever reach these call sites
/// from process context, exactly as the teacher's `FastMutex` requires
/// `ExAcquireFastMutex` to only be called at `PASSIVE_LEVEL`.
pub struct FastMutex<T>(SpinMutex<T>);

impl<T> FastMutex<T> {
    pub const fn new(val: T) -> Self {
        Self(SpinMutex::new(val))
    }

    pub fn lock(&self) -> FastMutexGuard<'_, T> {
        FastMutexGuard(self.0.lock())
    }

    pub fn try_lock(&self) -> Option<FastMutexGuard<'_, T>> {
        self.0.try_lock().map(FastMutexGuard)
    }
}

pub struct FastMutexGuard<'a, T>(SpinMutexGuard<'a, T>);

impl<'a, T> Deref for FastMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<'a, T> DerefMut for FastMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
