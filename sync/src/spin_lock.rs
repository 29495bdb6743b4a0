use core::ops::{Deref, DerefMut};

use spin::mutex::{SpinMutex, SpinMutexGuard};

/// BH-safe spinlock: safe to take from receive-path (soft-IRQ) context.
/// Never blocks on a scheduler — callers must not do anything that can
/// sleep while holding the guard (`maysleep` must be `false`).
pub struct SpinLock<T>(SpinMutex<T>);

impl<T> SpinLock<T> {
    pub const fn new(val: T) -> Self {
        Self(SpinMutex::new(val))
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        SpinLockGuard(self.0.lock())
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.0.try_lock().map(SpinLockGuard)
    }
}

pub struct SpinLockGuard<'a, T>(SpinMutexGuard<'a, T>);

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
