use core::ops::{Deref, DerefMut};

use spin::rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer spinlock. Multiple readers may hold the lock
/// simultaneously; a writer excludes everyone else. Writer-preferring:
/// callers that need the flow-table ordering from spec (DIF < IPCP < flow)
/// take the write side for any mutation and the read side for lookups.
pub struct RwSpinLock<T>(RwLock<T>);

impl<T> RwSpinLock<T> {
    pub const fn new(val: T) -> Self {
        Self(RwLock::new(val))
    }

    pub fn read_lock(&self) -> RwSpinReadGuard<'_, T> {
        RwSpinReadGuard(self.0.read())
    }

    pub fn write_lock(&self) -> RwSpinWriteGuard<'_, T> {
        RwSpinWriteGuard(self.0.write())
    }
}

pub struct RwSpinReadGuard<'a, T>(RwLockReadGuard<'a, T>);

impl<'a, T> Deref for RwSpinReadGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

pub struct RwSpinWriteGuard<'a, T>(RwLockWriteGuard<'a, T>);

impl<'a, T> Deref for RwSpinWriteGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<'a, T> DerefMut for RwSpinWriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
