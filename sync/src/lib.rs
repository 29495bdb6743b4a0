#![cfg_attr(not(test), no_std)]
#![allow(clippy::needless_return)]

//! Portable kernel-style concurrency primitives.
//!
//! The core crate needs the same shapes a real kernel module needs — a
//! BH-safe spinlock, a reader/writer spinlock, a process-context blocking
//! mutex, a generic blocking queue — without committing to one OS's FFI.
//! Concrete NT/Linux syscalls are an external collaborator's job; this
//! crate backs the shapes with `spin` so the core builds and tests on any
//! host while staying free of std-only assumptions.

extern crate alloc;

pub mod clock;
pub mod fast_mutex;
pub mod queue;
pub mod rw_spin_lock;
pub mod spin_lock;
