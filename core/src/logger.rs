//! Ring-buffer log sink (§6's `LogLine` upqueue event), generalized from
//! the teacher's bespoke `Info`/`Severity` ring buffer to the `log` crate's
//! facade: this installs a [`log::Log`] that stores formatted record text
//! instead of a custom severity type, so ordinary `log::{debug,warn,error}`
//! call sites throughout `core` feed it directly.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};
use ripc_sync::spin_lock::SpinLock;

pub const MAX_LOG_LINES: usize = 1024;

/// One formatted record, severity-tagged the way [`ripc_wire::event::LogLine`]
/// carries it over the wire.
pub struct LogLine {
    pub level: Level,
    pub line: String,
}

struct RingBuffer {
    lines: SpinLock<Vec<LogLine>>,
    dropped: AtomicUsize,
    capacity: usize,
}

impl RingBuffer {
    const fn new(capacity: usize) -> Self {
        Self {
            lines: SpinLock::new(Vec::new()),
            dropped: AtomicUsize::new(0),
            capacity,
        }
    }

    fn push(&self, line: LogLine) {
        let mut guard = self.lines.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(line);
    }

    fn drain(&self) -> Vec<LogLine> {
        let mut guard = self.lines.lock();
        core::mem::take(&mut *guard)
    }
}

/// Installed once at process start; `log::Log` requires `'static` so this
/// is the usual static-with-interior-mutability shape, matching the
/// teacher's `static mut LOG_LINES` but behind a lock instead of raw
/// `AtomicPtr` swaps.
pub struct RingLogger {
    buffer: RingBuffer,
}

impl RingLogger {
    pub const fn new() -> Self {
        Self {
            buffer: RingBuffer::new(MAX_LOG_LINES),
        }
    }

    /// Drains every buffered line since the last call, oldest first. The
    /// embedding control device turns each into a
    /// [`ripc_wire::event::Event::LogLine`] it appends to its own upqueue.
    pub fn flush(&self) -> Vec<LogLine> {
        self.buffer.drain()
    }

    /// Lines evicted before being flushed, because the ring filled up
    /// faster than the embedding module drained it.
    pub fn dropped_count(&self) -> usize {
        self.buffer.dropped.load(Ordering::Relaxed)
    }
}

impl Default for RingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for RingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{}:{} {}", record.target(), record.line().unwrap_or(0), record.args());
        self.buffer.push(LogLine {
            level: record.level(),
            line,
        });
    }

    fn flush(&self) {}
}

static LOGGER: RingLogger = RingLogger::new();

/// Installs the ring-buffer sink as the process-wide `log` backend. The
/// embedding module calls this once at startup; safe to call more than
/// once, matching `log::set_logger`'s own idempotent-failure handling.
pub fn install(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Drains buffered lines, for whichever control device exposes the
/// fetch-logs operation.
pub fn flush() -> Vec<LogLine> {
    LOGGER.flush()
}

pub fn dropped_count() -> usize {
    LOGGER.dropped_count()
}

pub fn level_to_wire(level: Level) -> u8 {
    match level {
        Level::Error => 0,
        Level::Warn => 1,
        Level::Info => 2,
        Level::Debug => 3,
        Level::Trace => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_entry_once_full() {
        let ring = RingBuffer::new(2);
        ring.push(LogLine { level: Level::Info, line: String::from("a") });
        ring.push(LogLine { level: Level::Info, line: String::from("b") });
        ring.push(LogLine { level: Level::Info, line: String::from("c") });
        let drained = ring.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].line, "b");
        assert_eq!(drained[1].line, "c");
        assert_eq!(ring.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let ring = RingBuffer::new(4);
        ring.push(LogLine { level: Level::Debug, line: String::from("x") });
        assert_eq!(ring.drain().len(), 1);
        assert!(ring.drain().is_empty());
    }
}
