//! Pipeline metrics
//!
//! Lock-free counters shared between the producer side and the writer
//! task. No reporting loop is attached; embedding applications read a
//! snapshot via `Logger::metrics()`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one access-log pipeline
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    /// Rows accepted into the bounded buffer
    pub rows_sent: AtomicU64,

    /// Rows discarded (buffer full, pipeline stopped, or sink unavailable)
    pub rows_dropped: AtomicU64,

    /// Rows delivered to the columnar sink
    pub rows_written: AtomicU64,

    /// Sink write failures (row lost, pipeline continued)
    pub write_errors: AtomicU64,

    /// Scratch segments opened (one at start, one per restart)
    pub segments_opened: AtomicU64,

    /// Exports that completed successfully
    pub exports_completed: AtomicU64,

    /// Exports that failed (close or copy error)
    pub export_errors: AtomicU64,
}

impl LoggerMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            rows_sent: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            segments_opened: AtomicU64::new(0),
            exports_completed: AtomicU64::new(0),
            export_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_sent(&self) {
        self.rows_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.rows_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_written(&self) {
        self.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_segment_opened(&self) {
        self.segments_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_export(&self) {
        self.exports_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_export_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_sent: self.rows_sent.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            segments_opened: self.segments_opened.load(Ordering::Relaxed),
            exports_completed: self.exports_completed.load(Ordering::Relaxed),
            export_errors: self.export_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub rows_sent: u64,
    pub rows_dropped: u64,
    pub rows_written: u64,
    pub write_errors: u64,
    pub segments_opened: u64,
    pub exports_completed: u64,
    pub export_errors: u64,
}
