//! Bounded buffer producer handle
//!
//! `RowSender` wraps the producer half of the fixed-capacity row channel.
//! `send` never blocks and never suspends: at capacity the row is dropped,
//! counted, and a rate-limited warning is emitted. Request-handling code
//! must never stall on logging.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::LoggerMetrics;
use crate::row::AccessRow;
use crate::util::RateLimitedLogger;

/// Cloneable, non-blocking handle for enqueuing access rows
///
/// Safe for any number of concurrent producers; ownership of a row
/// transfers exactly once into the channel, so duplicate delivery is
/// impossible by construction.
#[derive(Clone)]
pub struct RowSender {
    tx: mpsc::Sender<AccessRow>,
    metrics: Arc<LoggerMetrics>,
    drop_warnings: Arc<RateLimitedLogger>,
}

impl RowSender {
    pub(crate) fn new(tx: mpsc::Sender<AccessRow>, metrics: Arc<LoggerMetrics>) -> Self {
        Self {
            tx,
            metrics,
            drop_warnings: Arc::new(RateLimitedLogger::default()),
        }
    }

    /// Enqueue a row, fire-and-forget
    ///
    /// Completes immediately: either the row is accepted or it is dropped.
    /// Dropped rows are never retried.
    pub fn send(&self, row: AccessRow) {
        match self.tx.try_send(row) {
            Ok(()) => self.metrics.record_sent(),
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped();
                self.drop_warnings
                    .warn("access log buffer full, dropping row; consider a larger capacity");
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_dropped();
                tracing::debug!("access log pipeline stopped, dropping row");
            }
        }
    }

    /// Check if the writer task is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Maximum capacity of the bounded buffer
    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl std::fmt::Debug for RowSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSender")
            .field("capacity", &self.tx.max_capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
