//! Parqlog - Pipeline
//!
//! Asynchronous HTTP access logging to columnar storage. One row per
//! completed request, buffered through a bounded non-blocking channel,
//! encoded into a Parquet segment held in an anonymous scratch file, and
//! exported on demand to a caller-chosen path.
//!
//! # Architecture
//!
//! ```text
//! [Handlers]                   [Writer Task]                [Storage]
//!    RowSender ──→ mpsc::Receiver ──→ state machine ──→ ParquetSink (anon temp)
//!    (try_send)                   stream/export/restart          │
//!                                        ↑                       │ export
//!    Logger::export ──→ export request ──┘                       ↓
//!                   ←── oneshot reply                    destination .parquet
//! ```
//!
//! # Key Design
//!
//! - **Channel-based**: `tokio::sync::mpsc` between producers and the
//!   single writer task
//! - **Never blocks handlers**: `try_send` with drop-and-count overflow
//!   handling; capacity is a throughput knob, not a correctness knob
//! - **Single consumer**: one task owns the sink, so no lock guards the
//!   write path and rows keep their send order within a segment
//! - **Crash-safe scratch**: the scratch file has no directory entry; a
//!   crash cannot leave a partial file at a visible path
//! - **Errors returned, not fatal**: export failures go back to the
//!   caller and the pipeline restarts a fresh segment either way
//!
//! # Example
//!
//! ```ignore
//! use parqlog_pipeline::Logger;
//!
//! let logger = Logger::new()?;
//! let sender = logger.sender();
//!
//! // per request, from any thread or task:
//! sender.send(row);
//!
//! // on demand:
//! let summary = logger.export("/var/log/access.parquet").await?;
//! println!("exported {} rows", summary.rows);
//! ```

mod buffer;
mod config;
mod error;
mod logger;
mod metrics;
mod row;
mod sink;
mod util;
mod writer;


pub use buffer::RowSender;
pub use config::{Compression, LoggerConfig, DEFAULT_CAPACITY, DEFAULT_ROW_GROUP_SIZE};
pub use error::{ExportError, SinkError};
pub use logger::Logger;
pub use metrics::{LoggerMetrics, MetricsSnapshot};
pub use row::{access_log_schema, rows_to_record_batch, AccessRow, HeaderSnapshot};
pub use sink::{ClosedSegment, ColumnarSink, ParquetSink, ParquetSinkFactory, SinkFactory};
pub use util::RateLimitedLogger;
pub use writer::ExportSummary;
