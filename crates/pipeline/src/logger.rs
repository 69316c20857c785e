//! Pipeline front-end
//!
//! `Logger` wires the bounded buffer, the writer task, and the export
//! controller together and is the only type embedding applications need
//! to hold. Construction opens the first scratch segment synchronously
//! so misconfiguration and scratch-storage problems surface immediately
//! instead of inside the background task.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::buffer::RowSender;
use crate::config::LoggerConfig;
use crate::error::{ExportError, SinkError};
use crate::metrics::{LoggerMetrics, MetricsSnapshot};
use crate::row::AccessRow;
use crate::sink::{ParquetSinkFactory, SinkFactory};
use crate::writer::{ExportRequest, ExportSummary, WriterTask};

/// Asynchronous access-log pipeline
///
/// Rows go in through [`RowSender`] handles without ever blocking the
/// caller; a single background task encodes them into the current
/// scratch segment. [`export`](Logger::export) finalizes that segment,
/// copies it to a destination file, and transparently starts a new one.
pub struct Logger {
    sender: RowSender,
    exports: mpsc::Sender<ExportRequest>,
    export_guard: Mutex<()>,
    metrics: Arc<LoggerMetrics>,
    task: JoinHandle<()>,
}

impl Logger {
    /// Create a pipeline with default settings
    pub fn new() -> Result<Self, SinkError> {
        Self::with_config(LoggerConfig::default())
    }

    /// Create a pipeline with the given configuration
    pub fn with_config(config: LoggerConfig) -> Result<Self, SinkError> {
        let factory = ParquetSinkFactory::new(config.compression, config.row_group_size);
        Self::with_sink_factory(config, Arc::new(factory))
    }

    /// Create a pipeline over a custom sink implementation
    ///
    /// Capacity and validation still come from `config`; the sink settings
    /// in it are ignored in favor of whatever `factory` produces.
    pub fn with_sink_factory(
        config: LoggerConfig,
        factory: Arc<dyn SinkFactory>,
    ) -> Result<Self, SinkError> {
        config.validate()?;
        let metrics = Arc::new(LoggerMetrics::new());

        // Fail-fast open before anything is spawned.
        let initial = factory.open()?;
        metrics.record_segment_opened();

        let (row_tx, row_rx) = mpsc::channel(config.capacity);
        let (export_tx, export_rx) = mpsc::channel(1);
        let task = WriterTask::new(row_rx, export_rx, factory, Arc::clone(&metrics));
        let handle = tokio::spawn(task.run(initial));
        tracing::debug!(
            capacity = config.capacity,
            "access log pipeline started"
        );

        Ok(Self {
            sender: RowSender::new(row_tx, Arc::clone(&metrics)),
            exports: export_tx,
            export_guard: Mutex::new(()),
            metrics,
            task: handle,
        })
    }

    /// Get a cloneable handle for enqueuing rows
    pub fn sender(&self) -> RowSender {
        self.sender.clone()
    }

    /// Enqueue a row without blocking
    ///
    /// At capacity the row is dropped and counted, never queued elsewhere.
    pub fn send(&self, row: AccessRow) {
        self.sender.send(row);
    }

    /// Finalize the current segment and copy it to `destination`
    ///
    /// All rows written before this call are included; rows sent after it
    /// returns go to the next segment. Concurrent callers are serialized,
    /// so each export observes a distinct segment and no row appears in
    /// two of them. The destination file is created fresh, overwriting
    /// any existing file at that path.
    pub async fn export(&self, destination: impl AsRef<Path>) -> Result<ExportSummary, ExportError> {
        let _guard = self.export_guard.lock().await;
        let (reply, response) = oneshot::channel();
        self.exports
            .send(ExportRequest {
                destination: destination.as_ref().to_path_buf(),
                reply,
            })
            .await
            .map_err(|_| ExportError::PipelineStopped)?;
        response.await.map_err(|_| ExportError::PipelineStopped)?
    }

    /// Read the pipeline counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the pipeline and wait for the writer task to finish
    ///
    /// Buffered rows are still written to the final segment, which is then
    /// closed and discarded. Call [`export`](Logger::export) first if its
    /// contents matter. Outstanding [`RowSender`] clones do not delay the
    /// stop; rows they send afterwards are dropped and counted.
    pub async fn shutdown(self) {
        let Self {
            sender,
            exports,
            export_guard: _,
            metrics: _,
            task,
        } = self;
        drop(sender);
        drop(exports);
        if let Err(error) = task.await {
            tracing::warn!(error = %error, "access log writer task panicked");
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sender", &self.sender)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
