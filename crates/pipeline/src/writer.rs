//! Writer task - sole consumer of the bounded buffer
//!
//! A single background task owns the open columnar sink and drives an
//! explicit state machine:
//!
//! ```text
//! Opening -> Streaming -> Finalizing -> Exporting (optional) -> Restarting
//!    |                                                              |
//!    +----------------------- Draining <---------------------------+
//! ```
//!
//! One active sink per segment means no lock is ever taken around it;
//! sequencing comes from the single-consumer channel read. After every
//! export, successful or not, a fresh segment is opened so `send` keeps
//! working for the life of the process. If a restart-time open fails the
//! task drains (drops and counts rows) until the next export request,
//! which receives the open error, and then tries to open again.
//!
//! The export channel closing is the stop signal: adapters hold sender
//! clones for as long as they live, so the task must not wait for the row
//! channel to close. On stop the task drains whatever is already buffered,
//! finalizes the segment, and exits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::ExportError;
use crate::metrics::LoggerMetrics;
use crate::row::AccessRow;
use crate::sink::{ColumnarSink, SinkFactory};
use crate::util::RateLimitedLogger;

/// Result of a completed export
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    /// Rows contained in the exported segment
    pub rows: u64,
    /// Bytes copied to the destination file
    pub bytes: u64,
}

/// Export signal carried from the controller to the writer task
pub(crate) struct ExportRequest {
    pub(crate) destination: PathBuf,
    pub(crate) reply: oneshot::Sender<Result<ExportSummary, ExportError>>,
}

enum State {
    Streaming(Box<dyn ColumnarSink>),
    Finalizing(Box<dyn ColumnarSink>, ExportRequest),
    Restarting,
    Draining(ExportError),
    Stopped,
}

enum Event {
    Row(AccessRow),
    Export(ExportRequest),
    Shutdown,
}

pub(crate) struct WriterTask {
    rows: mpsc::Receiver<AccessRow>,
    exports: mpsc::Receiver<ExportRequest>,
    factory: Arc<dyn SinkFactory>,
    metrics: Arc<LoggerMetrics>,
    write_warnings: RateLimitedLogger,
}

impl WriterTask {
    pub(crate) fn new(
        rows: mpsc::Receiver<AccessRow>,
        exports: mpsc::Receiver<ExportRequest>,
        factory: Arc<dyn SinkFactory>,
        metrics: Arc<LoggerMetrics>,
    ) -> Self {
        Self {
            rows,
            exports,
            factory,
            metrics,
            write_warnings: RateLimitedLogger::default(),
        }
    }

    /// Run the task to completion
    ///
    /// The first sink is opened by the logger constructor so that
    /// misconfiguration fails before anything is spawned.
    pub(crate) async fn run(mut self, initial: Box<dyn ColumnarSink>) {
        let mut state = State::Streaming(initial);
        loop {
            state = match state {
                State::Streaming(sink) => self.stream(sink).await,
                State::Finalizing(sink, request) => self.finalize(sink, request),
                State::Restarting => self.reopen(),
                State::Draining(error) => self.drain(error).await,
                State::Stopped => break,
            };
        }
        tracing::debug!("access log writer task stopped");
    }

    // Either channel closing stops the task: the row side means every
    // sender is gone, the export side means the logger was shut down or
    // dropped while adapters still hold sender clones.
    async fn next_event(&mut self) -> Event {
        tokio::select! {
            row = self.rows.recv() => match row {
                Some(row) => Event::Row(row),
                None => Event::Shutdown,
            },
            request = self.exports.recv() => match request {
                Some(request) => Event::Export(request),
                None => Event::Shutdown,
            },
        }
    }

    async fn stream(&mut self, mut sink: Box<dyn ColumnarSink>) -> State {
        loop {
            match self.next_event().await {
                Event::Row(row) => self.write_row(sink.as_mut(), row),
                Event::Export(request) => return State::Finalizing(sink, request),
                Event::Shutdown => {
                    // Write what was buffered before the stop signal, then
                    // finalize so the scratch handle is released cleanly.
                    while let Ok(row) = self.rows.try_recv() {
                        self.write_row(sink.as_mut(), row);
                    }
                    if let Err(error) = sink.close() {
                        tracing::warn!(error = %error, "failed to close segment during shutdown");
                    }
                    return State::Stopped;
                }
            }
        }
    }

    fn write_row(&self, sink: &mut dyn ColumnarSink, row: AccessRow) {
        match sink.write(row) {
            Ok(()) => self.metrics.record_written(),
            Err(error) => {
                // Row lost, pipeline continues.
                self.metrics.record_write_error();
                self.write_warnings
                    .error("failed to write access row", &error);
            }
        }
    }

    fn finalize(&self, sink: Box<dyn ColumnarSink>, request: ExportRequest) -> State {
        let result = close_and_export(sink, &request.destination);
        match &result {
            Ok(summary) => {
                self.metrics.record_export();
                tracing::info!(
                    rows = summary.rows,
                    bytes = summary.bytes,
                    destination = %request.destination.display(),
                    "exported access log segment"
                );
            }
            Err(error) => {
                self.metrics.record_export_error();
                tracing::error!(error = %error, "access log export failed");
            }
        }
        // Controller may have given up; the segment is gone either way.
        let _ = request.reply.send(result);
        State::Restarting
    }

    fn reopen(&self) -> State {
        match self.factory.open() {
            Ok(sink) => {
                self.metrics.record_segment_opened();
                State::Streaming(sink)
            }
            Err(error) => {
                tracing::error!(
                    error = %error,
                    "failed to open scratch sink; dropping rows until the next export attempt"
                );
                State::Draining(ExportError::Reopen(error))
            }
        }
    }

    async fn drain(&mut self, error: ExportError) -> State {
        loop {
            match self.next_event().await {
                Event::Row(_) => self.metrics.record_dropped(),
                Event::Export(request) => {
                    let _ = request.reply.send(Err(error));
                    return State::Restarting;
                }
                Event::Shutdown => {
                    while self.rows.try_recv().is_ok() {
                        self.metrics.record_dropped();
                    }
                    return State::Stopped;
                }
            }
        }
    }
}

fn close_and_export(
    sink: Box<dyn ColumnarSink>,
    destination: &Path,
) -> Result<ExportSummary, ExportError> {
    let mut segment = sink.close().map_err(ExportError::Close)?;
    let rows = segment.row_count();
    let bytes = segment
        .export_to(destination)
        .map_err(|source| ExportError::Export {
            path: destination.to_path_buf(),
            source,
        })?;
    Ok(ExportSummary { rows, bytes })
}
