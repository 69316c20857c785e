//! Columnar sink abstraction and Parquet implementation
//!
//! The writer task talks to scratch storage through the `ColumnarSink` /
//! `ClosedSegment` traits so the segment lifecycle is testable without
//! real files. The production implementation encodes rows to Parquet over
//! an anonymous temp file: the handle has no directory entry, so abnormal
//! process termination cannot leave a half-written artifact at a visible
//! path.
//!
//! Column encodings mirror the access-log shape: delta encoding for the
//! monotonic/near-monotonic numeric columns (start_time, latency, byte
//! counts), dictionary encoding for the low-cardinality string and status
//! columns, plain encoding for the header map columns.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::Encoding;
use parquet::file::properties::{WriterProperties, WriterVersion};
use parquet::schema::types::ColumnPath;

use crate::config::Compression;
use crate::error::SinkError;
use crate::row::{access_log_schema, rows_to_record_batch, AccessRow};

// =============================================================================
// Sink traits
// =============================================================================

/// An open scratch sink accepting rows for the current export segment
///
/// Exclusively owned by the active writer task instance; never shared,
/// never concurrently written.
pub trait ColumnarSink: Send {
    /// Write one row
    ///
    /// Internal batching (e.g. row-group accumulation) is a sink
    /// optimization; a failure may lose the rows of the current batch.
    fn write(&mut self, row: AccessRow) -> Result<(), SinkError>;

    /// Flush all buffered encoded data and finalize the segment
    fn close(self: Box<Self>) -> Result<Box<dyn ClosedSegment>, SinkError>;
}

/// A finalized segment that can be streamed to a destination file
pub trait ClosedSegment: Send {
    /// Number of rows the segment holds
    fn row_count(&self) -> u64;

    /// Durably flush scratch storage, rewind, and copy the full segment
    /// content into a newly created file at `destination`, overwriting if
    /// present. Returns the number of bytes copied.
    fn export_to(&mut self, destination: &Path) -> Result<u64, SinkError>;
}

/// Opens a fresh scratch sink for each export segment
pub trait SinkFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn ColumnarSink>, SinkError>;
}

// =============================================================================
// Parquet scratch sink
// =============================================================================

/// Columns stored with delta encoding instead of dictionary pages
pub(crate) const DELTA_COLUMNS: [&str; 4] =
    ["start_time", "latency", "request_size", "response_size"];

fn writer_properties(compression: Compression, row_group_size: usize) -> WriterProperties {
    let mut builder = WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(compression.to_parquet())
        .set_max_row_group_size(row_group_size);
    for column in DELTA_COLUMNS {
        let path = ColumnPath::from(column);
        builder = builder
            .set_column_dictionary_enabled(path.clone(), false)
            .set_column_encoding(path, Encoding::DELTA_BINARY_PACKED);
    }
    builder.build()
}

/// Parquet sink over an anonymous scratch file
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    schema: Arc<Schema>,
    pending: Vec<AccessRow>,
    row_group_size: usize,
    rows_written: u64,
}

impl ParquetSink {
    /// Open a fresh sink backed by an unlinked temp file
    pub fn open(compression: Compression, row_group_size: usize) -> Result<Self, SinkError> {
        let scratch = tempfile::tempfile()?;
        let schema = access_log_schema();
        let writer = ArrowWriter::try_new(
            scratch,
            Arc::clone(&schema),
            Some(writer_properties(compression, row_group_size)),
        )?;
        Ok(Self {
            writer,
            schema,
            pending: Vec::new(),
            row_group_size,
            rows_written: 0,
        })
    }

    fn flush_pending(&mut self) -> Result<(), SinkError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        // Take the rows up front; on failure they are lost, not retried.
        let rows = std::mem::take(&mut self.pending);
        let count = rows.len() as u64;
        let batch = rows_to_record_batch(&rows, Arc::clone(&self.schema))?;
        self.writer.write(&batch)?;
        self.rows_written += count;
        Ok(())
    }
}

impl ColumnarSink for ParquetSink {
    fn write(&mut self, row: AccessRow) -> Result<(), SinkError> {
        self.pending.push(row);
        if self.pending.len() >= self.row_group_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<Box<dyn ClosedSegment>, SinkError> {
        let mut this = *self;
        this.flush_pending()?;
        // Writes the footer and hands the scratch file back.
        let scratch = this.writer.into_inner()?;
        Ok(Box::new(ParquetSegment {
            scratch,
            rows: this.rows_written,
        }))
    }
}

/// A finalized Parquet segment held in the anonymous scratch file
pub struct ParquetSegment {
    scratch: File,
    rows: u64,
}

impl ClosedSegment for ParquetSegment {
    fn row_count(&self) -> u64 {
        self.rows
    }

    fn export_to(&mut self, destination: &Path) -> Result<u64, SinkError> {
        self.scratch.sync_all()?;
        self.scratch.seek(SeekFrom::Start(0))?;
        let mut out = File::create(destination)?;
        let bytes = io::copy(&mut self.scratch, &mut out)?;
        // Surfaces close-time I/O errors; a plain drop would swallow them.
        out.sync_all()?;
        Ok(bytes)
    }
}

/// Factory producing Parquet scratch sinks with fixed settings
pub struct ParquetSinkFactory {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetSinkFactory {
    pub fn new(compression: Compression, row_group_size: usize) -> Self {
        Self {
            compression,
            row_group_size,
        }
    }
}

impl SinkFactory for ParquetSinkFactory {
    fn open(&self) -> Result<Box<dyn ColumnarSink>, SinkError> {
        Ok(Box::new(ParquetSink::open(
            self.compression,
            self.row_group_size,
        )?))
    }
}
