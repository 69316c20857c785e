//! Pipeline configuration
//!
//! Plain struct with builder-style setters and serde support, so a logger
//! can be configured programmatically or from a TOML section. Minimal
//! config should just work - only specify what you need to change.

use serde::Deserialize;

use crate::error::SinkError;

/// Default bounded-buffer capacity (rows)
pub const DEFAULT_CAPACITY: usize = 64;

/// Default number of rows buffered per Parquet row group
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1024;

/// Configuration for an access-log pipeline
///
/// Capacity is a throughput/latency trade-off, not a correctness knob:
/// ownership of a row transfers exactly once, so duplicate delivery is
/// impossible at any capacity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Bounded-buffer capacity; rows beyond it are dropped, never queued
    pub capacity: usize,

    /// Compression codec for the columnar sink
    pub compression: Compression,

    /// Rows accumulated inside the sink before a row group is written
    pub row_group_size: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            compression: Compression::Snappy,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

impl LoggerConfig {
    /// Create config with custom buffer capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Create config with a specific compression codec
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Create config with no compression
    pub fn uncompressed(mut self) -> Self {
        self.compression = Compression::None;
        self
    }

    /// Create config with custom row group size
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SinkError> {
        if self.capacity == 0 {
            return Err(SinkError::Config("capacity must be non-zero".to_string()));
        }
        if self.row_group_size == 0 {
            return Err(SinkError::Config(
                "row_group_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parquet compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    None,
    /// Snappy compression (fast, moderate ratio)
    #[default]
    Snappy,
    /// LZ4 compression (very fast, lower ratio)
    Lz4,
    /// Zstd compression (slower, best ratio)
    Zstd,
}

impl Compression {
    /// Convert to parquet compression type
    pub fn to_parquet(self) -> parquet::basic::Compression {
        match self {
            Self::None => parquet::basic::Compression::UNCOMPRESSED,
            Self::Snappy => parquet::basic::Compression::SNAPPY,
            Self::Lz4 => parquet::basic::Compression::LZ4,
            Self::Zstd => parquet::basic::Compression::ZSTD(Default::default()),
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Some(Self::None),
            "snappy" => Some(Self::Snappy),
            "lz4" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
