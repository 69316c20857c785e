//! Pipeline error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the columnar sink and scratch storage
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O error on scratch or destination storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encoding error
    #[error("parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow conversion error
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors surfaced to the export caller
///
/// Every variant is fatal for that export attempt only; the pipeline
/// restarts a fresh segment regardless, so subsequent sends and exports
/// keep working.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Closing the segment sink failed; buffered encoded data was lost
    #[error("failed to close segment sink")]
    Close(#[source] SinkError),

    /// Copying the finished segment to the destination failed
    #[error("failed to export segment to {path}")]
    Export {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    /// The scratch sink could not be reopened after the previous segment
    #[error("scratch sink unavailable after failed reopen")]
    Reopen(#[source] SinkError),

    /// The writer task is no longer running
    #[error("pipeline stopped")]
    PipelineStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SinkError::Config("capacity must be non-zero".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = ExportError::Close(SinkError::Config("x".to_string()));
        assert!(err.to_string().contains("failed to close"));

        let err = ExportError::Export {
            path: PathBuf::from("/tmp/out.parquet"),
            source: SinkError::Io(std::io::Error::other("disk full")),
        };
        assert!(err.to_string().contains("/tmp/out.parquet"));

        let err = ExportError::PipelineStopped;
        assert!(err.to_string().contains("stopped"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = ExportError::Export {
            path: PathBuf::from("/tmp/out.parquet"),
            source: SinkError::Io(std::io::Error::other("disk full")),
        };
        let source = err.source().unwrap();
        assert!(source.to_string().contains("disk full"));
    }
}
