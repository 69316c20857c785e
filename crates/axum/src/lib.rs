//! Axum/tower middleware for the access-log pipeline
//!
//! Wraps every request in a [`AccessLogLayer`] that records one
//! [`AccessRow`](parqlog_pipeline::AccessRow) per completed
//! request/response cycle and hands it to a
//! [`Logger`](parqlog_pipeline::Logger) without blocking the handler.
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use parqlog_axum::AccessLogLayer;
//! use parqlog_pipeline::Logger;
//!
//! let logger = Logger::new()?;
//! let app = Router::new()
//!     .route("/user/{id}", get(show_user))
//!     .layer(AccessLogLayer::new(&logger));
//!
//! // later, on demand:
//! logger.export("/var/log/access.parquet").await?;
//! ```
//!
//! Response sizes are measured by wrapping the response body and counting
//! the bytes that actually stream out, so streamed and chunked responses
//! are sized correctly. The row is emitted when the body finishes (or is
//! dropped mid-stream), which is also when latency is taken.

mod body;
mod layer;

#[cfg(test)]
mod layer_test;

pub use body::CountingBody;
pub use layer::{AccessLogLayer, AccessLogService, CapturedError};
