//! Byte-counting response body wrapper
//!
//! The access row cannot be finished when the handler returns: streamed
//! responses produce their bytes afterwards. `CountingBody` wraps the
//! response body, tallies the data frames that pass through, and emits
//! the finished row once the stream ends. Dropping the body mid-stream
//! (client disconnect) emits the row with whatever was counted so far.

use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use bytes::{Buf, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};

use parqlog_pipeline::{AccessRow, RowSender};

pin_project_lite::pin_project! {
    /// Response body that counts outgoing bytes and finishes the access row
    pub struct CountingBody {
        #[pin]
        inner: Body,
        finisher: Option<RowFinisher>,
    }
}

impl CountingBody {
    pub(crate) fn new(inner: Body, finisher: RowFinisher) -> Self {
        Self {
            inner,
            finisher: Some(finisher),
        }
    }
}

impl HttpBody for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(finisher)) = (frame.data_ref(), this.finisher.as_ref()) {
                    finisher.add(data.remaining());
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(error))) => {
                if let Some(finisher) = this.finisher.as_mut() {
                    finisher.record_error(error.to_string());
                }
                *this.finisher = None;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                // End of stream: dropping the finisher emits the row.
                *this.finisher = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Completes and sends the access row exactly once, on drop
pub(crate) struct RowFinisher {
    sender: RowSender,
    started_at: Instant,
    counted: AtomicI64,
    row: Option<AccessRow>,
}

impl RowFinisher {
    pub(crate) fn new(sender: RowSender, started_at: Instant, row: AccessRow) -> Self {
        Self {
            sender,
            started_at,
            counted: AtomicI64::new(0),
            row: Some(row),
        }
    }

    fn add(&self, bytes: usize) {
        self.counted.fetch_add(bytes as i64, Ordering::Relaxed);
    }

    fn record_error(&mut self, message: String) {
        if let Some(row) = self.row.as_mut() {
            row.error = Some(message);
        }
    }
}

impl Drop for RowFinisher {
    fn drop(&mut self) {
        let Some(mut row) = self.row.take() else {
            return;
        };
        row.latency = self.started_at.elapsed();
        row.response_size = self.counted.load(Ordering::Relaxed);
        self.sender.send(row);
    }
}
