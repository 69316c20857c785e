//! Access-log row type and Arrow schema
//!
//! One `AccessRow` describes one completed request/response cycle. Rows are
//! created by an adapter, sent through the bounded buffer, and consumed
//! exactly once by the writer task. Field order in the schema is optimized
//! for predicate pushdown: time-range and low-cardinality filter columns
//! first, header maps and the optional error string last.

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{
    ArrayRef, Int32Array, Int64Array, ListBuilder, MapBuilder, RecordBatch, StringArray,
    StringBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Fields, Schema, TimeUnit};
use chrono::{DateTime, Utc};

/// Ordered header snapshot: name → values, in first-seen order
pub type HeaderSnapshot = Vec<(String, Vec<String>)>;

/// One completed request/response cycle
///
/// Immutable after creation. Timestamps are stored with microsecond
/// precision, latency with nanosecond precision, so sub-millisecond
/// handlers survive a round trip through the columnar format.
#[derive(Debug, Clone)]
pub struct AccessRow {
    /// Request arrival instant
    pub start_time: DateTime<Utc>,
    /// Elapsed time from arrival to response completion
    pub latency: Duration,
    /// Protocol version, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Peer address as reported by the server layer
    pub remote_addr: String,
    /// Host header (or URI authority)
    pub host: String,
    /// Request method
    pub method: String,
    /// Full request URI
    pub url: String,
    /// Matched route pattern, e.g. `/user/{id}`; empty if unknown
    pub route_pattern: String,
    /// Referer header; empty if absent
    pub referer: String,
    /// User-Agent header; empty if absent
    pub user_agent: String,
    /// Final response status code
    pub status: u16,
    /// Request body size in bytes; -1 when unknown
    pub request_size: i64,
    /// Response body size in bytes as counted at completion
    pub response_size: i64,
    /// Request header snapshot
    pub request_headers: HeaderSnapshot,
    /// Response header snapshot
    pub response_headers: HeaderSnapshot,
    /// Handler error, for frameworks that expose one
    pub error: Option<String>,
}

/// Map<Utf8, List<Utf8>> column type for header snapshots
///
/// Field names must match what `MapBuilder`/`ListBuilder` produce, or
/// `RecordBatch::try_new` rejects the columns.
fn header_map_type() -> DataType {
    let values = Field::new(
        "values",
        DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        true,
    );
    let entries = Field::new(
        "entries",
        DataType::Struct(Fields::from(vec![
            Field::new("keys", DataType::Utf8, false),
            values,
        ])),
        false,
    );
    DataType::Map(Arc::new(entries), false)
}

/// Create the Arrow schema for access-log rows
pub fn access_log_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("latency", DataType::Int64, false),
        Field::new("protocol", DataType::Utf8, false),
        Field::new("remote_addr", DataType::Utf8, false),
        Field::new("host", DataType::Utf8, false),
        Field::new("method", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("route_pattern", DataType::Utf8, false),
        Field::new("referer", DataType::Utf8, false),
        Field::new("user_agent", DataType::Utf8, false),
        Field::new("status", DataType::Int32, false),
        Field::new("request_size", DataType::Int64, false),
        Field::new("response_size", DataType::Int64, false),
        Field::new("request_headers", header_map_type(), true),
        Field::new("response_headers", header_map_type(), true),
        Field::new("error", DataType::Utf8, true),
    ]))
}

fn headers_builder() -> MapBuilder<StringBuilder, ListBuilder<StringBuilder>> {
    MapBuilder::new(None, StringBuilder::new(), ListBuilder::new(StringBuilder::new()))
}

fn append_headers(
    builder: &mut MapBuilder<StringBuilder, ListBuilder<StringBuilder>>,
    headers: &HeaderSnapshot,
) -> Result<(), arrow::error::ArrowError> {
    for (name, values) in headers {
        builder.keys().append_value(name);
        let list = builder.values();
        for value in values {
            list.values().append_value(value);
        }
        list.append(true);
    }
    builder.append(true)
}

/// Convert access rows to an Arrow RecordBatch
///
/// Column order must match [`access_log_schema`].
pub fn rows_to_record_batch(
    rows: &[AccessRow],
    schema: Arc<Schema>,
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let len = rows.len();

    let mut start_times = Vec::with_capacity(len);
    let mut latencies = Vec::with_capacity(len);
    let mut protocols = Vec::with_capacity(len);
    let mut remote_addrs = Vec::with_capacity(len);
    let mut hosts = Vec::with_capacity(len);
    let mut methods = Vec::with_capacity(len);
    let mut urls = Vec::with_capacity(len);
    let mut route_patterns = Vec::with_capacity(len);
    let mut referers = Vec::with_capacity(len);
    let mut user_agents = Vec::with_capacity(len);
    let mut statuses = Vec::with_capacity(len);
    let mut request_sizes = Vec::with_capacity(len);
    let mut response_sizes = Vec::with_capacity(len);
    let mut request_headers = headers_builder();
    let mut response_headers = headers_builder();
    let mut errors: Vec<Option<&str>> = Vec::with_capacity(len);

    for row in rows {
        start_times.push(row.start_time.timestamp_micros());
        latencies.push(row.latency.as_nanos() as i64);
        protocols.push(row.protocol.as_str());
        remote_addrs.push(row.remote_addr.as_str());
        hosts.push(row.host.as_str());
        methods.push(row.method.as_str());
        urls.push(row.url.as_str());
        route_patterns.push(row.route_pattern.as_str());
        referers.push(row.referer.as_str());
        user_agents.push(row.user_agent.as_str());
        statuses.push(i32::from(row.status));
        request_sizes.push(row.request_size);
        response_sizes.push(row.response_size);
        append_headers(&mut request_headers, &row.request_headers)?;
        append_headers(&mut response_headers, &row.response_headers)?;
        errors.push(row.error.as_deref());
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(start_times)),
        Arc::new(Int64Array::from(latencies)),
        Arc::new(StringArray::from(protocols)),
        Arc::new(StringArray::from(remote_addrs)),
        Arc::new(StringArray::from(hosts)),
        Arc::new(StringArray::from(methods)),
        Arc::new(StringArray::from(urls)),
        Arc::new(StringArray::from(route_patterns)),
        Arc::new(StringArray::from(referers)),
        Arc::new(StringArray::from(user_agents)),
        Arc::new(Int32Array::from(statuses)),
        Arc::new(Int64Array::from(request_sizes)),
        Arc::new(Int64Array::from(response_sizes)),
        Arc::new(request_headers.finish()),
        Arc::new(response_headers.finish()),
        Arc::new(StringArray::from(errors)),
    ];

    RecordBatch::try_new(schema, columns)
}

// =============================================================================
// Tests
// =============================================================================
