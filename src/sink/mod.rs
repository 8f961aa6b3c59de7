//! Destinations for report points.
//!
//! A sink buffers points on [`ReportSink::record`] and only talks to its
//! backend on [`ReportSink::flush`]. [`ReportSink::close`] flushes whatever is
//! left and releases the sink; points recorded afterwards are dropped.

mod influx;
mod memory;

pub use influx::InfluxSink;
pub use memory::{MemorySink, StdoutSink};

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::Result;

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, f64>;

#[async_trait]
pub trait ReportSink: Send {
    /// Buffer one point. Never fails; problems surface on flush.
    fn record(&mut self, tags: Tags, fields: Fields);

    /// Deliver buffered points, returning how many were written.
    async fn flush(&mut self) -> Result<usize>;

    /// Flush remaining points and release the sink.
    async fn close(&mut self) -> Result<()>;
}

/// One time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Tags,
    pub fields: Fields,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Render as one line of InfluxDB line protocol with a nanosecond
    /// timestamp.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }

        let mut separator = ' ';
        for (key, value) in &self.fields {
            let _ = write!(line, "{separator}{}={value}", escape(key, &[',', '=', ' ']));
            separator = ',';
        }

        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            let _ = write!(line, " {nanos}");
        }
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Shared buffering used by every sink.
pub(crate) struct PointBuffer {
    measurement: String,
    clock: Arc<dyn Clock>,
    pending: Vec<Point>,
    closed: bool,
}

impl PointBuffer {
    pub(crate) fn new(measurement: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            measurement: measurement.into(),
            clock,
            pending: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn push(&mut self, tags: Tags, mut fields: Fields) {
        if self.closed {
            tracing::warn!(?tags, "dropping point recorded after the sink was closed");
            return;
        }

        fields.retain(|key, value| {
            let keep = value.is_finite();
            if !keep {
                tracing::warn!(field = %key, ?tags, "dropping non-finite field");
            }
            keep
        });
        if fields.is_empty() {
            tracing::warn!(?tags, "dropping point without fields");
            return;
        }

        self.pending.push(Point {
            measurement: self.measurement.clone(),
            tags,
            fields,
            timestamp: self.clock.now(),
        });
    }

    pub(crate) fn pending(&self) -> &[Point] {
        &self.pending
    }

    pub(crate) fn take(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

/// Render points as a line protocol body.
pub(crate) fn line_protocol_body(points: &[Point]) -> String {
    points
        .iter()
        .map(Point::to_line_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}
