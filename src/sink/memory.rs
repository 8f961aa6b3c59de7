use std::sync::Arc;

use async_trait::async_trait;

use super::{line_protocol_body, Fields, Point, PointBuffer, ReportSink, Tags};
use crate::clock::Clock;
use crate::error::Result;

/// Keeps flushed points in memory.
pub struct MemorySink {
    buffer: PointBuffer,
    flushed: Vec<Point>,
    flush_count: usize,
}

impl MemorySink {
    pub fn new(measurement: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            buffer: PointBuffer::new(measurement, clock),
            flushed: Vec::new(),
            flush_count: 0,
        }
    }

    /// Points recorded but not flushed yet.
    pub fn pending(&self) -> &[Point] {
        self.buffer.pending()
    }

    /// Points delivered by earlier flushes.
    pub fn flushed(&self) -> &[Point] {
        &self.flushed
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    fn record(&mut self, tags: Tags, fields: Fields) {
        self.buffer.push(tags, fields);
    }

    async fn flush(&mut self) -> Result<usize> {
        let points = self.buffer.take();
        let count = points.len();
        self.flushed.extend(points);
        self.flush_count += 1;
        Ok(count)
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.buffer.mark_closed();
        Ok(())
    }
}

/// Prints line protocol to stdout on flush. Used for dry runs.
pub struct StdoutSink {
    buffer: PointBuffer,
}

impl StdoutSink {
    pub fn new(measurement: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            buffer: PointBuffer::new(measurement, clock),
        }
    }
}

#[async_trait]
impl ReportSink for StdoutSink {
    fn record(&mut self, tags: Tags, fields: Fields) {
        self.buffer.push(tags, fields);
    }

    async fn flush(&mut self) -> Result<usize> {
        let points = self.buffer.take();
        if !points.is_empty() {
            println!("{}", line_protocol_body(&points));
        }
        Ok(points.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.buffer.mark_closed();
        Ok(())
    }
}
