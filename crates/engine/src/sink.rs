//! NDJSON (newline-delimited JSON) output.
//!
//! One row per multi-status entry, lock outcome or lock discovery,
//! serialized straight into a buffered writer.

use davis_core::{EntryResponse, LockResult, MultiStatus, ResourcePath, WireElement};
use serde::Serialize;
use std::io::{self, BufWriter, Write};

#[derive(Serialize)]
struct DiscoveryRow<'a> {
    path: &'a ResourcePath,
    lockdiscovery: &'a WireElement,
}

pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    /// Sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Wraps `writer` in a 64 KiB buffer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    fn write_row<T: Serialize>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_response(&mut self, response: &EntryResponse) -> io::Result<()> {
        self.write_row(response)
    }

    /// One row per entry, in traversal order.
    pub fn write_multistatus(&mut self, multistatus: &MultiStatus) -> io::Result<()> {
        multistatus
            .responses
            .iter()
            .try_for_each(|response| self.write_response(response))
    }

    pub fn write_lock_result(&mut self, result: &LockResult) -> io::Result<()> {
        self.write_row(result)
    }

    /// `{"path": ..., "lockdiscovery": ...}` for one resource.
    pub fn write_lock_discovery(
        &mut self,
        path: &ResourcePath,
        discovery: &WireElement,
    ) -> io::Result<()> {
        self.write_row(&DiscoveryRow {
            path,
            lockdiscovery: discovery,
        })
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    /// Rows written so far, flushed or not.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}
