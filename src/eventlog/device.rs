//! Event log rendering devices

use crate::error::{RelprovError, RelprovResult};
use crate::eventlog::LogEntry;
use std::io::Write;

/// Destination for event log entries
pub trait Device: Send {
    fn write_log_entry(&mut self, entry: &LogEntry) -> RelprovResult<()>;
}

/// Writes entries as JSON lines
pub struct JsonDevice<W> {
    writer: W,
}

/// Writes entries in a user friendly format
pub struct TextDevice<W> {
    writer: W,
}

impl<W: Write + Send> JsonDevice<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> TextDevice<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// `Started compiling release app/1.0 > Package base/1.0`
    pub fn render(entry: &LogEntry) -> String {
        format!(
            "{} {} > {}",
            title_case(&entry.state.to_string()),
            entry.stage.to_lowercase(),
            entry.task
        )
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl<W: Write + Send> Device for JsonDevice<W> {
    fn write_log_entry(&mut self, entry: &LogEntry) -> RelprovResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| RelprovError::io("writing log entry", e))
    }
}

impl<W: Write + Send> Device for TextDevice<W> {
    fn write_log_entry(&mut self, entry: &LogEntry) -> RelprovResult<()> {
        writeln!(self.writer, "{}", Self::render(entry))
            .and_then(|_| self.writer.flush())
            .map_err(|e| RelprovError::io("writing log entry", e))
    }
}
