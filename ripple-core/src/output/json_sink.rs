use std::io::Write;

use crate::error::{Result, ScanError};
use crate::probe::FieldValue;

use super::Sink;

/// One JSON object per result record, newline-delimited.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn write_record(&mut self, fields: &[(&'static str, &FieldValue)]) -> Result<()> {
        let mut object = serde_json::Map::with_capacity(fields.len());
        for (name, value) in fields {
            object.insert((*name).to_string(), value.as_json());
        }
        let line = serde_json::to_string(&serde_json::Value::Object(object))
            .map_err(|e| ScanError::Output(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| ScanError::Output(e.to_string()))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| ScanError::Output(e.to_string()))
    }
}
