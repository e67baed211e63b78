use std::io::Write;

use crate::error::{Result, ScanError};
use crate::probe::FieldValue;

use super::Sink;

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    wrote_header: bool,
    no_header: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, no_header: bool) -> Self {
        Self { writer: csv::Writer::from_writer(writer), wrote_header: false, no_header }
    }
}

fn csv_err(e: csv::Error) -> ScanError {
    ScanError::Output(e.to_string())
}

impl<W: Write + Send> Sink for CsvSink<W> {
    fn write_record(&mut self, fields: &[(&'static str, &FieldValue)]) -> Result<()> {
        if !self.wrote_header && !self.no_header {
            self.writer
                .write_record(fields.iter().map(|(name, _)| *name))
                .map_err(csv_err)?;
        }
        self.wrote_header = true;
        self.writer
            .write_record(fields.iter().map(|(_, value)| value.as_csv_cell()))
            .map_err(csv_err)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| ScanError::Output(e.to_string()))
    }
}
