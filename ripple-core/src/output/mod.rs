//! Output translation and sinks (spec.md §4.4 step 7, §6 "Output schema").

mod csv_sink;
mod filter;
mod json_sink;
mod translation;

pub use filter::Filter;
pub use translation::translate;

use std::fs::File;
use std::io;

use crate::config::{OutputFormat, ScanConfig};
use crate::error::{Result, ScanError};
use crate::probe::FieldValue;

/// Owned exclusively by the receiver thread (spec.md §5).
pub trait Sink: Send {
    fn write_record(&mut self, fields: &[(&'static str, &FieldValue)]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

pub fn open_sink(cfg: &ScanConfig) -> Result<Box<dyn Sink>> {
    let writer: Box<dyn io::Write + Send> = match &cfg.output_file {
        Some(path) => Box::new(
            File::create(path)
                .map_err(|e| ScanError::Output(format!("creating {}: {e}", path.display())))?,
        ),
        None => Box::new(io::stdout()),
    };

    Ok(match cfg.output_format {
        OutputFormat::Csv => Box::new(csv_sink::CsvSink::new(writer, cfg.no_header_row)),
        OutputFormat::JsonLines => Box::new(json_sink::JsonLinesSink::new(writer)),
    })
}
