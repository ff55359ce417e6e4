use std::io::Write;

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::view::Report;

/// Trait to define different output generators. `save` writes the serialized report to a
/// writer, `format` returns it as a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, report: &Report) -> Result<()>;
    fn format(&self, report: &Report) -> Result<String> {
        let mut data: Vec<u8> = Vec::new();
        self.save(&mut data, report)?;
        Ok(String::from_utf8(data)?)
    }
}

/// One formatter per machine-readable output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Json(JsonFormatter),
    Csv(CsvFormatter),
}

/// The full report, including buckets, deltas and annotations, as pretty-printed JSON
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonFormatter;

impl OutputGenerator for JsonFormatter {
    fn save(&self, writer: &mut impl Write, report: &Report) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    }
}

/// The tabular part of the report as CSV
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CsvFormatter;

impl OutputGenerator for CsvFormatter {
    fn save(&self, writer: &mut impl Write, report: &Report) -> Result<()> {
        let mut df = report.to_dataframe()?;
        CsvWriter::new(writer).finish(&mut df)?;
        Ok(())
    }
}
