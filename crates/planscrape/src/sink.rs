use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::OutputRow;

pub const CSV_HEADER: [&str; 3] = ["Address", "Name", "Email"];

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Output file error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for rows that passed the contact filter.
pub trait OutputSink {
    fn push(&mut self, row: OutputRow) -> Result<(), SinkError>;
}

fn csv_record(row: &OutputRow) -> [&str; 3] {
    [
        row.address.as_str(),
        row.name.as_deref().unwrap_or(""),
        row.email.as_str(),
    ]
}

/// Renders rows as CSV text with the Address/Name/Email header.
pub fn render_csv(rows: &[OutputRow]) -> Result<String, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record(csv_record(row))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| SinkError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Appends each row to a CSV file as soon as it arrives.
pub struct CsvFileSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    written: usize,
}

impl CsvFileSink {
    /// Opens `path` for appending, writing the header only into a new or empty file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        }

        Ok(Self {
            writer,
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl OutputSink for CsvFileSink {
    fn push(&mut self, row: OutputRow) -> Result<(), SinkError> {
        self.writer.write_record(csv_record(&row))?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Buffers rows in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Vec<OutputRow>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<OutputRow> {
        self.rows
    }

    pub fn to_csv(&self) -> Result<String, SinkError> {
        render_csv(&self.rows)
    }
}

impl OutputSink for MemorySink {
    fn push(&mut self, row: OutputRow) -> Result<(), SinkError> {
        self.rows.push(row);
        Ok(())
    }
}

/// JSON shape of a finished scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub data: Vec<OutputRow>,
    pub count: usize,
    pub months: Vec<String>,
    pub wards: Vec<String>,
}

impl ScrapeReport {
    pub fn new(data: Vec<OutputRow>, months: Vec<String>, wards: Vec<String>) -> Self {
        Self {
            count: data.len(),
            data,
            months,
            wards,
        }
    }
}
