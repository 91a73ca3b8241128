// ============================================================
// LOOKUP TABLE WRITER
// ============================================================
// Writes flat rows under a fixed header

use std::fs::File;
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::domain::error::{AppError, Result};
use crate::domain::lookup::OutputRow;

/// CSV writer bound to one lookup table header.
/// Row fields outside the header are not written; absent ones are blank.
pub struct LookupTableWriter {
    fields: Vec<String>,
    writer: Writer<File>,
    rows: usize,
}

impl LookupTableWriter {
    pub fn create(path: &Path, fields: &[String]) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| AppError::IoError(format!("Failed to create {}: {}", path.display(), e)))?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer.write_record(fields)?;
        Ok(Self {
            fields: fields.to_vec(),
            writer,
            rows: 0,
        })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Data rows written so far, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_row(&mut self, row: &OutputRow) -> Result<()> {
        let cells = self
            .fields
            .iter()
            .map(|field| row.get(field).map(String::as_str).unwrap_or(""));
        self.writer.write_record(cells)?;
        self.rows += 1;
        Ok(())
    }

    /// Every cell set to `value`
    pub fn write_filler(&mut self, value: &str) -> Result<()> {
        self.writer.write_record(self.fields.iter().map(|_| value))?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}
