// ============================================================
// CSV PARSER
// ============================================================
// Header-driven reader turning lookup source files into input records

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::lookup::{InputRecord, SourceBatch};

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 10;

/// CSV parser with UTF-8 / Windows-1252 decoding
pub struct CsvParser {
    /// Field delimiter; sniffed from the content when unset
    delimiter: Option<u8>,

    /// Whether to trim whitespace around values
    trim: bool,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: Some(b','),
            trim: true,
        }
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Pick the delimiter per file from its first lines
    pub fn auto_detect(mut self) -> Self {
        self.delimiter = None;
        self
    }

    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Read one source file; the batch is named after the file
    pub fn parse_file(&self, path: &Path) -> Result<SourceBatch> {
        let content = read_decoded(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let batch = self.parse_content(&name, &content)?;
        debug!(source = %name, records = batch.records.len(), "Parsed CSV source");
        Ok(batch)
    }

    /// Parse CSV text; the header row names the fields
    pub fn parse_content(&self, name: &str, content: &str) -> Result<SourceBatch> {
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| Self::detect_delimiter(content));
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(if self.trim { Trim::All } else { Trim::None })
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| AppError::ParseError(format!("Failed to read CSV headers of {}: {}", name, e)))?
            .clone();

        let mut records = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let row = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse {} row {}: {}", name, index + 1, e))
            })?;
            if row.len() > headers.len() {
                warn!(
                    source = %name,
                    row = index,
                    cells = row.len(),
                    columns = headers.len(),
                    "Row has more cells than the header; extra cells ignored"
                );
            }
            records.push(to_record(&headers, &row));
        }

        Ok(SourceBatch::new(name, records))
    }

    /// Most consistent candidate delimiter over the first lines, comma by default
    pub fn detect_delimiter(content: &str) -> u8 {
        let sample: Vec<&str> = content.lines().take(SNIFF_LINES).collect();
        if sample.is_empty() {
            return b',';
        }

        let mut best = b',';
        let mut best_score = 0.0f32;
        for &candidate in &DELIMITER_CANDIDATES {
            let counts: Vec<f32> = sample
                .iter()
                .map(|line| line.bytes().filter(|&b| b == candidate).count() as f32)
                .collect();
            let mean = counts.iter().sum::<f32>() / counts.len() as f32;
            let variance =
                counts.iter().map(|count| (count - mean).powi(2)).sum::<f32>() / counts.len() as f32;
            let score = mean / (1.0 + variance.sqrt());
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }
}

fn to_record(headers: &StringRecord, row: &StringRecord) -> InputRecord {
    InputRecord::from_pairs(
        headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.to_string(), row.get(idx).unwrap_or("").to_string())),
    )
}

/// UTF-8 first, Windows-1252 when the bytes are not valid UTF-8
fn read_decoded(path: &Path) -> Result<String> {
    let mut buffer = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    let buffer = buffer
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .map(<[u8]>::to_vec)
        .unwrap_or(buffer);

    match String::from_utf8(buffer) {
        Ok(content) => Ok(content),
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _, had_errors) = WINDOWS_1252.decode(&bytes);
            if had_errors {
                warn!(path = %path.display(), "Undecodable bytes replaced while reading CSV");
            }
            debug!(path = %path.display(), "Decoded CSV as Windows-1252");
            Ok(decoded.into_owned())
        }
    }
}
