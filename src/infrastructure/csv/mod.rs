// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Source file reading with encoding fallback, lookup table writing

mod csv_parser;
mod csv_writer;

pub use csv_parser::CsvParser;
pub use csv_writer::LookupTableWriter;
