// ============================================================
// LOOKUP JOB
// ============================================================
// Reads the configured sources, converts, formats and routes them

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::ConversionEngine;
use super::formatter::{OutputFormatter, StreamFormatter};
use super::presets::{asset_spec, identity_spec, LookupKind};
use crate::application::use_cases::field_mappings::ConversionSpec;
use crate::domain::error::Result;
use crate::domain::lookup::{Diagnostics, SourceBatch, TrackedValues};
use crate::infrastructure::config::LookupJobConfig;
use crate::infrastructure::csv::CsvParser;
use crate::infrastructure::routing::{OutputRouter, RoutedOutput};

/// Outcome of one job run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub kind: LookupKind,
    pub generated_at: DateTime<Utc>,
    pub streaming: bool,
    pub records_read: usize,
    pub records_converted: usize,
    /// Data rows per destination or ancillary field; sentinel rows count as zero
    pub rows_written: BTreeMap<String, usize>,
    pub files: Vec<PathBuf>,
    pub diagnostics: Diagnostics,
}

pub struct LookupJob {
    config: LookupJobConfig,
}

struct Converted {
    records_read: usize,
    records_converted: usize,
    diagnostics: Diagnostics,
}

impl LookupJob {
    pub fn new(config: LookupJobConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LookupJobConfig {
        &self.config
    }

    /// Preset field mappings for the configured lookup kind
    pub fn build_spec(&self) -> Result<ConversionSpec> {
        match self.config.kind {
            LookupKind::Assets => asset_spec(self.config.policy(), self.config.min_prefix_len),
            LookupKind::Identities => identity_spec(self.config.policy(), self.config.identity.clone()),
        }
    }

    pub fn read_inputs(&self) -> Result<Vec<SourceBatch>> {
        let parser = match self.config.delimiter_byte() {
            Some(delimiter) => CsvParser::new().with_delimiter(delimiter),
            None => CsvParser::new().auto_detect(),
        };
        self.config
            .inputs
            .iter()
            .map(|path| parser.parse_file(path))
            .collect()
    }

    pub fn run(&self) -> Result<JobReport> {
        let sources = self.read_inputs()?;
        self.run_sources(&sources)
    }

    /// Convert `sources` and write every lookup table of the job.
    /// Nothing is moved into the output directory unless the whole run succeeds.
    pub fn run_sources(&self, sources: &[SourceBatch]) -> Result<JobReport> {
        let spec = self.build_spec()?;
        let key_fields = spec.registry.key_fields();
        let formatter = OutputFormatter::new(&spec);
        let mut router = OutputRouter::from_config(
            &self.config.routing(),
            &key_fields,
            Path::new(&self.config.output_dir),
        )?;
        let mut engine = ConversionEngine::new(spec);

        info!(
            job = %self.config.name,
            kind = %self.config.kind,
            sources = sources.len(),
            streaming = self.config.streaming,
            "Starting lookup job"
        );

        let converted = if self.config.streaming {
            Self::run_streamed(&mut engine, formatter, &mut router, sources)
        } else {
            Self::run_buffered(&mut engine, &formatter, &mut router, sources)
        };

        let (converted, tracked) = match converted {
            Ok(done) => done,
            Err(e) => {
                warn!(job = %self.config.name, error = %e, "Lookup job failed; discarding staged tables");
                router.abort();
                return Err(e);
            }
        };

        let RoutedOutput { rows, files } = router.finalize(&tracked)?;
        let report = JobReport {
            job: self.config.name.clone(),
            kind: self.config.kind,
            generated_at: Utc::now(),
            streaming: self.config.streaming,
            records_read: converted.records_read,
            records_converted: converted.records_converted,
            rows_written: rows,
            files,
            diagnostics: converted.diagnostics,
        };
        info!(
            job = %report.job,
            read = report.records_read,
            converted = report.records_converted,
            "Lookup job complete"
        );
        Ok(report)
    }

    fn run_buffered(
        engine: &mut ConversionEngine,
        formatter: &OutputFormatter,
        router: &mut OutputRouter,
        sources: &[SourceBatch],
    ) -> Result<(Converted, TrackedValues)> {
        let batch = engine.convert_batch(sources)?;
        let formatted = formatter.format_output(&batch.records);
        for group in &formatted.groups {
            router.write_group(group)?;
        }

        let mut diagnostics = batch.diagnostics;
        diagnostics.merge(formatted.diagnostics);
        Ok((
            Converted {
                records_read: batch.records_read,
                records_converted: batch.records.len(),
                diagnostics,
            },
            batch.tracked,
        ))
    }

    fn run_streamed(
        engine: &mut ConversionEngine,
        formatter: OutputFormatter,
        router: &mut OutputRouter,
        sources: &[SourceBatch],
    ) -> Result<(Converted, TrackedValues)> {
        let mut stream = StreamFormatter::new(formatter);
        let summary = engine.convert_streamed(sources, |record| {
            for group in stream.format_record(&record) {
                router.write_group(&group)?;
            }
            Ok(())
        })?;

        let mut diagnostics = summary.diagnostics;
        diagnostics.merge(stream.diagnostics);
        Ok((
            Converted {
                records_read: summary.records_read,
                records_converted: summary.records_converted,
                diagnostics,
            },
            summary.tracked,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::lookup::InputRecord;
    use std::fs;
    use uuid::Uuid;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lookupgen-job-{}-{}", tag, Uuid::new_v4()))
    }

    fn source(name: &str, header: &[&str], rows: &[&[&str]]) -> SourceBatch {
        let records = rows
            .iter()
            .map(|row| InputRecord::from_pairs(header.iter().copied().zip(row.iter().copied())))
            .collect();
        SourceBatch::new(name, records)
    }

    fn config(kind: LookupKind, dir: &Path) -> LookupJobConfig {
        LookupJobConfig {
            name: "test".to_string(),
            kind,
            output_dir: dir.display().to_string(),
            ..Default::default()
        }
    }

    fn data_lines(path: PathBuf) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn identities() -> SourceBatch {
        source(
            "identities.csv",
            &["identity", "first", "last", "email", "category"],
            &[&["jdoe|JDoe2", "Jane", "Doe", "Jane.Doe@corp.com", "staff"]],
        )
    }

    #[test]
    fn test_identity_job_expands_candidates() {
        let dir = temp_dir("identity");
        let report = LookupJob::new(config(LookupKind::Identities, &dir))
            .run_sources(&[identities()])
            .unwrap();

        assert_eq!(report.records_read, 1);
        assert_eq!(report.records_converted, 1);
        assert_eq!(report.rows_written["identity_lookup_expanded"], 4);
        assert_eq!(report.rows_written["category"], 1);

        let keys: Vec<String> = data_lines(dir.join("identity_lookup_expanded.csv"))
            .iter()
            .map(|line| line.split(',').next().unwrap_or("").to_string())
            .collect();
        assert_eq!(keys, vec!["jdoe", "jdoe2", "jane.doe@corp.com", "jane.doe"]);
        assert_eq!(data_lines(dir.join("identity_categories.csv")), vec!["staff"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_streamed_identity_job_matches_buffered() {
        let dir = temp_dir("stream");
        let mut cfg = config(LookupKind::Identities, &dir);
        cfg.streaming = true;
        let report = LookupJob::new(cfg).run_sources(&[identities()]).unwrap();

        assert!(report.streaming);
        assert_eq!(report.records_converted, 1);
        assert_eq!(report.rows_written["identity_lookup_expanded"], 4);
        fs::remove_dir_all(&dir).ok();
    }

    fn run_assets(tag: &str, rows: &[&[&str]]) -> (PathBuf, JobReport) {
        let dir = temp_dir(tag);
        let assets = source("assets.csv", &["ip", "nt_host", "owner", "category"], rows);
        let report = LookupJob::new(config(LookupKind::Assets, &dir))
            .run_sources(&[assets])
            .unwrap();
        (dir, report)
    }

    #[test]
    fn test_asset_job_routes_addresses_and_blocks() {
        let (dir, report) = run_assets(
            "assets",
            &[
                &["10.0.0.0/24", "web01", "ops", "server"],
                &["10.0.0.5", "db01", "dba", "db|pci"],
            ],
        );

        assert_eq!(report.records_converted, 2);
        assert_eq!(report.diagnostics.total(Diagnostics::DUPLICATE_KEY), 0);

        let by_str = data_lines(dir.join("asset_lookup_by_str.csv"));
        let by_cidr = data_lines(dir.join("asset_lookup_by_cidr.csv"));
        assert!(by_str.iter().any(|line| line.starts_with("10.0.0.5,,db01,,dba,unknown")));
        assert!(by_str.iter().any(|line| line.starts_with("10.0.0.4,,web01,")));
        assert!(!by_str.iter().any(|line| line.starts_with("10.0.0.5,,web01,")));
        assert!(by_cidr.iter().any(|line| line.starts_with("10.0.0.0/30,,web01,")));
        assert!(by_cidr.iter().any(|line| line.starts_with("10.0.0.6/31,,web01,")));
        assert!(by_cidr.iter().any(|line| line.starts_with("10.0.0.128/25,,web01,")));

        assert_eq!(
            data_lines(dir.join("asset_categories.csv")),
            vec!["server", "db", "pci"]
        );
        assert_eq!(report.rows_written["pci_domain"], 0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_single_address_owns_its_row_before_or_after_subnet() {
        let subnet: &[&str] = &["10.0.0.0/24", "web01", "ops", "server"];
        let host: &[&str] = &["10.0.0.5", "db01", "dba", "db"];

        for (tag, rows) in [("host-last", [subnet, host]), ("host-first", [host, subnet])] {
            let (dir, report) = run_assets(tag, &rows);
            let by_str = data_lines(dir.join("asset_lookup_by_str.csv"));
            let owners: Vec<&String> = by_str
                .iter()
                .filter(|line| line.starts_with("10.0.0.5,"))
                .collect();

            assert_eq!(owners.len(), 1, "{tag}");
            assert!(owners[0].starts_with("10.0.0.5,,db01,"), "{tag}");
            assert_eq!(report.diagnostics.total(Diagnostics::DUPLICATE_KEY), 0, "{tag}");
            fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn test_overlapping_subnets_go_to_first_record() {
        let (dir, report) = run_assets(
            "subnets",
            &[
                &["10.0.0.0/30", "web01", "ops", ""],
                &["10.0.0.0/30", "web02", "dev", ""],
            ],
        );

        // equal priority: the later record's identical key is dropped
        // because no merge fields are configured
        assert_eq!(report.diagnostics.total(Diagnostics::DUPLICATE_KEY), 1);
        let by_cidr = data_lines(dir.join("asset_lookup_by_cidr.csv"));
        assert!(by_cidr.iter().any(|line| line.starts_with("10.0.0.0/30,,web01,")));
        assert!(!by_cidr.iter().any(|line| line.contains("web02")));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_streamed_asset_job_is_rejected_without_output() {
        let dir = temp_dir("reject");
        let mut cfg = config(LookupKind::Assets, &dir);
        cfg.streaming = true;
        let result = LookupJob::new(cfg).run_sources(&[source("a.csv", &["ip"], &[&["10.0.0.1"]])]);

        assert!(matches!(result, Err(AppError::ConfigError(_))));
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_reads_configured_inputs() {
        let dir = temp_dir("inputs");
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("identities.csv");
        fs::write(&input, "identity,email\nasmith,a.smith@corp.com\n").unwrap();

        let mut cfg = config(LookupKind::Identities, &dir.join("out"));
        cfg.inputs = vec![input];
        let report = LookupJob::new(cfg).run().unwrap();

        assert_eq!(report.records_read, 1);
        assert_eq!(report.rows_written["identity_lookup_expanded"], 3);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "identities");
        assert_eq!(json["diagnostics"]["missing_fields"], 1);

        fs::remove_dir_all(&dir).ok();
    }
}
