// ============================================================
// OUTPUT ROUTING
// ============================================================
// Sends row groups to their destination tables and finalizes them together

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::domain::error::{AppError, Result};
use crate::domain::lookup::{
    AncillaryConfig, DestinationConfig, OutputRow, RoutePredicate, RouteConfig, RowGroup,
    RoutingConfig, TrackedValues,
};
use crate::infrastructure::csv::LookupTableWriter;
use crate::infrastructure::staging::StagingArea;

/// Value written into every cell of a table nothing was routed to
pub const NO_MATCH_SENTINEL: &str = "__lookupgen_no_match__";

type Matcher = Box<dyn Fn(&str) -> bool + Send>;

struct CompiledRule {
    matcher: Matcher,
    destination: String,
}

struct CompiledRoute {
    default: String,
    rules: Vec<CompiledRule>,
}

fn compile(predicate: &RoutePredicate) -> Result<Matcher> {
    Ok(match predicate.clone() {
        RoutePredicate::Equals { value } => Box::new(move |candidate: &str| candidate == value),
        RoutePredicate::Contains { value } => {
            Box::new(move |candidate: &str| candidate.contains(value.as_str()))
        }
        RoutePredicate::Prefix { value } => {
            Box::new(move |candidate: &str| candidate.starts_with(value.as_str()))
        }
        RoutePredicate::Suffix { value } => {
            Box::new(move |candidate: &str| candidate.ends_with(value.as_str()))
        }
        RoutePredicate::Matches { pattern } => {
            let regex = Regex::new(&pattern).map_err(|e| {
                AppError::RoutingError(format!("Invalid route pattern '{}': {}", pattern, e))
            })?;
            Box::new(move |candidate: &str| regex.is_match(candidate))
        }
    })
}

/// Key field to destination resolution, checked when built
pub struct RoutingTable {
    destinations: Vec<DestinationConfig>,
    routes: HashMap<String, CompiledRoute>,
}

impl RoutingTable {
    /// Every key field needs a route and every route target must be declared
    pub fn new(
        destinations: &[DestinationConfig],
        routes: &[RouteConfig],
        key_fields: &[String],
    ) -> Result<Self> {
        let mut declared: Vec<&str> = Vec::new();
        for destination in destinations {
            if destination.name.trim().is_empty() || destination.file.trim().is_empty() {
                return Err(AppError::RoutingError(
                    "Destinations need a name and a file".to_string(),
                ));
            }
            if declared.contains(&destination.name.as_str()) {
                return Err(AppError::RoutingError(format!(
                    "Destination '{}' declared twice",
                    destination.name
                )));
            }
            declared.push(&destination.name);
        }

        let check = |name: &str, field: &str| -> Result<()> {
            if declared.contains(&name) {
                Ok(())
            } else {
                Err(AppError::RoutingError(format!(
                    "Field '{}' routes to undeclared destination '{}'",
                    field, name
                )))
            }
        };

        let mut compiled: HashMap<String, CompiledRoute> = HashMap::new();
        for route in routes {
            if compiled.contains_key(&route.field) {
                return Err(AppError::RoutingError(format!(
                    "Field '{}' has more than one route",
                    route.field
                )));
            }
            check(&route.default, &route.field)?;
            let mut rules = Vec::with_capacity(route.rules.len());
            for rule in &route.rules {
                check(&rule.destination, &route.field)?;
                rules.push(CompiledRule {
                    matcher: compile(&rule.predicate)?,
                    destination: rule.destination.clone(),
                });
            }
            compiled.insert(
                route.field.clone(),
                CompiledRoute {
                    default: route.default.clone(),
                    rules,
                },
            );
        }

        for field in key_fields {
            if !compiled.contains_key(field) {
                return Err(AppError::RoutingError(format!(
                    "Key field '{}' has no destination",
                    field
                )));
            }
        }

        Ok(Self {
            destinations: destinations.to_vec(),
            routes: compiled,
        })
    }

    pub fn destinations(&self) -> &[DestinationConfig] {
        &self.destinations
    }

    /// Destination for one key value; the last matching rule wins
    pub fn route(&self, field: &str, value: &str) -> Result<&str> {
        let route = self.routes.get(field).ok_or_else(|| {
            AppError::RoutingError(format!("Key field '{}' has no destination", field))
        })?;
        let destination = route
            .rules
            .iter()
            .filter(|rule| (rule.matcher)(value))
            .last()
            .map_or(route.default.as_str(), |rule| rule.destination.as_str());
        Ok(destination)
    }
}

/// Rows per written table, keyed by destination name or ancillary field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedOutput {
    pub rows: BTreeMap<String, usize>,
    pub files: Vec<PathBuf>,
}

/// Writes row groups into staged destination tables
pub struct OutputRouter {
    table: RoutingTable,
    ancillary: Vec<AncillaryConfig>,
    output_dir: PathBuf,
    staging: StagingArea,
    open: BTreeMap<String, LookupTableWriter>,
}

impl OutputRouter {
    pub fn new(table: RoutingTable, ancillary: Vec<AncillaryConfig>, output_dir: &Path) -> Result<Self> {
        let mut staging = StagingArea::new();
        let mut open = BTreeMap::new();
        for destination in table.destinations() {
            let staged = staging.stage(output_dir.join(&destination.file))?;
            let writer = LookupTableWriter::create(&staged.temp, &destination.fields)?;
            open.insert(destination.name.clone(), writer);
        }
        Ok(Self {
            table,
            ancillary,
            output_dir: output_dir.to_path_buf(),
            staging,
            open,
        })
    }

    /// Build the routing table for `key_fields` and open every destination
    pub fn from_config(config: &RoutingConfig, key_fields: &[String], output_dir: &Path) -> Result<Self> {
        let table = RoutingTable::new(&config.destinations, &config.routes, key_fields)?;
        Self::new(table, config.ancillary.clone(), output_dir)
    }

    pub fn write_group(&mut self, group: &RowGroup) -> Result<()> {
        let destination = self.table.route(&group.key_field, &group.key_value)?.to_string();
        debug!(
            key_field = %group.key_field,
            key_value = %group.key_value,
            destination = %destination,
            rows = group.rows.len(),
            "Routing row group"
        );
        let writer = self.open.get_mut(&destination).ok_or_else(|| {
            AppError::RoutingError(format!("Destination '{}' is not open", destination))
        })?;
        for row in &group.rows {
            writer.write_row(row)?;
        }
        Ok(())
    }

    /// Drop every staged table without touching existing outputs
    pub fn abort(mut self) {
        self.open.clear();
        self.staging.abort();
    }

    /// Write the tracked values, then move every table into place.
    /// Tables that received no rows get a sentinel row.
    pub fn finalize(mut self, tracked: &TrackedValues) -> Result<RoutedOutput> {
        let result = self.finalize_inner(tracked);
        match result {
            Ok(rows) => {
                let files = self.staging.commit()?;
                info!(
                    dir = %self.output_dir.display(),
                    tables = files.len(),
                    "Lookup tables written"
                );
                Ok(RoutedOutput { rows, files })
            }
            Err(e) => {
                self.staging.abort();
                Err(e)
            }
        }
    }

    fn finalize_inner(&mut self, tracked: &TrackedValues) -> Result<BTreeMap<String, usize>> {
        let mut rows = BTreeMap::new();

        for (name, mut writer) in std::mem::take(&mut self.open) {
            if writer.rows() == 0 {
                debug!(destination = %name, "No rows routed; writing sentinel");
                writer.write_filler(NO_MATCH_SENTINEL)?;
                writer.finish()?;
                rows.insert(name, 0);
            } else {
                rows.insert(name, writer.finish()?);
            }
        }

        for ancillary in &self.ancillary {
            let staged = self.staging.stage(self.output_dir.join(&ancillary.file))?;
            let mut writer =
                LookupTableWriter::create(&staged.temp, std::slice::from_ref(&ancillary.field))?;
            for value in tracked.get(&ancillary.field) {
                let mut row = OutputRow::new();
                row.insert(ancillary.field.clone(), value.clone());
                writer.write_row(&row)?;
            }
            rows.insert(ancillary.field.clone(), writer.finish()?);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn destinations() -> Vec<DestinationConfig> {
        vec![
            DestinationConfig::new("by_str", "by_str.csv", ["ip", "owner"]),
            DestinationConfig::new("by_cidr", "by_cidr.csv", ["ip", "owner"]),
            DestinationConfig::new("special", "special.csv", ["ip"]),
        ]
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let route = RouteConfig::new("ip", "by_str")
            .rule(
                RoutePredicate::Contains {
                    value: "/".to_string(),
                },
                "by_cidr",
            )
            .rule(
                RoutePredicate::Prefix {
                    value: "10.".to_string(),
                },
                "special",
            );
        let table = RoutingTable::new(&destinations(), &[route], &keys(&["ip"])).unwrap();

        assert_eq!(table.route("ip", "192.168.0.1").unwrap(), "by_str");
        assert_eq!(table.route("ip", "192.168.0.0/24").unwrap(), "by_cidr");
        assert_eq!(table.route("ip", "10.0.0.0/8").unwrap(), "special");
    }

    #[test]
    fn test_regex_predicate() {
        let route = RouteConfig::new("ip", "by_str").rule(
            RoutePredicate::Matches {
                pattern: r"/\d+$".to_string(),
            },
            "by_cidr",
        );
        let table = RoutingTable::new(&destinations(), &[route], &keys(&["ip"])).unwrap();
        assert_eq!(table.route("ip", "1.2.3.0/24").unwrap(), "by_cidr");
    }

    #[test]
    fn test_misconfiguration_is_fatal() {
        let missing_key = RoutingTable::new(&destinations(), &[RouteConfig::new("ip", "by_str")], &keys(&["ip", "mac"]));
        assert!(matches!(missing_key, Err(AppError::RoutingError(_))));

        let undeclared = RoutingTable::new(&destinations(), &[RouteConfig::new("ip", "nowhere")], &keys(&["ip"]));
        assert!(matches!(undeclared, Err(AppError::RoutingError(_))));

        let bad_pattern = RoutingTable::new(
            &destinations(),
            &[RouteConfig::new("ip", "by_str").rule(
                RoutePredicate::Matches {
                    pattern: "(".to_string(),
                },
                "by_cidr",
            )],
            &keys(&["ip"]),
        );
        assert!(matches!(bad_pattern, Err(AppError::RoutingError(_))));
    }

    #[test]
    fn test_router_materializes_every_destination() {
        let dir = std::env::temp_dir().join(format!("lookupgen-router-{}", Uuid::new_v4()));
        let config = RoutingConfig {
            destinations: destinations(),
            routes: vec![RouteConfig::new("ip", "by_str").rule(
                RoutePredicate::Contains {
                    value: "/".to_string(),
                },
                "by_cidr",
            )],
            ancillary: vec![AncillaryConfig::new("category", "categories.csv")],
        };
        let mut router = OutputRouter::from_config(&config, &keys(&["ip"]), &dir).unwrap();

        let mut group = RowGroup::new("ip", "10.0.0.1");
        let mut row = OutputRow::new();
        row.insert("ip".to_string(), "10.0.0.1".to_string());
        row.insert("owner".to_string(), "ops".to_string());
        group.rows.push(row);
        router.write_group(&group).unwrap();

        let mut tracked = TrackedValues::default();
        tracked.insert("category", "server");
        tracked.insert("category", "pci");

        let output = router.finalize(&tracked).unwrap();
        assert_eq!(output.rows["by_str"], 1);
        assert_eq!(output.rows["by_cidr"], 0);
        assert_eq!(output.rows["category"], 2);
        assert_eq!(output.files.len(), 4);

        assert_eq!(
            fs::read_to_string(dir.join("by_str.csv")).unwrap(),
            "ip,owner\n10.0.0.1,ops\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join("by_cidr.csv")).unwrap(),
            format!("ip,owner\n{0},{0}\n", NO_MATCH_SENTINEL)
        );
        assert_eq!(
            fs::read_to_string(dir.join("special.csv")).unwrap(),
            format!("ip\n{}\n", NO_MATCH_SENTINEL)
        );
        assert_eq!(
            fs::read_to_string(dir.join("categories.csv")).unwrap(),
            "category\nserver\npci\n"
        );
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 4);

        fs::remove_dir_all(&dir).ok();
    }
}
