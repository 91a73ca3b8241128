// ============================================================
// JOB CONFIGURATION
// ============================================================
// Defaults, then an optional TOML file, then LOOKUPGEN_* environment variables

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::application::use_cases::lookup_conversion::{asset_routing, identity_routing, LookupKind};
use crate::domain::error::Result;
use crate::domain::lookup::{
    AncillaryConfig, ConversionPolicy, DestinationConfig, IdentityMatchConfig, RouteConfig,
    RoutingConfig,
};

pub const ENV_PREFIX: &str = "LOOKUPGEN_";

/// One lookup generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LookupJobConfig {
    #[validate(length(min = 1, max = 256))]
    pub name: String,

    pub kind: LookupKind,

    /// Source CSV files, read in order
    pub inputs: Vec<PathBuf>,

    #[validate(length(min = 1))]
    pub output_dir: String,

    /// Input delimiter; sniffed per file when unset
    pub delimiter: Option<char>,

    pub allow_custom: bool,
    pub allow_mv_keys: bool,
    pub eliminate_duplicates: bool,
    pub merge_fields: Vec<String>,
    pub strict: bool,

    /// Convert and write record by record instead of buffering the batch
    pub streaming: bool,

    /// Widest CIDR block emitted for an address range
    #[validate(range(max = 32))]
    pub min_prefix_len: u32,

    pub identity: IdentityMatchConfig,

    /// Routing overrides; the preset for `kind` applies when all three are empty
    pub destinations: Vec<DestinationConfig>,
    pub routes: Vec<RouteConfig>,
    pub ancillary: Vec<AncillaryConfig>,
}

impl Default for LookupJobConfig {
    fn default() -> Self {
        Self {
            name: "lookupgen".to_string(),
            kind: LookupKind::Assets,
            inputs: Vec::new(),
            output_dir: "lookups".to_string(),
            delimiter: Some(','),
            allow_custom: false,
            allow_mv_keys: true,
            eliminate_duplicates: false,
            merge_fields: Vec::new(),
            strict: false,
            streaming: false,
            min_prefix_len: 16,
            identity: IdentityMatchConfig::default(),
            destinations: Vec::new(),
            routes: Vec::new(),
            ancillary: Vec::new(),
        }
    }
}

impl LookupJobConfig {
    /// Defaults, `path` when given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(LookupJobConfig::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading job configuration file");
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: LookupJobConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn policy(&self) -> ConversionPolicy {
        ConversionPolicy {
            allow_custom: self.allow_custom,
            allow_mv_keys: self.allow_mv_keys,
            eliminate_duplicates: self.eliminate_duplicates,
            merge_fields: self.merge_fields.clone(),
            strict: self.strict,
        }
    }

    pub fn routing(&self) -> RoutingConfig {
        let configured = RoutingConfig {
            destinations: self.destinations.clone(),
            routes: self.routes.clone(),
            ancillary: self.ancillary.clone(),
        };
        if !configured.is_empty() {
            return configured;
        }
        match self.kind {
            LookupKind::Assets => asset_routing(),
            LookupKind::Identities => identity_routing(),
        }
    }

    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter
            .filter(char::is_ascii)
            .map(|delimiter| delimiter as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::lookup::MatchStrategy;

    fn from_toml(toml: &str) -> Result<LookupJobConfig> {
        LookupJobConfig::from_figment(
            Figment::from(Serialized::defaults(LookupJobConfig::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = from_toml("").unwrap();
        assert_eq!(config, LookupJobConfig::default());
        assert_eq!(config.routing(), asset_routing());
    }

    #[test]
    fn test_toml_overrides() {
        let config = from_toml(
            r#"
            name = "identities-nightly"
            kind = "identities"
            inputs = ["a.csv", "b.csv"]
            merge_fields = ["category"]
            streaming = true

            [identity]
            match_order = ["email", "exact"]
            convention = true
            conventions = ["first(1)last()"]
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, LookupKind::Identities);
        assert_eq!(config.inputs.len(), 2);
        assert!(config.streaming);
        assert_eq!(config.policy().merge_fields, vec!["category"]);
        assert_eq!(config.identity.match_order, vec![MatchStrategy::Email, MatchStrategy::Exact]);
        assert!(config.identity.convention);
        assert!(config.identity.email);
        assert_eq!(config.routing(), identity_routing());
    }

    #[test]
    fn test_custom_routing_replaces_preset() {
        let config = from_toml(
            r#"
            [[destinations]]
            name = "hosts"
            file = "hosts.csv"
            fields = ["nt_host"]

            [[routes]]
            field = "nt_host"
            default = "hosts"

            [[routes.rules]]
            kind = "suffix"
            value = ".corp"
            destination = "hosts"
            "#,
        )
        .unwrap();

        let routing = config.routing();
        assert_eq!(routing.destinations.len(), 1);
        assert_eq!(routing.routes[0].rules.len(), 1);
        assert!(routing.ancillary.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            from_toml("min_prefix_len = 33"),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(from_toml("name = \"\""), Err(AppError::ValidationError(_))));
        assert!(matches!(from_toml("output_dir = \"\""), Err(AppError::ValidationError(_))));
        assert!(matches!(from_toml("kind = \"printers\""), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_delimiter_byte() {
        let mut config = LookupJobConfig::default();
        assert_eq!(config.delimiter_byte(), Some(b','));
        config.delimiter = None;
        assert_eq!(config.delimiter_byte(), None);
    }
}
