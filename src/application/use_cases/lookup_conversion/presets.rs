// ============================================================
// LOOKUP PRESETS
// ============================================================
// Ready-made field mappings and routing for asset and identity lookups

use serde::{Deserialize, Serialize};

use crate::application::use_cases::field_mappings::{
    BooleanField, ConversionSpec, DerivedField, FieldAttributes, IdentityField, IpField,
    MacField, PriorityField, StringField,
};
use crate::domain::error::Result;
use crate::domain::lookup::{
    AncillaryConfig, ConversionPolicy, DestinationConfig, IdentityMatchConfig, RouteConfig,
    RoutePredicate, RoutingConfig,
};

const MULTI_DELIM: &str = "|";

pub const ASSET_BY_STR: &str = "asset_lookup_by_str";
pub const ASSET_BY_CIDR: &str = "asset_lookup_by_cidr";
pub const IDENTITY_EXPANDED: &str = "identity_lookup_expanded";

pub const ASSET_FIELDS: &[&str] = &[
    "ip",
    "mac",
    "nt_host",
    "dns",
    "owner",
    "priority",
    "lat",
    "long",
    "city",
    "country",
    "bunit",
    "category",
    "pci_domain",
    "is_expected",
    "should_timesync",
    "should_update",
    "requires_av",
    "asset_id",
];

pub const IDENTITY_FIELDS: &[&str] = &[
    "identity",
    "prefix",
    "nick",
    "first",
    "last",
    "suffix",
    "email",
    "phone",
    "managed_by",
    "priority",
    "bunit",
    "category",
    "watchlist",
    "start_date",
    "end_date",
];

/// Which family of lookup tables a job produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    #[default]
    Assets,
    Identities,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKind::Assets => write!(f, "assets"),
            LookupKind::Identities => write!(f, "identities"),
        }
    }
}

/// Asset mappings: any of ip, mac, nt_host or dns identifies the asset
pub fn asset_spec(policy: ConversionPolicy, min_prefix_len: u32) -> Result<ConversionSpec> {
    let mut spec = ConversionSpec::new(policy);
    spec.register(IpField::new(
        FieldAttributes::new("ip").key().delimited(MULTI_DELIM),
        min_prefix_len,
    ))?;
    spec.register(MacField::new(
        FieldAttributes::new("mac").key().delimited(MULTI_DELIM),
    ))?;
    spec.register(StringField::hostname(
        FieldAttributes::new("nt_host").key().delimited(MULTI_DELIM),
    ))?;
    spec.register(StringField::hostname(
        FieldAttributes::new("dns").key().delimited(MULTI_DELIM),
    ))?;
    spec.register(StringField::new(FieldAttributes::new("owner").persistent()))?;
    spec.register(PriorityField::new(FieldAttributes::new("priority")))?;
    for name in ["lat", "long", "city", "country"] {
        spec.register(StringField::named(name))?;
    }
    spec.register(StringField::new(FieldAttributes::new("bunit").persistent()))?;
    spec.register(StringField::new(
        FieldAttributes::new("category").tracked().delimited(MULTI_DELIM),
    ))?;
    spec.register(StringField::new(
        FieldAttributes::new("pci_domain").tracked().delimited(MULTI_DELIM),
    ))?;
    for name in ["is_expected", "should_timesync", "should_update", "requires_av"] {
        spec.register(BooleanField::new(FieldAttributes::new(name)))?;
    }
    spec.register(DerivedField::joined(
        FieldAttributes::new("asset_id")
            .persistent()
            .depends_on(["mac", "nt_host", "dns"]),
        MULTI_DELIM,
    ))?;
    Ok(spec)
}

/// Single addresses and names go to the string table, blocks to the CIDR table
pub fn asset_routing() -> RoutingConfig {
    RoutingConfig {
        destinations: vec![
            DestinationConfig::new(ASSET_BY_STR, "asset_lookup_by_str.csv", ASSET_FIELDS.iter().copied()),
            DestinationConfig::new(ASSET_BY_CIDR, "asset_lookup_by_cidr.csv", ASSET_FIELDS.iter().copied()),
        ],
        routes: vec![
            RouteConfig::new("ip", ASSET_BY_STR).rule(
                RoutePredicate::Contains {
                    value: "/".to_string(),
                },
                ASSET_BY_CIDR,
            ),
            RouteConfig::new("mac", ASSET_BY_STR),
            RouteConfig::new("nt_host", ASSET_BY_STR),
            RouteConfig::new("dns", ASSET_BY_STR),
        ],
        ancillary: vec![
            AncillaryConfig::new("category", "asset_categories.csv"),
            AncillaryConfig::new("pci_domain", "asset_pci_domains.csv"),
        ],
    }
}

/// Identity mappings keyed on the resolved candidate list
pub fn identity_spec(policy: ConversionPolicy, matching: IdentityMatchConfig) -> Result<ConversionSpec> {
    let mut spec = ConversionSpec::new(policy);
    spec.register(IdentityField::new("identity", matching))?;
    for name in ["prefix", "nick", "first", "last", "suffix"] {
        spec.register(StringField::named(name))?;
    }
    spec.register(StringField::new(FieldAttributes::new("email").persistent()))?;
    spec.register(StringField::named("phone"))?;
    spec.register(StringField::named("managed_by"))?;
    spec.register(PriorityField::new(FieldAttributes::new("priority")))?;
    spec.register(StringField::new(FieldAttributes::new("bunit").persistent()))?;
    spec.register(StringField::new(
        FieldAttributes::new("category").tracked().delimited(MULTI_DELIM),
    ))?;
    spec.register(BooleanField::new(FieldAttributes::new("watchlist")))?;
    spec.register(StringField::named("start_date"))?;
    spec.register(StringField::named("end_date"))?;
    Ok(spec)
}

pub fn identity_routing() -> RoutingConfig {
    RoutingConfig {
        destinations: vec![DestinationConfig::new(
            IDENTITY_EXPANDED,
            "identity_lookup_expanded.csv",
            IDENTITY_FIELDS.iter().copied(),
        )],
        routes: vec![RouteConfig::new("identity", IDENTITY_EXPANDED)],
        ancillary: vec![AncillaryConfig::new("category", "identity_categories.csv")],
    }
}
