// ============================================================
// ROUTING CONFIGURATION
// ============================================================
// Declared lookup destinations and the predicates that pick one per key value

use serde::{Deserialize, Serialize};

/// A physical lookup table with a fixed header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,

    /// File name relative to the job's output directory
    pub file: String,

    /// Header of the table; row fields outside this list are not written
    pub fields: Vec<String>,
}

impl DestinationConfig {
    pub fn new<I, S>(name: &str, file: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            file: file.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Test applied to a key value, never to the field name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutePredicate {
    Equals { value: String },
    Contains { value: String },
    Prefix { value: String },
    Suffix { value: String },
    Matches { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(flatten)]
    pub predicate: RoutePredicate,
    pub destination: String,
}

/// Routing for one key field: a default destination plus ordered rules.
/// When several rules match, the last one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub field: String,
    pub default: String,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

impl RouteConfig {
    pub fn new(field: &str, default: &str) -> Self {
        Self {
            field: field.to_string(),
            default: default.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, predicate: RoutePredicate, destination: &str) -> Self {
        self.rules.push(RouteRule {
            predicate,
            destination: destination.to_string(),
        });
        self
    }
}

/// Single-column table listing every distinct value of a tracked field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncillaryConfig {
    pub field: String,
    pub file: String,
}

impl AncillaryConfig {
    pub fn new(field: &str, file: &str) -> Self {
        Self {
            field: field.to_string(),
            file: file.to_string(),
        }
    }
}

/// Everything the router needs for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub ancillary: Vec<AncillaryConfig>,
}

impl RoutingConfig {
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty() && self.routes.is_empty() && self.ancillary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_rule_is_flat_in_json() {
        let rule = RouteRule {
            predicate: RoutePredicate::Contains {
                value: "/".to_string(),
            },
            destination: "by_cidr".to_string(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "contains", "value": "/", "destination": "by_cidr"})
        );
        let back: RouteRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
