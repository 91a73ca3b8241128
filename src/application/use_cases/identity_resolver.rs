use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::domain::lookup::{IdentityMatchConfig, MatchStrategy};

/// `field(N)` or `field()` inside a convention template
static CONVENTION_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\((\d*)\)").unwrap());

static EMAIL_LOCAL_PART_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^@]+)@").unwrap());

/// Field supplying the raw email address
pub const EMAIL_FIELD: &str = "email";

/// Builds the ordered candidate list for an identity record
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    config: IdentityMatchConfig,
}

impl IdentityResolver {
    pub fn new(config: IdentityMatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IdentityMatchConfig {
        &self.config
    }

    /// Raw fields the enabled strategies read besides the identity itself
    pub fn required_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.config.email {
            fields.push(EMAIL_FIELD.to_string());
        }
        if self.config.convention {
            for template in &self.config.conventions {
                for captures in CONVENTION_TOKEN_PATTERN.captures_iter(template) {
                    let name = captures[1].to_string();
                    if !fields.contains(&name) {
                        fields.push(name);
                    }
                }
            }
        }
        fields
    }

    /// Candidates in match order, de-duplicated first-seen-wins.
    /// `fields` holds the raw values of [`Self::required_fields`].
    pub fn resolve(&self, identity: &str, fields: &BTreeMap<String, String>) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for strategy in &self.config.match_order {
            if !self.config.is_enabled(*strategy) {
                continue;
            }
            let found = match strategy {
                MatchStrategy::Exact => exact_candidates(identity),
                MatchStrategy::Email => email_candidates(fields),
                MatchStrategy::EmailShort => email_short_candidates(fields),
                MatchStrategy::Convention => self.convention_candidates(fields),
            };
            for candidate in found {
                let candidate = if self.config.case_sensitive {
                    candidate
                } else {
                    candidate.to_lowercase()
                };
                if seen.insert(candidate.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        candidates
    }

    fn convention_candidates(&self, fields: &BTreeMap<String, String>) -> Vec<String> {
        self.config
            .conventions
            .iter()
            .filter_map(|template| expand_convention(template, fields))
            .collect()
    }
}

fn exact_candidates(identity: &str) -> Vec<String> {
    identity
        .split('|')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn email_value(fields: &BTreeMap<String, String>) -> Option<&str> {
    fields
        .get(EMAIL_FIELD)
        .map(|email| email.trim())
        .filter(|email| !email.is_empty())
}

fn email_candidates(fields: &BTreeMap<String, String>) -> Vec<String> {
    email_value(fields).map(str::to_string).into_iter().collect()
}

fn email_short_candidates(fields: &BTreeMap<String, String>) -> Vec<String> {
    email_value(fields)
        .and_then(|email| EMAIL_LOCAL_PART_PATTERN.captures(email))
        .map(|captures| captures[1].to_string())
        .into_iter()
        .collect()
}

/// Substitute every token of `template`; `None` when every substitution is empty.
fn expand_convention(template: &str, fields: &BTreeMap<String, String>) -> Option<String> {
    let mut substituted_any = false;
    let expanded = CONVENTION_TOKEN_PATTERN.replace_all(template, |captures: &regex::Captures| {
        let value = fields.get(&captures[1]).map(String::as_str).unwrap_or("");
        let value: String = match captures[2].parse::<usize>() {
            Ok(count) => value.chars().take(count).collect(),
            Err(_) => value.to_string(),
        };
        if !value.is_empty() {
            substituted_any = true;
        }
        value
    });

    if substituted_any {
        Some(expanded.trim().to_string()).filter(|value| !value.is_empty())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    fn config(order: &[MatchStrategy]) -> IdentityMatchConfig {
        IdentityMatchConfig {
            match_order: order.to_vec(),
            exact: false,
            email: false,
            email_short: false,
            convention: false,
            case_sensitive: false,
            conventions: Vec::new(),
        }
    }

    #[test]
    fn test_exact_then_email_order() {
        let mut cfg = config(&[MatchStrategy::Exact, MatchStrategy::Email]);
        cfg.exact = true;
        cfg.email = true;
        let resolver = IdentityResolver::new(cfg);

        let candidates = resolver.resolve("a|B", &fields(&[("email", "b@x.com")]));
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates, vec!["a", "b", "b@x.com"]);
    }

    #[test]
    fn test_case_insensitive_dedup_is_first_seen() {
        let mut cfg = config(&[MatchStrategy::Exact, MatchStrategy::Email, MatchStrategy::EmailShort]);
        cfg.exact = true;
        cfg.email = true;
        cfg.email_short = true;
        let resolver = IdentityResolver::new(cfg);

        let candidates = resolver.resolve("JDoe|jdoe", &fields(&[("email", "JDoe@corp.com")]));
        assert_eq!(candidates, vec!["jdoe", "jdoe@corp.com"]);
    }

    #[test]
    fn test_case_sensitive_keeps_variants() {
        let mut cfg = config(&[MatchStrategy::Exact]);
        cfg.exact = true;
        cfg.case_sensitive = true;
        let resolver = IdentityResolver::new(cfg);

        assert_eq!(resolver.resolve(" JDoe | jdoe |", &fields(&[])), vec!["JDoe", "jdoe"]);
    }

    #[test]
    fn test_email_short_requires_email() {
        let mut cfg = config(&[MatchStrategy::EmailShort]);
        cfg.email_short = true;
        let resolver = IdentityResolver::new(cfg);
        assert!(resolver.resolve("", &fields(&[("email", "a@b.c")])).is_empty());
    }

    #[test]
    fn test_match_order_controls_priority() {
        let mut cfg = config(&[MatchStrategy::Email, MatchStrategy::Exact]);
        cfg.exact = true;
        cfg.email = true;
        let resolver = IdentityResolver::new(cfg);

        let candidates = resolver.resolve("alice", &fields(&[("email", "alice@x.org")]));
        assert_eq!(candidates, vec!["alice@x.org", "alice"]);
    }

    #[test]
    fn test_convention_substitution() {
        let mut cfg = config(&[MatchStrategy::Convention]);
        cfg.convention = true;
        cfg.conventions = vec!["first(1)last()".to_string(), "last().first()".to_string()];
        let resolver = IdentityResolver::new(cfg);

        let candidates =
            resolver.resolve("", &fields(&[("first", "Jane"), ("last", "Smith")]));
        assert_eq!(candidates, vec!["jsmith", "smith.jane"]);
    }

    #[test]
    fn test_convention_with_only_empty_tokens_is_dropped() {
        let mut cfg = config(&[MatchStrategy::Convention]);
        cfg.convention = true;
        cfg.conventions = vec!["first(1)last()".to_string(), "first().last()".to_string()];
        let resolver = IdentityResolver::new(cfg);

        let candidates = resolver.resolve("", &fields(&[("first", ""), ("last", "")]));
        assert!(candidates.is_empty());
        let missing = resolver.resolve("", &fields(&[]));
        assert!(missing.is_empty());
    }

    #[test]
    fn test_required_fields_follow_enabled_strategies() {
        let mut cfg = config(&[MatchStrategy::Email, MatchStrategy::Convention]);
        cfg.email = true;
        cfg.convention = true;
        cfg.conventions = vec!["first(1)last()".to_string(), "nick()".to_string()];
        let resolver = IdentityResolver::new(cfg);

        assert_eq!(resolver.required_fields(), vec!["email", "first", "last", "nick"]);
    }
}
