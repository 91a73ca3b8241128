// ============================================================
// IDENTITY MATCHING CONFIGURATION
// ============================================================
// Which strategies derive identity candidates, and in what order

use serde::{Deserialize, Serialize};

/// A strategy contributing identity candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Email,
    EmailShort,
    Convention,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::Email => write!(f, "email"),
            MatchStrategy::EmailShort => write!(f, "email_short"),
            MatchStrategy::Convention => write!(f, "convention"),
        }
    }
}

/// Identity matching options. Case sensitivity applies to every strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityMatchConfig {
    pub match_order: Vec<MatchStrategy>,
    pub exact: bool,
    pub email: bool,
    pub email_short: bool,
    pub convention: bool,
    pub case_sensitive: bool,

    /// Templates such as `first(1)last()` expanded against the record
    pub conventions: Vec<String>,
}

impl Default for IdentityMatchConfig {
    fn default() -> Self {
        Self {
            match_order: vec![
                MatchStrategy::Exact,
                MatchStrategy::Email,
                MatchStrategy::EmailShort,
                MatchStrategy::Convention,
            ],
            exact: true,
            email: true,
            email_short: true,
            convention: false,
            case_sensitive: false,
            conventions: Vec::new(),
        }
    }
}

impl IdentityMatchConfig {
    pub fn is_enabled(&self, strategy: MatchStrategy) -> bool {
        match strategy {
            MatchStrategy::Exact => self.exact,
            MatchStrategy::Email => self.email,
            MatchStrategy::EmailShort => self.email && self.email_short,
            MatchStrategy::Convention => self.convention,
        }
    }
}
