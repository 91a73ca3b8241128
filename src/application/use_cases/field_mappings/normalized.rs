use once_cell::sync::Lazy;
use regex::Regex;

use super::{Conversion, ConversionInput, FieldAttributes, FieldMapping};
use crate::domain::lookup::FieldValue;

static MAC_SEPARATOR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:\-.\s]").unwrap());

const TRUE_VALUES: &[&str] = &["true", "t", "yes", "y", "1"];
const FALSE_VALUES: &[&str] = &["false", "f", "no", "n", "0"];

/// Normalizes truthy/falsy spellings to `true` / `false`; blank means `false`
#[derive(Debug, Clone)]
pub struct BooleanField {
    attributes: FieldAttributes,
}

impl BooleanField {
    pub fn new(attributes: FieldAttributes) -> Self {
        Self { attributes }
    }

    fn parse(raw: &str) -> Option<bool> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() || FALSE_VALUES.contains(&lowered.as_str()) {
            Some(false)
        } else if TRUE_VALUES.contains(&lowered.as_str()) {
            Some(true)
        } else {
            None
        }
    }
}

impl FieldMapping for BooleanField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn validate(&self, raw: Option<&str>) -> bool {
        Self::parse(raw.unwrap_or("")).is_some()
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        match Self::parse(input.raw_trimmed()) {
            Some(value) => Conversion::Converted(FieldValue::from(value.to_string().as_str())),
            None => Conversion::Invalid(format!("not a boolean: {}", input.raw_trimmed())),
        }
    }
}

/// Urgency levels accepted for `priority`
pub const PRIORITY_LEVELS: &[&str] = &[
    "unknown",
    "informational",
    "low",
    "medium",
    "high",
    "critical",
];

/// Normalizes priority names; blank means `unknown`
#[derive(Debug, Clone)]
pub struct PriorityField {
    attributes: FieldAttributes,
}

impl PriorityField {
    pub fn new(attributes: FieldAttributes) -> Self {
        Self { attributes }
    }

    fn parse(raw: &str) -> Option<&'static str> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return Some(PRIORITY_LEVELS[0]);
        }
        PRIORITY_LEVELS
            .iter()
            .find(|level| **level == lowered)
            .copied()
    }
}

impl FieldMapping for PriorityField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn validate(&self, raw: Option<&str>) -> bool {
        Self::parse(raw.unwrap_or("")).is_some()
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        match Self::parse(input.raw_trimmed()) {
            Some(level) => Conversion::Converted(FieldValue::from(level)),
            None => Conversion::Invalid(format!("unknown priority: {}", input.raw_trimmed())),
        }
    }
}

/// MAC addresses in any common notation, emitted as lowercase `aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone)]
pub struct MacField {
    attributes: FieldAttributes,
}

impl MacField {
    pub fn new(attributes: FieldAttributes) -> Self {
        Self { attributes }
    }

    pub fn normalize(raw: &str) -> Option<String> {
        let hex = MAC_SEPARATOR_PATTERN.replace_all(raw.trim(), "").to_lowercase();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
        Some(octets.join(":"))
    }

    fn tokens<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        match self.attributes.delim() {
            Some(delim) => raw
                .split(delim)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect(),
            None => Some(raw.trim()).filter(|token| !token.is_empty()).into_iter().collect(),
        }
    }
}

impl FieldMapping for MacField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn validate(&self, raw: Option<&str>) -> bool {
        self.tokens(raw.unwrap_or(""))
            .into_iter()
            .all(|token| Self::normalize(token).is_some())
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        let mut values = Vec::new();
        for token in self.tokens(input.raw_trimmed()) {
            match Self::normalize(token) {
                Some(mac) => values.push(mac),
                None => return Conversion::Invalid(format!("not a MAC address: {}", token)),
            }
        }
        if self.attributes.delim().is_some() {
            Conversion::Converted(FieldValue::Multi(values))
        } else {
            Conversion::Converted(FieldValue::Single(values.pop().unwrap_or_default()))
        }
    }
}
