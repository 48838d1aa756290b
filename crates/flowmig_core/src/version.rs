//! Schema version parsing and ordering.
//!
//! # Invariants
//! - Comparison is numeric per component; missing trailing components are zero.
//! - Equality follows ordering, so `"1"`, `"1.0"` and `"01"` are the same version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Rejected version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVersionError {
    pub input: String,
    pub reason: &'static str,
}

impl Display for InvalidVersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid schema version `{}`: {}", self.input, self.reason)
    }
}

impl Error for InvalidVersionError {}

/// Dotted numeric schema version, e.g. `0`, `1`, `1.2`.
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    components: Vec<u64>,
}

impl SchemaVersion {
    /// Parses a dotted numeric version string.
    pub fn parse(input: &str) -> Result<Self, InvalidVersionError> {
        let invalid = |reason| InvalidVersionError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("version is empty"));
        }

        let mut components = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(invalid("empty version component"));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("components must be unsigned integers"));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| invalid("component out of range"))?;
            components.push(value);
        }

        Ok(Self { components })
    }

    /// Single-component version, `SchemaVersion::major(1)` == `"1"`.
    pub fn major(value: u64) -> Self {
        Self {
            components: vec![value],
        }
    }

    /// Components with trailing zeros stripped (at least one kept).
    fn significant(&self) -> &[u64] {
        let len = self
            .components
            .iter()
            .rposition(|value| *value != 0)
            .map_or(1, |index| index + 1);
        &self.components[..len.min(self.components.len())]
    }
}

impl FromStr for SchemaVersion {
    type Err = InvalidVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.components.len().max(other.components.len());
        for index in 0..width {
            let left = self.components.get(index).copied().unwrap_or(0);
            let right = other.components.get(index).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl Hash for SchemaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .significant()
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&rendered)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
