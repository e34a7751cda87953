// src/framework.rs

//! Target framework monikers
//!
//! A framework is a short moniker such as `net8.0` or `netstandard2.0`.
//! Equality is case-insensitive; the spelling given at construction is kept
//! for display. `any` is the framework-agnostic moniker used when a package
//! declares dependencies without a framework group.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Moniker for framework-agnostic dependency groups
pub const ANY_FRAMEWORK: &str = "any";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetFramework {
    moniker: String,
}

impl TargetFramework {
    pub fn parse(moniker: &str) -> Result<Self> {
        let moniker = moniker.trim();
        if moniker.is_empty() {
            return Err(Error::ParseError("Empty target framework".to_string()));
        }
        if !moniker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(Error::ParseError(format!(
                "Invalid target framework '{}'",
                moniker
            )));
        }
        Ok(Self {
            moniker: moniker.to_string(),
        })
    }

    pub fn any() -> Self {
        Self {
            moniker: ANY_FRAMEWORK.to_string(),
        }
    }

    pub fn is_any(&self) -> bool {
        self.moniker.eq_ignore_ascii_case(ANY_FRAMEWORK)
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// Lowercase key used for maps and lock file sections
    pub fn key(&self) -> String {
        self.moniker.to_ascii_lowercase()
    }
}

impl PartialEq for TargetFramework {
    fn eq(&self, other: &Self) -> bool {
        self.moniker.eq_ignore_ascii_case(&other.moniker)
    }
}

impl Eq for TargetFramework {}

impl Hash for TargetFramework {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for TargetFramework {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TargetFramework {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.moniker)
    }
}

impl TryFrom<String> for TargetFramework {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TargetFramework> for String {
    fn from(value: TargetFramework) -> Self {
        value.moniker
    }
}

impl std::str::FromStr for TargetFramework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
