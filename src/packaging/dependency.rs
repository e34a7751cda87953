// src/packaging/dependency.rs

use super::identity::PackageIdentity;
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dependency on another package id within a version range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: String,
    #[serde(default)]
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.is_all() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} {}", self.id, self.range.pretty_print())
        }
    }
}

/// Dependency metadata for one package version as reported by one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePackageDependencyInfo {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    /// Unlisted packages are only chosen when nothing else satisfies
    pub listed: bool,
    /// Name of the source that reported this entry
    pub source: String,
}

impl SourcePackageDependencyInfo {
    pub fn new(
        identity: PackageIdentity,
        dependencies: Vec<PackageDependency>,
        listed: bool,
        source: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            dependencies,
            listed,
            source: source.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d.has_id(id))
    }
}
