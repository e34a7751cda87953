// src/packaging/identity.rs

use crate::error::{Error, Result};
use crate::version::NuGetVersion;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Case-folded form of a package id, used as a map key
pub fn id_key(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// A package id paired with a concrete version
///
/// Ids compare case-insensitively; the original casing is kept for display
/// and for on-disk folder names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: String,
    pub version: NuGetVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Build an identity from an id and a version string
    pub fn parse(id: &str, version: &str) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(Error::InvalidArgument("Package id is empty".to_string()));
        }
        Ok(Self::new(id.trim(), NuGetVersion::parse(version)?))
    }

    pub fn key(&self) -> String {
        id_key(&self.id)
    }

    /// True when both identities name the same package, ignoring version
    pub fn same_id(&self, other: &PackageIdentity) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// `Id.Version`, the name used for package folders and files
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.id, self.version)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.same_id(other) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
        self.version.hash(state);
    }
}

impl Ord for PackageIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for PackageIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
