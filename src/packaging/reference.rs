// src/packaging/reference.rs

use super::identity::PackageIdentity;
use crate::framework::TargetFramework;
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// A package installed in a project
///
/// There is at most one reference per (project, package id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub target_framework: TargetFramework,
    /// False for packages pulled in only as dependencies
    #[serde(default = "default_true")]
    pub user_installed: bool,
    #[serde(default)]
    pub development_dependency: bool,
    /// Restricts which versions updates may move this package to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_versions: Option<VersionRange>,
}

impl PackageReference {
    pub fn new(identity: PackageIdentity, target_framework: TargetFramework) -> Self {
        Self {
            identity,
            target_framework,
            user_installed: true,
            development_dependency: false,
            allowed_versions: None,
        }
    }

    pub fn with_allowed_versions(mut self, range: VersionRange) -> Self {
        self.allowed_versions = Some(range);
        self
    }

    pub fn with_user_installed(mut self, user_installed: bool) -> Self {
        self.user_installed = user_installed;
        self
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }
}
