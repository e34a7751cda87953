// src/packaging/manifest.rs

//! Package manifest record
//!
//! The manifest is what the engine knows about package content: identity,
//! per-framework dependency groups, the minimum client version and the
//! declared package types. It is stored as `manifest.json` next to the
//! package file in the packages folder and returned by every download.

use super::dependency::PackageDependency;
use super::identity::PackageIdentity;
use crate::error::Result;
use crate::framework::TargetFramework;
use crate::version::NuGetVersion;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Version of this client, checked against `min_client_version`
pub const CLIENT_VERSION: &str = "6.9.0";

/// Declared kind of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PackageType {
    Default,
    Dependency,
    DotnetTool,
    Template,
    SymbolsPackage,
}

/// Dependencies declared for one target framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub target_framework: TargetFramework,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub identity: PackageIdentity,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_client_version: Option<NuGetVersion>,
    #[serde(default)]
    pub package_types: Vec<PackageType>,
    #[serde(default)]
    pub development_dependency: bool,
    #[serde(default = "default_listed")]
    pub listed: bool,
    /// Text shown to the user after a direct install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

fn default_listed() -> bool {
    true
}

impl PackageManifest {
    pub fn new(identity: PackageIdentity) -> Self {
        Self {
            identity,
            dependency_groups: Vec::new(),
            min_client_version: None,
            package_types: Vec::new(),
            development_dependency: false,
            listed: true,
            readme: None,
        }
    }

    /// Add a dependency to the group for `framework`, creating the group
    pub fn with_dependency(mut self, framework: TargetFramework, dependency: PackageDependency) -> Self {
        match self
            .dependency_groups
            .iter_mut()
            .find(|g| g.target_framework == framework)
        {
            Some(group) => group.dependencies.push(dependency),
            None => self.dependency_groups.push(DependencyGroup {
                target_framework: framework,
                dependencies: vec![dependency],
            }),
        }
        self
    }

    /// Dependencies that apply when installing into `framework`
    ///
    /// An exact group wins; otherwise the `any` group applies; a package
    /// with neither has no dependencies for that framework.
    pub fn dependencies_for(&self, framework: &TargetFramework) -> Vec<PackageDependency> {
        self.dependency_groups
            .iter()
            .find(|g| &g.target_framework == framework)
            .or_else(|| {
                self.dependency_groups
                    .iter()
                    .find(|g| g.target_framework.is_any())
            })
            .map(|g| g.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionRange;

    fn fw(s: &str) -> TargetFramework {
        TargetFramework::parse(s).unwrap()
    }

    #[test]
    fn test_dependencies_for_prefers_exact_group() {
        let manifest = PackageManifest::new(PackageIdentity::parse("A", "1.0").unwrap())
            .with_dependency(fw("any"), PackageDependency::new("Generic", VersionRange::all()))
            .with_dependency(fw("net8.0"), PackageDependency::new("Modern", VersionRange::all()));

        let deps = manifest.dependencies_for(&fw("NET8.0"));
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, "Modern");

        let deps = manifest.dependencies_for(&fw("net472"));
        assert_eq!(deps[0].id, "Generic");
    }

    #[test]
    fn test_manifest_json() {
        let mut manifest = PackageManifest::new(PackageIdentity::parse("A", "1.0").unwrap());
        manifest.package_types.push(PackageType::Dependency);
        let data = manifest.to_json().unwrap();
        let parsed = PackageManifest::from_json(&data).unwrap();
        assert_eq!(parsed, manifest);

        let minimal: PackageManifest =
            serde_json::from_str(r#"{"identity":{"id":"B","version":"2.0.0"}}"#).unwrap();
        assert!(minimal.listed);
        assert!(minimal.dependency_groups.is_empty());
    }

    #[test]
    fn test_package_type_from_str() {
        assert_eq!("dotnettool".parse::<PackageType>().unwrap(), PackageType::DotnetTool);
        assert_eq!(PackageType::Default.to_string(), "Default");
    }
}
