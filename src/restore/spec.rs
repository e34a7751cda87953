// src/restore/spec.rs

//! Package spec of a build-integrated project
//!
//! The spec lists the project's direct package dependencies (optionally
//! restricted to some of its frameworks) and the other projects it
//! references. It is stored as JSON next to the project.

use super::write_if_changed;
use crate::error::{Error, Result};
use crate::framework::TargetFramework;
use crate::packaging::{PackageDependency, id_key};
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the package spec inside a project directory
pub const SPEC_FILE_NAME: &str = "nupm.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDependency {
    pub id: String,
    pub range: VersionRange,
    /// Frameworks this dependency applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<TargetFramework>,
    /// Added implicitly by tooling rather than by the user
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_referenced: bool,
}

impl SpecDependency {
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
            frameworks: Vec::new(),
            auto_referenced: false,
        }
    }

    pub fn applies_to(&self, framework: &TargetFramework) -> bool {
        self.frameworks.is_empty() || self.frameworks.contains(framework)
    }

    pub fn to_dependency(&self) -> PackageDependency {
        PackageDependency::new(self.id.clone(), self.range.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub frameworks: Vec<TargetFramework>,
    #[serde(default)]
    pub dependencies: Vec<SpecDependency>,
    /// Names of referenced projects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_references: Vec<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, frameworks: Vec<TargetFramework>) -> Self {
        Self {
            name: name.into(),
            frameworks,
            dependencies: Vec::new(),
            project_references: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: SpecDependency) -> Self {
        self.add_or_update_dependency(dependency);
        self
    }

    pub fn with_project_reference(mut self, name: impl Into<String>) -> Self {
        self.project_references.push(name.into());
        self
    }

    /// Frameworks to restore; a spec without any restores for `any`
    pub fn restore_frameworks(&self) -> Vec<TargetFramework> {
        if self.frameworks.is_empty() {
            vec![TargetFramework::any()]
        } else {
            self.frameworks.clone()
        }
    }

    pub fn dependency(&self, id: &str) -> Option<&SpecDependency> {
        let key = id_key(id);
        self.dependencies.iter().find(|d| id_key(&d.id) == key)
    }

    pub fn has_dependency(&self, id: &str) -> bool {
        self.dependency(id).is_some()
    }

    /// Replace any dependency with the same id, keeping entries sorted by id
    pub fn add_or_update_dependency(&mut self, dependency: SpecDependency) {
        self.remove_dependency(&dependency.id);
        self.dependencies.push(dependency);
        self.dependencies.sort_by_key(|d| id_key(&d.id));
    }

    pub fn remove_dependency(&mut self, id: &str) -> bool {
        let key = id_key(id);
        let before = self.dependencies.len();
        self.dependencies.retain(|d| id_key(&d.id) != key);
        self.dependencies.len() != before
    }

    /// Limit an existing dependency to the given frameworks
    pub fn restrict_dependency(&mut self, id: &str, frameworks: Vec<TargetFramework>) {
        let key = id_key(id);
        if let Some(dependency) = self.dependencies.iter_mut().find(|d| id_key(&d.id) == key) {
            dependency.frameworks = frameworks;
        }
    }

    pub fn dependencies_for(&self, framework: &TargetFramework) -> Vec<PackageDependency> {
        self.dependencies
            .iter()
            .filter(|d| d.applies_to(framework))
            .map(SpecDependency::to_dependency)
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        Ok(data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            Error::IoError(format!("Failed to read package spec {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
    }

    /// Persist the spec; returns `false` when the file already had this content
    pub fn write(&self, path: &Path) -> Result<bool> {
        write_if_changed(path, &self.to_json()?)
    }
}
