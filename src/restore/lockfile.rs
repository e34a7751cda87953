// src/restore/lockfile.rs

//! Lock file of a build-integrated project
//!
//! Records the fully resolved package closure per framework. Every map is a
//! `BTreeMap`, so the same closure always serializes to the same bytes and an
//! unchanged restore leaves the file untouched.

use super::write_if_changed;
use crate::error::{Error, Result};
use crate::framework::TargetFramework;
use crate::packaging::PackageIdentity;
use crate::version::{NuGetVersion, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use strum_macros::{Display, EnumString};

pub const LOCK_FILE_NAME: &str = "nupm.lock.json";
pub const LOCK_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DependencyKind {
    Direct,
    Transitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<VersionRange>,
    pub resolved: NuGetVersion,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, VersionRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    /// Framework moniker -> package id -> locked entry
    #[serde(default)]
    pub targets: BTreeMap<String, BTreeMap<String, LockedPackage>>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: LOCK_FILE_VERSION,
            targets: BTreeMap::new(),
        }
    }
}

impl LockFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(&mut self, framework: &TargetFramework) {
        self.targets.entry(framework.key()).or_default();
    }

    pub fn insert(&mut self, framework: &TargetFramework, id: &str, package: LockedPackage) {
        self.targets
            .entry(framework.key())
            .or_default()
            .insert(id.to_string(), package);
    }

    pub fn get(&self, framework: &TargetFramework, id: &str) -> Option<&LockedPackage> {
        self.targets
            .get(&framework.key())?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(id))
            .map(|(_, p)| p)
    }

    /// Resolved version of `id` in whichever framework locks it first
    pub fn resolved_version(&self, id: &str) -> Option<&NuGetVersion> {
        self.targets.values().find_map(|packages| {
            packages
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(id))
                .map(|(_, p)| &p.resolved)
        })
    }

    pub fn packages(&self, framework: &TargetFramework) -> Vec<PackageIdentity> {
        self.targets
            .get(&framework.key())
            .map(|packages| {
                packages
                    .iter()
                    .map(|(id, p)| PackageIdentity::new(id.clone(), p.resolved.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every locked identity across frameworks
    pub fn identities(&self) -> BTreeSet<PackageIdentity> {
        self.targets
            .values()
            .flat_map(|packages| {
                packages
                    .iter()
                    .map(|(id, p)| PackageIdentity::new(id.clone(), p.resolved.clone()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.values().all(BTreeMap::is_empty)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        Ok(data)
    }

    /// Read a lock file; a missing file is `None`
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::IoError(format!(
                "Failed to read lock file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Persist the lock file; returns `false` when nothing changed on disk
    pub fn write(&self, path: &Path) -> Result<bool> {
        write_if_changed(path, &self.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn locked(version: &str, kind: DependencyKind) -> LockedPackage {
        LockedPackage {
            kind,
            requested: None,
            resolved: NuGetVersion::parse(version).unwrap(),
            dependencies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_serialization_is_stable() {
        let net = TargetFramework::parse("net8.0").unwrap();
        let mut first = LockFile::new();
        first.insert(&net, "Zeta", locked("1.0", DependencyKind::Direct));
        first.insert(&net, "Alpha", locked("2.0", DependencyKind::Transitive));

        let mut second = LockFile::new();
        second.insert(&net, "Alpha", locked("2.0", DependencyKind::Transitive));
        second.insert(&net, "Zeta", locked("1.0", DependencyKind::Direct));

        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_write_skips_identical_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCK_FILE_NAME);
        let mut lock = LockFile::new();
        lock.insert(&TargetFramework::any(), "A", locked("1.0", DependencyKind::Direct));

        assert!(lock.write(&path).unwrap());
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(!lock.write(&path).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);

        assert_eq!(LockFile::read(&path).unwrap(), Some(lock));
    }

    #[test]
    fn test_missing_lock_file() {
        let temp = TempDir::new().unwrap();
        assert!(LockFile::read(&temp.path().join(LOCK_FILE_NAME)).unwrap().is_none());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let net = TargetFramework::parse("net8.0").unwrap();
        let mut lock = LockFile::new();
        lock.insert(&net, "Alpha", locked("2.0", DependencyKind::Direct));
        assert!(lock.get(&net, "ALPHA").is_some());
        assert_eq!(lock.resolved_version("alpha").unwrap().to_string(), "2.0.0");
        assert_eq!(lock.identities().len(), 1);
    }
}
