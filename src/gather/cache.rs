// src/gather/cache.rs

//! Per-operation cache of source answers
//!
//! Keys are (source, id, framework) for all-version lookups and
//! (source, identity, framework) for single-version lookups. The cache lives
//! in an `OperationContext` and is only touched by the gather coordinator,
//! so it needs no locking.

use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, SourcePackageDependencyInfo, id_key};
use std::collections::HashMap;

type AllKey = (String, String, String);
type SingleKey = (String, PackageIdentity, String);

#[derive(Debug, Default)]
pub struct GatherCache {
    all_versions: HashMap<AllKey, Vec<SourcePackageDependencyInfo>>,
    single: HashMap<SingleKey, Option<SourcePackageDependencyInfo>>,
}

impl GatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn all_key(source: &str, id: &str, framework: &TargetFramework) -> AllKey {
        (source.to_ascii_lowercase(), id_key(id), framework.key())
    }

    fn single_key(source: &str, identity: &PackageIdentity, framework: &TargetFramework) -> SingleKey {
        (source.to_ascii_lowercase(), identity.clone(), framework.key())
    }

    pub fn add_all_packages_for_id(
        &mut self,
        source: &str,
        id: &str,
        framework: &TargetFramework,
        packages: Vec<SourcePackageDependencyInfo>,
    ) {
        self.all_versions
            .insert(Self::all_key(source, id, framework), packages);
    }

    pub fn add_package_from_single_version_lookup(
        &mut self,
        source: &str,
        identity: &PackageIdentity,
        framework: &TargetFramework,
        package: Option<SourcePackageDependencyInfo>,
    ) {
        self.single
            .insert(Self::single_key(source, identity, framework), package);
    }

    /// Cached answer for all versions of `id`, if any
    pub fn get_packages(
        &self,
        source: &str,
        id: &str,
        framework: &TargetFramework,
    ) -> Option<Vec<SourcePackageDependencyInfo>> {
        self.all_versions
            .get(&Self::all_key(source, id, framework))
            .cloned()
    }

    /// Cached answer for one identity
    ///
    /// The outer `None` means no entry; `Some(None)` means the source is known
    /// not to have the package. An all-versions entry for the id also answers.
    pub fn get_package(
        &self,
        source: &str,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Option<Option<SourcePackageDependencyInfo>> {
        if let Some(entry) = self.single.get(&Self::single_key(source, identity, framework)) {
            return Some(entry.clone());
        }
        self.all_versions
            .get(&Self::all_key(source, &identity.id, framework))
            .map(|all| all.iter().find(|p| &p.identity == identity).cloned())
    }

    pub fn len(&self) -> usize {
        self.all_versions.len() + self.single.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
