// src/restore/mod.rs

//! Restore of build-integrated projects
//!
//! A restore resolves the package spec of a project once per target
//! framework and records the closure in a lock file. `preview_restore` does
//! all of that in memory; `commit` then brings the resolved packages into the
//! global packages folder. Spec and lock file are only written by the project
//! once a restore succeeded.

pub mod dg_spec;
pub mod lockfile;
pub mod spec;

pub use dg_spec::DependencyGraphSpec;
pub use lockfile::{DependencyKind, LOCK_FILE_NAME, LockFile, LockedPackage};
pub use spec::{PackageSpec, SPEC_FILE_NAME, SpecDependency};

use crate::download::PackageDownloader;
use crate::error::{Error, Result};
use crate::folder::PackagesFolder;
use crate::framework::TargetFramework;
use crate::gather::{
    DEFAULT_MAX_DEGREE_OF_PARALLELISM, DEFAULT_REQUEST_TIMEOUT, GatherCache, GatherContext, gather,
};
use crate::packaging::{PackageDependency, PackageIdentity, SourcePackageDependencyInfo};
use crate::protocol::SharedSource;
use crate::resolver::{DependencyBehavior, PackageResolver, ResolverContext};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Write `data` to `path` atomically unless the file already holds exactly it
///
/// Returns whether the file was written.
pub(crate) fn write_if_changed(path: &Path, data: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path)
        && existing == data
    {
        debug!("{} unchanged", path.display());
        return Ok(false);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", dir.display())))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| {
        Error::IoError(format!("Failed to write {}: {}", path.display(), e.error))
    })?;
    Ok(true)
}

/// Outcome of restoring one framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkRestoreResult {
    pub framework: TargetFramework,
    pub success: bool,
    /// Failure reason, empty on success
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub project: String,
    pub success: bool,
    pub lock_file: LockFile,
    /// Keyed by framework moniker
    pub frameworks: BTreeMap<String, FrameworkRestoreResult>,
    /// Every resolved package across frameworks, once per identity
    pub packages: Vec<SourcePackageDependencyInfo>,
}

impl RestoreResult {
    pub fn successful_frameworks(&self) -> Vec<TargetFramework> {
        self.frameworks
            .values()
            .filter(|r| r.success)
            .map(|r| r.framework.clone())
            .collect()
    }

    pub fn failed_frameworks(&self) -> Vec<TargetFramework> {
        self.frameworks
            .values()
            .filter(|r| !r.success)
            .map(|r| r.framework.clone())
            .collect()
    }

    /// Failure messages, one line per failed framework
    pub fn errors(&self) -> Vec<String> {
        self.frameworks
            .values()
            .filter(|r| !r.success)
            .map(|r| format!("{}: {}", r.framework, r.message))
            .collect()
    }

    pub fn identities(&self) -> Vec<PackageIdentity> {
        self.packages.iter().map(|p| p.identity.clone()).collect()
    }
}

pub struct RestoreEngine {
    sources: Vec<SharedSource>,
    global_folder: PackagesFolder,
    downloader: PackageDownloader,
    pub max_degree_of_parallelism: usize,
    pub request_timeout: Duration,
}

impl RestoreEngine {
    pub fn new(
        sources: Vec<SharedSource>,
        global_folder: PackagesFolder,
        downloader: PackageDownloader,
    ) -> Self {
        Self {
            sources,
            global_folder,
            downloader,
            max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn global_folder(&self) -> &PackagesFolder {
        &self.global_folder
    }

    pub fn sources(&self) -> &[SharedSource] {
        &self.sources
    }

    /// Resolve every framework of `spec` without touching disk
    ///
    /// Failures of individual frameworks are recorded in the result; only
    /// cancellation aborts the preview.
    pub async fn preview_restore(
        &self,
        spec: &PackageSpec,
        dg_spec: &DependencyGraphSpec,
        cache: &mut GatherCache,
        token: &CancellationToken,
    ) -> Result<RestoreResult> {
        let mut result = RestoreResult {
            project: spec.name.clone(),
            success: true,
            lock_file: LockFile::new(),
            frameworks: BTreeMap::new(),
            packages: Vec::new(),
        };
        let mut seen: HashSet<PackageIdentity> = HashSet::new();

        for framework in spec.restore_frameworks() {
            let dependencies = dg_spec.effective_dependencies(spec, &framework);
            result.lock_file.add_target(&framework);

            let outcome = match self
                .restore_framework(&framework, &dependencies, cache, token)
                .await
            {
                Ok(resolved) => {
                    for package in &resolved {
                        let direct = dependencies.iter().find(|d| d.has_id(package.id()));
                        result.lock_file.insert(
                            &framework,
                            package.id(),
                            LockedPackage {
                                kind: if direct.is_some() {
                                    DependencyKind::Direct
                                } else {
                                    DependencyKind::Transitive
                                },
                                requested: direct.map(|d| d.range.clone()),
                                resolved: package.identity.version.clone(),
                                dependencies: package
                                    .dependencies
                                    .iter()
                                    .map(|d| (d.id.clone(), d.range.clone()))
                                    .collect(),
                            },
                        );
                    }
                    for package in resolved {
                        if seen.insert(package.identity.clone()) {
                            result.packages.push(package);
                        }
                    }
                    FrameworkRestoreResult {
                        framework: framework.clone(),
                        success: true,
                        message: String::new(),
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Restore of {} for {} failed: {}", spec.name, framework, e);
                    result.success = false;
                    FrameworkRestoreResult {
                        framework: framework.clone(),
                        success: false,
                        message: e.to_string(),
                    }
                }
            };
            result.frameworks.insert(framework.key(), outcome);
        }

        debug!(
            "Preview restore of {}: {} package(s), success={}",
            spec.name,
            result.packages.len(),
            result.success
        );
        Ok(result)
    }

    async fn restore_framework(
        &self,
        framework: &TargetFramework,
        dependencies: &[PackageDependency],
        cache: &mut GatherCache,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        if dependencies.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = dependencies.iter().map(|d| d.id.clone()).collect();
        let mut context = GatherContext::new(
            framework.clone(),
            self.sources.clone(),
            self.sources.clone(),
            self.global_folder.as_source(),
        );
        context.primary_target_ids = ids.clone();
        context.dependency_behavior = DependencyBehavior::Lowest;
        context.max_degree_of_parallelism = self.max_degree_of_parallelism;
        context.request_timeout = self.request_timeout;

        let mut available = gather(&context, cache, token).await?;

        // Direct dependencies are bound by the ranges the project asked for
        available.retain(|p| {
            dependencies
                .iter()
                .find(|d| d.has_id(p.id()))
                .is_none_or(|d| d.range.satisfies(&p.identity.version))
        });

        let preferred: Vec<PackageIdentity> = dependencies
            .iter()
            .filter_map(|d| {
                available
                    .iter()
                    .filter(|p| p.identity.has_id(&d.id) && p.listed)
                    .map(|p| &p.identity)
                    .min_by(|a, b| a.version.cmp(&b.version))
                    .cloned()
            })
            .collect();

        let mut resolver_context = ResolverContext::new(DependencyBehavior::Lowest);
        resolver_context.target_ids = ids.clone();
        resolver_context.required_package_ids = ids;
        resolver_context.preferred_versions = preferred;
        resolver_context.available_packages = available;
        resolver_context.package_sources =
            self.sources.iter().map(|s| s.name().to_string()).collect();

        PackageResolver::new().resolve(&resolver_context, token)
    }

    /// Bring every package of a successful restore into the global folder
    ///
    /// Returns the identities that were newly added.
    pub async fn commit(
        &self,
        result: &RestoreResult,
        token: &CancellationToken,
    ) -> Result<Vec<PackageIdentity>> {
        let mut added = Vec::new();
        for package in &result.packages {
            let identity = &package.identity;
            if self.global_folder.has_valid_content(identity) {
                continue;
            }
            let downloaded = self.downloader.download(identity, &self.sources, token).await?;
            if self
                .global_folder
                .install(&downloaded.manifest, &downloaded.content)
                .await?
            {
                added.push(identity.clone());
            }
        }

        if !added.is_empty() {
            info!(
                "Restore of {} added {} package(s) to {}",
                result.project,
                added.len(),
                self.global_folder.root().display()
            );
        }
        Ok(added)
    }

    /// Preview and commit in one step
    pub async fn restore(
        &self,
        spec: &PackageSpec,
        dg_spec: &DependencyGraphSpec,
        cache: &mut GatherCache,
        token: &CancellationToken,
    ) -> Result<RestoreResult> {
        let result = self.preview_restore(spec, dg_spec, cache, token).await?;
        if result.success {
            self.commit(&result, token).await?;
        }
        Ok(result)
    }
}

/// Package ids whose locked version differs between two lock files
pub fn changed_packages(old: Option<&LockFile>, new: &LockFile) -> Vec<PackageIdentity> {
    let old_ids = old.map(LockFile::identities).unwrap_or_default();
    new.identities()
        .into_iter()
        .filter(|identity| !old_ids.contains(identity))
        .collect()
}
