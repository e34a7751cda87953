// src/manager/mod.rs

//! Package operations across the projects of a solution
//!
//! Every operation runs in two phases. The preview phase gathers candidates,
//! prunes and resolves them, and diffs the result against what the project
//! has installed; nothing is touched on disk. The execute phase applies the
//! planned actions in order and undoes all of them if one fails.
//!
//! Build-integrated projects take a different path after planning: their
//! actions become edits of the package spec followed by an in-memory restore,
//! and the commit writes the spec and the lock file together before
//! restoring every project that references the changed one.

pub mod actions;
pub mod context;
mod build_integrated;
mod execute;
mod install;
mod latest;
mod uninstall;
mod update;

pub use actions::{
    ActionType, BuildIntegratedInstallationContext, BuildIntegratedProjectAction,
    NuGetProjectAction, PlannedActions, ResolvedPackage,
};
pub use context::{
    OperationContext, ResolutionContext, SourceSelection, UninstallationContext, UpdateRequest,
};
pub use uninstall::UninstallResolver;

use crate::compat::{CompatibilityChecker, DefaultCompatibilityChecker};
use crate::download::PackageDownloader;
use crate::error::{Error, Result};
use crate::folder::{PACKAGES_FOLDER_SOURCE, PackagesFolder};
use crate::gather::{
    DEFAULT_MAX_DEGREE_OF_PARALLELISM, DEFAULT_REQUEST_TIMEOUT, GatherContext, gather,
};
use crate::packaging::{PackageIdentity, PackageReference, SourcePackageDependencyInfo, id_key};
use crate::project::Project;
use crate::protocol::SharedSource;
use crate::resolver::{ResolverContext, topological_sort};
use crate::restore::RestoreEngine;
use crate::solution::SolutionManager;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Concurrent source queries during a gather
    pub max_degree_of_parallelism: usize,
    /// Concurrent package downloads while executing actions
    pub max_parallel_downloads: usize,
    pub request_timeout: Duration,
    /// Mark parent projects for a later restore instead of restoring them
    /// right after a build-integrated commit
    pub lazy_parent_restore: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            max_parallel_downloads: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            lazy_parent_restore: false,
        }
    }
}

pub struct PackageManager {
    solution: Arc<SolutionManager>,
    packages_folder: PackagesFolder,
    global_folder: PackagesFolder,
    sources: Vec<SharedSource>,
    downloader: PackageDownloader,
    compatibility: Arc<dyn CompatibilityChecker>,
    settings: ManagerSettings,
}

impl PackageManager {
    /// Manager for `solution`
    ///
    /// `packages_folder` serves packages-config projects; `global_folder`
    /// holds the packages restored for build-integrated projects.
    pub fn new(
        solution: Arc<SolutionManager>,
        packages_folder: PackagesFolder,
        global_folder: PackagesFolder,
        sources: Vec<SharedSource>,
    ) -> Self {
        Self {
            solution,
            packages_folder,
            global_folder,
            sources,
            downloader: PackageDownloader::default(),
            compatibility: Arc::new(DefaultCompatibilityChecker::default()),
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_compatibility_checker(mut self, checker: Arc<dyn CompatibilityChecker>) -> Self {
        self.compatibility = checker;
        self
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_downloader(mut self, downloader: PackageDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn solution(&self) -> &Arc<SolutionManager> {
        &self.solution
    }

    pub fn packages_folder(&self) -> &PackagesFolder {
        &self.packages_folder
    }

    pub fn global_folder(&self) -> &PackagesFolder {
        &self.global_folder
    }

    pub fn sources(&self) -> &[SharedSource] {
        &self.sources
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn downloader(&self) -> &PackageDownloader {
        &self.downloader
    }

    /// Every configured source in both roles
    pub fn default_sources(&self) -> SourceSelection {
        SourceSelection::all(self.sources.clone())
    }

    fn effective_sources(&self, sources: &SourceSelection) -> Vec<SharedSource> {
        sources.effective(self.packages_folder.as_source())
    }

    /// Restore engine over the configured sources plus `extra`
    pub(crate) fn restore_engine(&self, extra: &[SharedSource]) -> RestoreEngine {
        let sources = crate::protocol::dedup_sources(
            extra.iter().cloned().chain(self.sources.iter().cloned()),
        );
        let mut engine =
            RestoreEngine::new(sources, self.global_folder.clone(), self.downloader.clone());
        engine.max_degree_of_parallelism = self.settings.max_degree_of_parallelism;
        engine.request_timeout = self.settings.request_timeout;
        engine
    }

    fn gather_context(
        &self,
        project: &dyn Project,
        sources: &SourceSelection,
        resolution: &ResolutionContext,
    ) -> GatherContext {
        let mut context = GatherContext::new(
            project.target_framework(),
            sources.primary.clone(),
            self.effective_sources(sources),
            self.packages_folder.as_source(),
        );
        context.dependency_behavior = resolution.dependency_behavior;
        context.max_degree_of_parallelism = self.settings.max_degree_of_parallelism;
        context.request_timeout = self.settings.request_timeout;
        context
    }

    async fn run_gather(
        &self,
        context: &GatherContext,
        operation: &OperationContext,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let mut cache = operation.gather_cache.lock().await;
        gather(context, &mut cache, operation.token()).await
    }

    fn resolver_context(
        &self,
        resolution: &ResolutionContext,
        installed: &[PackageReference],
        sources: &[SharedSource],
    ) -> ResolverContext {
        let mut context = ResolverContext::new(resolution.dependency_behavior);
        context.packages_config = installed.to_vec();
        context.package_sources = sources.iter().map(|s| s.name().to_string()).collect();
        context
    }

    /// Dependency info of installed packages, read from the packages folder
    ///
    /// Packages missing from the folder are left out.
    async fn installed_package_infos(
        &self,
        project: &dyn Project,
        installed: &[PackageReference],
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let framework = project.target_framework();
        let folder = self.packages_folder.as_source();
        let mut infos = Vec::with_capacity(installed.len());
        for reference in installed {
            match folder.resolve_package(&reference.identity, &framework).await? {
                Some(info) => infos.push(info),
                None => debug!(
                    "{} is not in {}",
                    reference.identity,
                    self.packages_folder.root().display()
                ),
            }
        }
        Ok(infos)
    }

    /// Installed packages ordered so that dependencies come first
    pub async fn get_installed_packages_in_dependency_order(
        &self,
        project: &dyn Project,
    ) -> Result<Vec<PackageIdentity>> {
        let installed = project.installed_packages().await?;
        let infos = self.installed_package_infos(project, &installed).await?;
        Ok(topological_sort(&infos)
            .into_iter()
            .map(|info| info.identity)
            .collect())
    }

    /// Installed packages in dependency order for diffing
    ///
    /// Unlike [`Self::get_installed_packages_in_dependency_order`], packages
    /// missing from the folder are kept, without dependencies, at the end.
    async fn installed_for_diff(
        &self,
        project: &dyn Project,
        installed: &[PackageReference],
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let mut infos = topological_sort(&self.installed_package_infos(project, installed).await?);
        for reference in installed {
            if !infos.iter().any(|i| i.identity == reference.identity) {
                infos.push(SourcePackageDependencyInfo::new(
                    reference.identity.clone(),
                    Vec::new(),
                    true,
                    PACKAGES_FOLDER_SOURCE,
                ));
            }
        }
        Ok(infos)
    }
}

fn check_cancelled(operation: &OperationContext) -> Result<()> {
    if operation.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Ids reachable from `roots` through the dependencies of `packages`
///
/// Keys are case-folded; the roots are included.
fn dependency_closure(roots: &[String], packages: &[SourcePackageDependencyInfo]) -> HashSet<String> {
    let mut closure: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().map(|id| id_key(id)).collect();

    while let Some(id) = queue.pop_front() {
        if !closure.insert(id.clone()) {
            continue;
        }
        for package in packages.iter().filter(|p| p.identity.key() == id) {
            for dependency in &package.dependencies {
                let key = id_key(&dependency.id);
                if !closure.contains(&key) {
                    queue.push_back(key);
                }
            }
        }
    }
    closure
}

fn find_source(name: &str, sources: &[SharedSource]) -> Option<SharedSource> {
    sources
        .iter()
        .find(|s| s.name().eq_ignore_ascii_case(name))
        .cloned()
}

/// Install actions for resolved packages, tied to the source that supplied them
fn install_actions<'a>(
    packages: impl IntoIterator<Item = &'a SourcePackageDependencyInfo>,
    sources: &[SharedSource],
    project: &str,
) -> Vec<NuGetProjectAction> {
    packages
        .into_iter()
        .map(|p| {
            NuGetProjectAction::install(p.identity.clone(), find_source(&p.source, sources), project)
        })
        .collect()
}
