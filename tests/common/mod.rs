// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use nupm::manager::{ManagerSettings, PackageManager, ResolutionContext, SourceSelection};
use nupm::packaging::PackageIdentity;
use nupm::project::{
    BuildIntegratedProject, PackagesConfigProject, RecordingProjectContext, SharedProject,
};
use nupm::protocol::{MemorySourceRepository, SharedSource};
use nupm::restore::PackageSpec;
use nupm::{DependencyBehavior, PackagesFolder, SolutionManager, TargetFramework};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A solution on disk with one in-memory feed
///
/// Keep the fixture alive for the duration of the test; dropping it removes
/// the directory.
pub struct Fixture {
    pub temp: TempDir,
    pub feed: Arc<MemorySourceRepository>,
    pub solution: Arc<SolutionManager>,
    pub manager: PackageManager,
    pub context: RecordingProjectContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(ManagerSettings::default())
    }

    pub fn with_settings(settings: ManagerSettings) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let feed = Arc::new(MemorySourceRepository::new("feed"));
        let solution = Arc::new(SolutionManager::new());
        let sources: Vec<SharedSource> = vec![feed.clone()];

        let manager = PackageManager::new(
            solution.clone(),
            PackagesFolder::new(temp.path().join("packages")),
            PackagesFolder::new(temp.path().join("global")),
            sources,
        )
        .with_settings(settings);

        Self {
            temp,
            feed,
            solution,
            manager,
            context: RecordingProjectContext::new(),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    /// Add a packages.config project targeting net8.0
    pub fn packages_config_project(&self, name: &str) -> SharedProject {
        let dir = self.path(name);
        std::fs::create_dir_all(&dir).unwrap();
        let project: SharedProject = Arc::new(PackagesConfigProject::in_directory(
            name,
            &dir,
            net(),
            self.manager.packages_folder().clone(),
        ));
        self.solution.add_project(project.clone());
        project
    }

    /// Add a build-integrated project targeting net8.0
    pub fn build_integrated_project(&self, name: &str, references: &[&str]) -> SharedProject {
        let dir = self.path(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut spec = PackageSpec::new(name, vec![net()]);
        for reference in references {
            spec = spec.with_project_reference(*reference);
        }
        let project: SharedProject = Arc::new(BuildIntegratedProject::new(spec, &dir));
        self.solution.add_project(project.clone());
        project
    }

    pub fn sources(&self) -> SourceSelection {
        self.manager.default_sources()
    }
}

pub fn net() -> TargetFramework {
    TargetFramework::parse("net8.0").unwrap()
}

pub fn id(name: &str, version: &str) -> PackageIdentity {
    PackageIdentity::parse(name, version).unwrap()
}

pub fn lowest() -> ResolutionContext {
    ResolutionContext::new(DependencyBehavior::Lowest)
}

/// Identities a project references, as "Id version" strings
pub async fn installed(project: &SharedProject) -> Vec<String> {
    let mut refs: Vec<String> = project
        .installed_packages()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.identity.to_string())
        .collect();
    refs.sort();
    refs
}

pub fn describe(actions: &[nupm::NuGetProjectAction]) -> Vec<String> {
    actions.iter().map(|a| a.to_string()).collect()
}
