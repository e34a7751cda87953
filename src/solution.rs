// src/solution.rs

//! The set of projects a package operation can see

use crate::error::Result;
use crate::packaging::PackageIdentity;
use crate::project::SharedProject;
use crate::restore::DependencyGraphSpec;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Default)]
pub struct SolutionManager {
    projects: RwLock<Vec<SharedProject>>,
    /// Build-integrated projects waiting for a lazy restore
    pending_restores: Mutex<BTreeSet<String>>,
}

impl SolutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project, replacing one with the same name
    pub fn add_project(&self, project: SharedProject) {
        let mut projects = self.projects.write();
        projects.retain(|p| !p.name().eq_ignore_ascii_case(project.name()));
        debug!("Solution now includes project {}", project.name());
        projects.push(project);
    }

    pub fn projects(&self) -> Vec<SharedProject> {
        self.projects.read().clone()
    }

    pub fn get_project(&self, name: &str) -> Option<SharedProject> {
        self.projects
            .read()
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Whether a project other than `excluding` still references `identity`
    pub async fn package_exists_in_another_project(
        &self,
        identity: &PackageIdentity,
        excluding: &str,
    ) -> Result<bool> {
        for project in self.projects() {
            if project.name().eq_ignore_ascii_case(excluding) {
                continue;
            }
            if project.is_installed(identity).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every identity some project still needs on disk
    ///
    /// Build-integrated projects contribute their whole locked closure.
    pub async fn referenced_packages(&self) -> Result<Vec<PackageIdentity>> {
        let mut referenced = BTreeSet::new();
        for project in self.projects() {
            referenced.extend(project.installed_identities().await?);
            if let Some(build_integrated) = project.as_build_integrated()
                && let Some(lock_file) = build_integrated.read_lock_file()?
            {
                referenced.extend(lock_file.identities());
            }
        }
        Ok(referenced.into_iter().collect())
    }

    /// Specs of every build-integrated project
    pub fn dependency_graph_spec(&self) -> DependencyGraphSpec {
        let mut dg_spec = DependencyGraphSpec::new();
        for project in self.projects.read().iter() {
            if let Some(build_integrated) = project.as_build_integrated() {
                dg_spec.add_project(build_integrated.spec());
            }
        }
        dg_spec
    }

    /// Projects in the order multi-project operations visit them
    ///
    /// Packages-config projects come first in the order they were added,
    /// then build-integrated projects with referenced projects first.
    pub fn sorted_projects(&self) -> Vec<SharedProject> {
        let projects = self.projects();
        let mut sorted: Vec<SharedProject> = projects
            .iter()
            .filter(|p| !p.is_build_integrated())
            .cloned()
            .collect();

        for spec in self.dependency_graph_spec().sorted_projects() {
            if let Some(project) = projects
                .iter()
                .find(|p| p.is_build_integrated() && p.name().eq_ignore_ascii_case(&spec.name))
            {
                sorted.push(project.clone());
            }
        }
        sorted
    }

    pub fn mark_for_restore(&self, name: &str) {
        self.pending_restores.lock().insert(name.to_string());
    }

    pub fn take_pending_restores(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending_restores.lock())
            .into_iter()
            .collect()
    }
}
