// src/manager/build_integrated.rs

//! Preview and commit for build-integrated projects

use super::{
    ActionType, BuildIntegratedInstallationContext, BuildIntegratedProjectAction,
    NuGetProjectAction, OperationContext, PackageManager, check_cancelled,
};
use crate::error::{Error, Result};
use crate::packaging::PackageIdentity;
use crate::project::{BuildIntegratedProject, MessageLevel, Project, ProjectContext};
use crate::protocol::{SharedSource, dedup_sources};
use crate::resolver::topological_sort;
use crate::restore::{DependencyGraphSpec, PackageSpec, RestoreResult, SpecDependency, changed_packages};
use crate::version::VersionRange;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl PackageManager {
    /// Apply `actions` to a copy of the package spec and restore it in memory
    ///
    /// Nothing is written. When a single install fails for some frameworks
    /// only, the dependency is retried restricted to the frameworks that
    /// worked.
    pub async fn preview_build_integrated_project_actions(
        &self,
        project: &BuildIntegratedProject,
        actions: Vec<NuGetProjectAction>,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<BuildIntegratedProjectAction> {
        check_cancelled(operation)?;
        let Some(first) = actions.first() else {
            return Err(Error::InvalidArgument(format!(
                "No actions to preview for project '{}'",
                project.name()
            )));
        };
        let (identity, action_type) = (first.identity.clone(), first.action_type);

        let sources: Vec<SharedSource> =
            dedup_sources(actions.iter().filter_map(|a| a.source.clone()));
        let engine = self.restore_engine(&sources);
        let sources = engine.sources().to_vec();

        let mut dg_spec = self.solution.dependency_graph_spec();
        dg_spec.add_project(project.spec());

        let original_lock_file = match project.read_lock_file()? {
            Some(lock) => Some(lock),
            None => {
                debug!("{} has no lock file yet, restoring current spec", project.name());
                let mut cache = operation.gather_cache.lock().await;
                let original = engine
                    .preview_restore(&project.spec(), &dg_spec, &mut cache, operation.token())
                    .await?;
                Some(original.lock_file)
            }
        };

        let mut spec = project.spec();
        for action in &actions {
            match action.action_type {
                ActionType::Uninstall => {
                    spec.remove_dependency(&action.identity.id);
                }
                ActionType::Install | ActionType::Update => {
                    spec.add_or_update_dependency(SpecDependency::new(
                        action.identity.id.clone(),
                        VersionRange::at_least(action.identity.version.clone()),
                    ));
                }
            }
        }

        let mut result = self
            .preview_spec(&engine, &spec, &mut dg_spec, operation)
            .await?;
        let mut installation_context = BuildIntegratedInstallationContext {
            successful_frameworks: result.successful_frameworks(),
            unsuccessful_frameworks: result.failed_frameworks(),
            restricted_to: None,
        };

        let single_install = actions.len() == 1 && action_type == ActionType::Install;
        if !result.success && single_install && !installation_context.successful_frameworks.is_empty() {
            let working = installation_context.successful_frameworks.clone();
            let mut restricted = spec.clone();
            restricted.restrict_dependency(&identity.id, working.clone());

            let retried = self
                .preview_spec(&engine, &restricted, &mut dg_spec, operation)
                .await?;
            if retried.success {
                context.log(
                    MessageLevel::Warning,
                    &format!(
                        "'{}' is only compatible with {}; the dependency was restricted to them",
                        identity,
                        working
                            .iter()
                            .map(|f| f.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                );
                spec = restricted;
                result = retried;
                installation_context.restricted_to = Some(working);
            }
        }

        Ok(BuildIntegratedProjectAction {
            identity,
            action_type,
            original_lock_file,
            updated_spec: spec,
            restore_result: result,
            sources,
            actions,
            installation_context,
        })
    }

    async fn preview_spec(
        &self,
        engine: &crate::restore::RestoreEngine,
        spec: &PackageSpec,
        dg_spec: &mut DependencyGraphSpec,
        operation: &OperationContext,
    ) -> Result<RestoreResult> {
        dg_spec.add_project(spec.clone());
        let mut cache = operation.gather_cache.lock().await;
        engine
            .preview_restore(spec, dg_spec, &mut cache, operation.token())
            .await
    }

    /// Commit a previewed build-integrated change
    ///
    /// A failed restore is refused unless every action removes a package.
    pub(crate) async fn execute_build_integrated(
        &self,
        project: &BuildIntegratedProject,
        action: &BuildIntegratedProjectAction,
        direct_install: Option<&PackageIdentity>,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        let result = &action.restore_result;
        if !result.success && !action.is_uninstall_only() {
            for error in result.errors() {
                context.log(MessageLevel::Error, &error);
            }
            let error = Error::RestoreFailed(project.name().to_string());
            context.log(MessageLevel::Error, &error.to_string());
            return Err(error);
        }

        let engine = self.restore_engine(&action.sources);
        engine
            .commit(result, operation.token())
            .await
            .inspect_err(|e| context.log(MessageLevel::Error, &e.to_string()))?;

        // Transitive packages pulled in by the restore are gated too
        for package in &result.packages {
            if let Some(manifest) = self.global_folder.read_manifest(&package.identity) {
                self.compatibility
                    .validate(&manifest)
                    .inspect_err(|e| context.log(MessageLevel::Error, &e.to_string()))?;
            }
        }
        project.save(&action.updated_spec, &result.lock_file)?;

        for step in &action.actions {
            let message = match step.action_type {
                ActionType::Uninstall => format!(
                    "Successfully uninstalled '{}' from {}",
                    step.identity,
                    project.name()
                ),
                ActionType::Install | ActionType::Update => format!(
                    "Successfully installed '{}' to {}",
                    step.identity,
                    project.name()
                ),
            };
            context.log(MessageLevel::Info, &message);
        }

        let added: HashSet<PackageIdentity> =
            changed_packages(action.original_lock_file.as_ref(), &result.lock_file)
                .into_iter()
                .collect();
        for package in topological_sort(&result.packages) {
            if !added.contains(&package.identity) {
                continue;
            }
            let Some(dir) = self.global_folder.package_dir(&package.identity) else {
                continue;
            };
            if let Err(e) = project.run_init(&package.identity, &dir, context).await {
                context.log(
                    MessageLevel::Warning,
                    &format!("Initializing '{}' failed: {}", package.identity, e),
                );
            }
        }

        self.restore_parents(project, &action.sources, context, operation)
            .await?;

        if let Some(identity) = direct_install
            && !operation.is_cancelled()
            && let Some(readme) = self.global_folder.readme_path(identity)
        {
            context.open_readme(&readme);
        }
        Ok(())
    }

    /// Restore every project whose reference closure includes `project`
    async fn restore_parents(
        &self,
        project: &BuildIntegratedProject,
        sources: &[SharedSource],
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        let mut dg_spec = self.solution.dependency_graph_spec();
        dg_spec.add_project(project.spec());

        for name in dg_spec.parents_of(project.name()) {
            if self.settings.lazy_parent_restore {
                debug!("Marking {} for a later restore", name);
                self.solution.mark_for_restore(&name);
                continue;
            }
            let Some(parent) = self.solution.get_project(&name) else {
                continue;
            };
            let Some(parent) = parent.as_build_integrated() else {
                continue;
            };
            match self
                .restore_with(parent, &dg_spec, sources, context, operation)
                .await
            {
                Ok(_) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => context.log(
                    MessageLevel::Warning,
                    &format!("Restore of parent project '{name}' failed: {e}"),
                ),
            }
        }
        Ok(())
    }

    /// Restore and commit one build-integrated project
    ///
    /// The lock file is written only when the restore succeeded; a failure is
    /// reported through `context` and returned as `Ok(false)`.
    async fn restore_with(
        &self,
        project: &BuildIntegratedProject,
        dg_spec: &DependencyGraphSpec,
        sources: &[SharedSource],
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<bool> {
        let engine = self.restore_engine(sources);
        let spec = project.spec();
        let result = {
            let mut cache = operation.gather_cache.lock().await;
            engine
                .preview_restore(&spec, dg_spec, &mut cache, operation.token())
                .await?
        };

        if !result.success {
            for error in result.errors() {
                context.log(
                    MessageLevel::Warning,
                    &format!("Restore of '{}' failed for {}", project.name(), error),
                );
            }
            return Ok(false);
        }

        engine.commit(&result, operation.token()).await?;
        if project.save(&spec, &result.lock_file)? {
            info!("Restored {}", project.name());
        }
        Ok(true)
    }

    /// Restore one build-integrated project of the solution by name
    pub async fn restore_project(
        &self,
        name: &str,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<bool> {
        let project = self
            .solution
            .get_project(name)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown project '{name}'")))?;
        let Some(build_integrated) = project.as_build_integrated() else {
            return Err(Error::InvalidArgument(format!(
                "Project '{name}' does not use a package spec"
            )));
        };
        let dg_spec = self.solution.dependency_graph_spec();
        self.restore_with(build_integrated, &dg_spec, &[], context, operation)
            .await
    }

    /// Restore the projects marked by lazy parent restores
    ///
    /// Returns the names of the projects that restored successfully.
    pub async fn restore_pending(
        &self,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<Vec<String>> {
        let mut restored = Vec::new();
        for name in self.solution.take_pending_restores() {
            match self.restore_project(&name, context, operation).await {
                Ok(true) => restored.push(name),
                Ok(false) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!("Pending restore of {} failed: {}", name, e),
            }
        }
        Ok(restored)
    }

    /// Restore every project of the solution
    ///
    /// Packages-config projects get their missing packages put back into the
    /// packages folder; build-integrated projects are restored in dependency
    /// order. Returns how many projects failed.
    pub async fn restore_solution(
        &self,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<usize> {
        let dg_spec = self.solution.dependency_graph_spec();
        let mut failures = 0;

        for project in self.solution.sorted_projects() {
            check_cancelled(operation)?;
            if let Some(build_integrated) = project.as_build_integrated() {
                if !self
                    .restore_with(build_integrated, &dg_spec, &[], context, operation)
                    .await?
                {
                    failures += 1;
                }
                continue;
            }

            for reference in project.installed_packages().await? {
                if let Err(e) = self
                    .restore_package(&reference.identity, context, &[], operation)
                    .await
                {
                    if matches!(e, Error::Cancelled) {
                        return Err(e);
                    }
                    context.log(
                        MessageLevel::Error,
                        &format!("Unable to restore '{}': {}", reference.identity, e),
                    );
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }
}
