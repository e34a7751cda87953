// src/manager/install.rs

//! Install planning

use super::{
    NuGetProjectAction, OperationContext, PackageManager, PlannedActions, ResolutionContext,
    SourceSelection, check_cancelled, dependency_closure, install_actions,
};
use crate::error::{Error, Result};
use crate::packaging::{PackageIdentity, id_key};
use crate::project::{MessageLevel, Project, ProjectContext, SharedProject};
use crate::resolver::prune::{
    prune_disallowed_versions, prune_downgrades, prune_prerelease_for_stable_targets,
    remove_all_versions_for_id_except, throw_if_version_is_disallowed,
};
use crate::resolver::{DependencyBehavior, PackageResolver};
use std::collections::HashSet;
use tracing::{debug, info};

impl PackageManager {
    /// Plan installing the latest version of `id`
    pub async fn preview_install_package_by_id(
        &self,
        project: &dyn Project,
        id: &str,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<PlannedActions> {
        let identity = self
            .latest_identity(project, id, resolution, sources, operation)
            .await?;
        self.preview_install_package(project, &identity, resolution, context, sources, operation)
            .await
    }

    /// Latest version of `id` on the primary sources, refusing downgrades
    async fn latest_identity(
        &self,
        project: &dyn Project,
        id: &str,
        resolution: &ResolutionContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<PackageIdentity> {
        let latest = self
            .get_latest_version(
                id,
                &project.target_framework(),
                resolution,
                &sources.primary,
                operation,
            )
            .await?;
        let Some(version) = latest.latest_version else {
            return Err(Error::PackageNotFound(format!("Unknown package '{id}'")));
        };

        let installed = project.installed_packages().await?;
        if let Some(reference) = installed.iter().find(|r| r.identity.has_id(id))
            && reference.identity.version > version
        {
            return Err(Error::NewerVersionAlreadyReferenced {
                package: reference.identity.id.clone(),
                installed: reference.identity.version.to_string(),
                requested: version.to_string(),
            });
        }
        Ok(PackageIdentity::new(id, version))
    }

    /// Plan installing exactly `identity`
    pub async fn preview_install_package(
        &self,
        project: &dyn Project,
        identity: &PackageIdentity,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<PlannedActions> {
        check_cancelled(operation)?;
        let installed = project.installed_packages().await?;
        if installed.iter().any(|r| &r.identity == identity) {
            return Err(Error::AlreadyInstalled {
                package: identity.to_string(),
                project: project.name().to_string(),
            });
        }

        if let Some(build_integrated) = project.as_build_integrated() {
            let action = NuGetProjectAction::install(
                identity.clone(),
                sources.primary.first().cloned(),
                project.name(),
            );
            let preview = self
                .preview_build_integrated_project_actions(
                    build_integrated,
                    vec![action],
                    context,
                    operation,
                )
                .await?;
            return Ok(PlannedActions::BuildIntegrated(Box::new(preview)));
        }

        let effective = self.effective_sources(sources);
        let mut actions = Vec::new();

        if resolution.dependency_behavior == DependencyBehavior::Ignore {
            let source = self
                .find_source_hosting(identity, &effective, operation)
                .await?;
            if let Some(existing) = installed.iter().find(|r| r.identity.same_id(identity)) {
                actions.push(NuGetProjectAction::uninstall(
                    existing.identity.clone(),
                    project.name(),
                ));
            }
            actions.push(NuGetProjectAction::install(
                identity.clone(),
                Some(source),
                project.name(),
            ));
            return Ok(PlannedActions::Project(actions));
        }

        context.log(
            MessageLevel::Info,
            &format!("Resolving actions to install package '{identity}'"),
        );

        let installed_identities: Vec<PackageIdentity> =
            installed.iter().map(|r| r.identity.clone()).collect();
        let downgrade_allowed = installed
            .iter()
            .any(|r| r.identity.same_id(identity) && r.identity.version > identity.version);

        let mut gather_context = self.gather_context(project, sources, resolution);
        gather_context.primary_targets = vec![identity.clone()];
        gather_context.installed_packages = installed_identities.clone();
        gather_context.allow_downgrades = downgrade_allowed;

        let available = self.run_gather(&gather_context, operation).await?;
        if available.is_empty() {
            return Err(Error::UnableToGather(identity.to_string()));
        }

        let mut pruned = remove_all_versions_for_id_except(available, identity);
        if !downgrade_allowed {
            pruned = prune_downgrades(pruned, &installed);
        }
        if !resolution.include_prerelease {
            pruned = prune_prerelease_for_stable_targets(
                pruned,
                &installed_identities,
                std::slice::from_ref(identity),
            );
        }
        throw_if_version_is_disallowed(std::slice::from_ref(&identity.id), &installed, &pruned)?;
        pruned = prune_disallowed_versions(pruned, &installed);

        let mut preferred: Vec<PackageIdentity> = installed_identities
            .iter()
            .filter(|p| !p.same_id(identity))
            .cloned()
            .collect();
        preferred.push(identity.clone());

        let mut resolver_context = self.resolver_context(resolution, &installed, &effective);
        resolver_context.target_ids = vec![identity.id.clone()];
        resolver_context.required_package_ids =
            installed.iter().map(|r| r.identity.id.clone()).collect();
        resolver_context.preferred_versions = preferred;
        resolver_context.available_packages = pruned;

        let resolved = PackageResolver::new().resolve(&resolver_context, operation.token())?;

        let old = self.installed_for_diff(project, &installed).await?;
        let uninstalls: Vec<PackageIdentity> = old
            .iter()
            .filter(|o| {
                resolved
                    .iter()
                    .any(|n| n.identity.same_id(&o.identity) && n.identity.version != o.identity.version)
            })
            .map(|o| o.identity.clone())
            .collect();

        // Only the target's closure and packages being replaced may change
        let mut allowed = dependency_closure(std::slice::from_ref(&identity.id), &resolved);
        allowed.extend(uninstalls.iter().map(|u| u.key()));

        let old_set: HashSet<&PackageIdentity> = old.iter().map(|o| &o.identity).collect();
        let installs = resolved
            .iter()
            .filter(|n| !old_set.contains(&n.identity) && allowed.contains(&id_key(n.id())));

        actions.extend(
            uninstalls
                .into_iter()
                .rev()
                .map(|u| NuGetProjectAction::uninstall(u, project.name())),
        );
        actions.extend(install_actions(installs, &effective, project.name()));

        debug!(
            "Planned {} action(s) to install {} into {}",
            actions.len(),
            identity,
            project.name()
        );
        context.log(
            MessageLevel::Info,
            &format!("Resolved actions to install package '{identity}'"),
        );
        Ok(PlannedActions::Project(actions))
    }

    /// Install the latest version of `id`
    pub async fn install_package_by_id(
        &self,
        project: &dyn Project,
        id: &str,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<()> {
        let identity = self
            .latest_identity(project, id, resolution, sources, operation)
            .await?;
        self.install_package(project, &identity, resolution, context, sources, operation)
            .await
    }

    /// Plan and execute installing `identity`
    pub async fn install_package(
        &self,
        project: &dyn Project,
        identity: &PackageIdentity,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<()> {
        let plan = self
            .preview_install_package(project, identity, resolution, context, sources, operation)
            .await
            .inspect_err(|e| context.log(MessageLevel::Error, &e.to_string()))?;
        self.execute_planned(project, &plan, Some(identity), context, operation)
            .await
    }

    /// Install `identity` into several projects, in solution order
    ///
    /// Projects that already have the package are skipped. The first failure
    /// stops the run; projects handled before it keep their changes.
    pub async fn install_package_in_projects(
        &self,
        projects: &[SharedProject],
        identity: &PackageIdentity,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<usize> {
        let mut installed_into = 0;
        for project in self.order_projects(projects) {
            match self
                .preview_install_package(project.as_ref(), identity, resolution, context, sources, operation)
                .await
            {
                Ok(plan) => {
                    self.execute_planned(project.as_ref(), &plan, Some(identity), context, operation)
                        .await?;
                    installed_into += 1;
                }
                Err(Error::AlreadyInstalled { .. }) => {
                    debug!("{} already has {}", project.name(), identity);
                }
                Err(e) => {
                    context.log(MessageLevel::Error, &e.to_string());
                    return Err(e);
                }
            }
        }
        info!("Installed {} into {} project(s)", identity, installed_into);
        Ok(installed_into)
    }

    /// `projects` in solution order; projects unknown to the solution last
    pub(crate) fn order_projects(&self, projects: &[SharedProject]) -> Vec<SharedProject> {
        let wanted = |name: &str| projects.iter().any(|p| p.name().eq_ignore_ascii_case(name));
        let mut ordered: Vec<SharedProject> = self
            .solution
            .sorted_projects()
            .into_iter()
            .filter(|p| wanted(p.name()))
            .collect();
        for project in projects {
            if !ordered.iter().any(|p| p.name().eq_ignore_ascii_case(project.name())) {
                ordered.push(project.clone());
            }
        }
        ordered
    }
}
