// src/manager/update.rs

//! Update and reinstall planning

use super::{
    NuGetProjectAction, OperationContext, PackageManager, PlannedActions, ResolutionContext,
    SourceSelection, UpdateRequest, check_cancelled, dependency_closure, install_actions,
};
use crate::error::{Error, Result};
use crate::packaging::{PackageIdentity, PackageReference, SourcePackageDependencyInfo, id_key};
use crate::project::{BuildIntegratedProject, MessageLevel, Project, ProjectContext};
use crate::resolver::PackageResolver;
use crate::resolver::prune::{
    prune_all_but_highest, prune_by_primary_targets, prune_by_update_constraints,
    prune_disallowed_versions, prune_downgrades, prune_prerelease_except_allowed,
    throw_if_newer_version_already_referenced, throw_if_version_is_disallowed,
};
use std::collections::HashSet;
use tracing::debug;

impl PackageManager {
    /// Plan an update of `project`
    ///
    /// With exact version constraints the update becomes a reinstall: the
    /// targets and their dependency closure are removed and added back even
    /// when no version changes.
    pub async fn preview_update_packages(
        &self,
        project: &dyn Project,
        request: &UpdateRequest,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<PlannedActions> {
        check_cancelled(operation)?;
        if let Some(build_integrated) = project.as_build_integrated() {
            return self
                .preview_build_integrated_update(
                    build_integrated,
                    request,
                    resolution,
                    context,
                    sources,
                    operation,
                )
                .await;
        }

        let installed = project.installed_packages().await?;
        let installed_identities: Vec<PackageIdentity> =
            installed.iter().map(|r| r.identity.clone()).collect();
        let constraints = resolution.version_constraints;
        let is_reinstall = constraints.is_exact();
        let is_update_all = *request == UpdateRequest::All;

        let mut primary_targets: Vec<PackageIdentity> = Vec::new();
        let mut primary_target_ids: Vec<String> = Vec::new();
        let mut preferred = installed_identities.clone();

        match request {
            UpdateRequest::Identities(identities) => {
                preferred.retain(|p| !identities.iter().any(|i| i.same_id(p)));
                preferred.extend(identities.iter().cloned());
                primary_targets = identities.clone();
            }
            UpdateRequest::Id(id) => {
                let Some(reference) = installed.iter().find(|r| r.identity.has_id(id)) else {
                    return Err(Error::PackageNotInstalled {
                        package: id.clone(),
                        project: project.name().to_string(),
                    });
                };
                if is_reinstall {
                    primary_targets = vec![reference.identity.clone()];
                } else {
                    primary_target_ids = vec![reference.identity.id.clone()];
                    preferred.retain(|p| !p.has_id(id));
                }
            }
            UpdateRequest::All => {
                let owned = installed.iter().filter(|r| r.user_installed);
                if is_reinstall {
                    primary_targets = owned.map(|r| r.identity.clone()).collect();
                } else {
                    primary_target_ids = owned.map(|r| r.identity.id.clone()).collect();
                    preferred.retain(|p| !primary_target_ids.iter().any(|id| p.has_id(id)));
                }
            }
        }

        let mut target_ids: Vec<String> = installed_identities.iter().map(|p| p.id.clone()).collect();
        for id in primary_targets
            .iter()
            .map(|p| &p.id)
            .chain(primary_target_ids.iter())
        {
            if !target_ids.iter().any(|t| t.eq_ignore_ascii_case(id)) {
                target_ids.push(id.clone());
            }
        }
        if target_ids.is_empty() {
            return Ok(PlannedActions::empty());
        }

        context.log(
            MessageLevel::Info,
            &format!("Resolving actions to update packages in '{}'", project.name()),
        );

        let allow_downgrades = matches!(request, UpdateRequest::Identities(_));
        let mut gather_context = self.gather_context(project, sources, resolution);
        gather_context.primary_targets = primary_targets.clone();
        gather_context.primary_target_ids = primary_target_ids.clone();
        gather_context.installed_packages = installed_identities.clone();
        gather_context.allow_downgrades = allow_downgrades;
        gather_context.is_update_all = is_update_all;

        let mut available = self.run_gather(&gather_context, operation).await?;
        if is_update_all {
            for info in self.installed_package_infos(project, &installed).await? {
                if !available.iter().any(|a| a.identity == info.identity) {
                    available.push(info);
                }
            }
        }
        if available.is_empty() {
            return Err(Error::UnableToGather(format!(
                "no packages found for project '{}'",
                project.name()
            )));
        }

        let primary_ids: Vec<String> = primary_targets
            .iter()
            .map(|p| p.id.clone())
            .chain(primary_target_ids.iter().cloned())
            .collect();
        let available = self.prune_for_update(
            available,
            request,
            &installed,
            &installed_identities,
            &primary_targets,
            &primary_ids,
            resolution,
            allow_downgrades,
        )?;

        let effective = self.effective_sources(sources);
        let mut resolver_context = self.resolver_context(resolution, &installed, &effective);
        resolver_context.target_ids = target_ids.clone();
        resolver_context.required_package_ids = target_ids;
        resolver_context.preferred_versions = preferred;
        resolver_context.available_packages = available;
        let resolved = PackageResolver::new().resolve(&resolver_context, operation.token())?;

        let diff_targets: Vec<String> = if is_update_all {
            Vec::new()
        } else if is_reinstall {
            primary_targets.iter().map(|p| p.id.clone()).collect()
        } else {
            primary_target_ids
        };

        let old = self.installed_for_diff(project, &installed).await?;
        let actions = diff_update(&old, resolved, &diff_targets, is_reinstall, &effective, project.name());
        debug!(
            "Planned {} action(s) to update {}",
            actions.len(),
            project.name()
        );
        Ok(PlannedActions::Project(actions))
    }

    #[allow(clippy::too_many_arguments)]
    fn prune_for_update(
        &self,
        mut available: Vec<SourcePackageDependencyInfo>,
        request: &UpdateRequest,
        installed: &[PackageReference],
        installed_identities: &[PackageIdentity],
        primary_targets: &[PackageIdentity],
        primary_ids: &[String],
        resolution: &ResolutionContext,
        allow_downgrades: bool,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let is_update_all = *request == UpdateRequest::All;
        if !resolution.include_prerelease {
            available =
                prune_prerelease_except_allowed(available, installed_identities, is_update_all);
        }
        available = prune_by_update_constraints(available, installed, resolution.version_constraints);

        if let UpdateRequest::Id(id) = request
            && !resolution.version_constraints.is_exact()
        {
            available = prune_all_but_highest(available, id);
            throw_if_newer_version_already_referenced(id, installed, &available)?;
        }

        throw_if_version_is_disallowed(primary_ids, installed, &available)?;
        available = prune_disallowed_versions(available, installed);
        if !primary_targets.is_empty() {
            available = prune_by_primary_targets(available, primary_targets);
        }
        if !allow_downgrades {
            available = prune_downgrades(available, installed);
        }
        Ok(available)
    }

    /// Update of a build-integrated project: version bumps of direct
    /// dependencies, previewed through a restore
    async fn preview_build_integrated_update(
        &self,
        project: &BuildIntegratedProject,
        request: &UpdateRequest,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<PlannedActions> {
        let installed = project.installed_packages().await?;
        let framework = project.target_framework();
        let primary = sources.primary.first().cloned();
        let mut actions = Vec::new();

        match request {
            UpdateRequest::All => {
                for reference in installed.iter().filter(|r| r.user_installed) {
                    let latest = self
                        .get_latest_version(
                            &reference.identity.id,
                            &framework,
                            resolution,
                            &sources.primary,
                            operation,
                        )
                        .await?;
                    if let Some(version) = latest.latest_version
                        && version > reference.identity.version
                    {
                        actions.push(NuGetProjectAction::uninstall(
                            reference.identity.clone(),
                            project.name(),
                        ));
                        actions.push(NuGetProjectAction::install(
                            PackageIdentity::new(reference.identity.id.clone(), version),
                            primary.clone(),
                            project.name(),
                        ));
                    }
                }
            }
            UpdateRequest::Id(id) => {
                let Some(reference) = installed.iter().find(|r| r.identity.has_id(id)) else {
                    return Err(Error::PackageNotInstalled {
                        package: id.clone(),
                        project: project.name().to_string(),
                    });
                };
                let latest = self
                    .get_latest_version(id, &framework, resolution, &sources.primary, operation)
                    .await?;
                let Some(version) = latest.latest_version else {
                    return Err(Error::PackageNotFound(format!("Unknown package '{id}'")));
                };
                if reference.identity.version > version {
                    return Err(Error::NewerVersionAlreadyReferenced {
                        package: reference.identity.id.clone(),
                        installed: reference.identity.version.to_string(),
                        requested: version.to_string(),
                    });
                }
                if reference.identity.version != version {
                    actions.push(NuGetProjectAction::uninstall(
                        reference.identity.clone(),
                        project.name(),
                    ));
                    actions.push(NuGetProjectAction::install(
                        PackageIdentity::new(reference.identity.id.clone(), version),
                        primary.clone(),
                        project.name(),
                    ));
                }
            }
            UpdateRequest::Identities(identities) => {
                for identity in identities {
                    if let Some(reference) = installed.iter().find(|r| r.identity.same_id(identity)) {
                        if reference.identity == *identity {
                            continue;
                        }
                        actions.push(NuGetProjectAction::uninstall(
                            reference.identity.clone(),
                            project.name(),
                        ));
                    }
                    actions.push(NuGetProjectAction::install(
                        identity.clone(),
                        primary.clone(),
                        project.name(),
                    ));
                }
            }
        }

        if actions.is_empty() {
            context.log(
                MessageLevel::Info,
                &format!("No updates available for project '{}'", project.name()),
            );
            return Ok(PlannedActions::empty());
        }
        let preview = self
            .preview_build_integrated_project_actions(project, actions, context, operation)
            .await?;
        Ok(PlannedActions::BuildIntegrated(Box::new(preview)))
    }

    /// Plan and execute an update
    pub async fn update_packages(
        &self,
        project: &dyn Project,
        request: &UpdateRequest,
        resolution: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        operation: &OperationContext,
    ) -> Result<()> {
        let plan = self
            .preview_update_packages(project, request, resolution, context, sources, operation)
            .await
            .inspect_err(|e| context.log(MessageLevel::Error, &e.to_string()))?;
        self.execute_planned(project, &plan, None, context, operation)
            .await
    }
}

/// Turn old and new installed sets into ordered actions
///
/// Uninstalls come first, dependants before their dependencies; installs
/// follow in dependency order.
fn diff_update(
    old: &[SourcePackageDependencyInfo],
    resolved: Vec<SourcePackageDependencyInfo>,
    targets: &[String],
    is_reinstall: bool,
    sources: &[crate::protocol::SharedSource],
    project: &str,
) -> Vec<NuGetProjectAction> {
    let mut old: Vec<&SourcePackageDependencyInfo> = old.iter().collect();
    let mut new = resolved;

    let (uninstalls, installs): (Vec<PackageIdentity>, Vec<SourcePackageDependencyInfo>) =
        if is_reinstall {
            if !targets.is_empty() {
                let old_owned: Vec<SourcePackageDependencyInfo> =
                    old.iter().map(|o| (*o).clone()).collect();
                let old_closure = dependency_closure(targets, &old_owned);
                let new_closure = dependency_closure(targets, &new);
                old.retain(|o| old_closure.contains(&o.identity.key()));
                new.retain(|n| new_closure.contains(&n.identity.key()));
            }
            (old.iter().map(|o| o.identity.clone()).collect(), new)
        } else {
            if !targets.is_empty() {
                let mut allowed = dependency_closure(targets, &new);
                allowed.extend(old.iter().map(|o| o.identity.key()));
                new.retain(|n| allowed.contains(&id_key(n.id())));
            }
            let new_set: HashSet<&PackageIdentity> = new.iter().map(|n| &n.identity).collect();
            let old_set: HashSet<&PackageIdentity> = old.iter().map(|o| &o.identity).collect();
            let uninstalls = old
                .iter()
                .filter(|o| !new_set.contains(&o.identity))
                .map(|o| o.identity.clone())
                .collect();
            let installs = new
                .iter()
                .filter(|n| !old_set.contains(&n.identity))
                .cloned()
                .collect();
            (uninstalls, installs)
        };

    let mut actions: Vec<NuGetProjectAction> = uninstalls
        .into_iter()
        .rev()
        .map(|u| NuGetProjectAction::uninstall(u, project))
        .collect();
    actions.extend(install_actions(&installs, sources, project));
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::PackageDependency;
    use crate::version::VersionRange;

    fn info(id: &str, version: &str, deps: &[&str]) -> SourcePackageDependencyInfo {
        SourcePackageDependencyInfo::new(
            PackageIdentity::parse(id, version).unwrap(),
            deps.iter()
                .map(|d| PackageDependency::new(*d, VersionRange::all()))
                .collect(),
            true,
            "feed",
        )
    }

    fn describe(actions: &[NuGetProjectAction]) -> Vec<String> {
        actions.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_diff_uninstalls_before_installs() {
        let old = vec![info("B", "1.0", &[]), info("A", "1.0", &["B"])];
        let new = vec![info("B", "2.0", &[]), info("A", "2.0", &["B"])];
        let actions = diff_update(&old, new, &["A".to_string()], false, &[], "App");
        assert_eq!(
            describe(&actions),
            vec!["Uninstall A 1.0.0", "Uninstall B 1.0.0", "Install B 2.0.0", "Install A 2.0.0"]
        );
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let old = vec![info("A", "1.0", &[])];
        let new = vec![info("A", "1.0", &[])];
        assert!(diff_update(&old, new, &[], false, &[], "App").is_empty());
    }

    #[test]
    fn test_reinstall_limits_to_closure() {
        let old = vec![info("B", "1.0", &[]), info("A", "1.0", &["B"]), info("C", "1.0", &[])];
        let new = old.clone();
        let actions = diff_update(&old, new, &["A".to_string()], true, &[], "App");
        assert_eq!(
            describe(&actions),
            vec!["Uninstall A 1.0.0", "Uninstall B 1.0.0", "Install B 1.0.0", "Install A 1.0.0"]
        );
    }
}
