// src/manager/uninstall.rs

//! Uninstall planning

use super::{
    NuGetProjectAction, OperationContext, PackageManager, PlannedActions, UninstallationContext,
    check_cancelled,
};
use crate::error::{Error, Result};
use crate::packaging::{PackageIdentity, SourcePackageDependencyInfo, id_key};
use crate::project::{MessageLevel, Project, ProjectContext};
use crate::resolver::topological_sort;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Decides which installed packages go with an uninstall
pub struct UninstallResolver;

impl UninstallResolver {
    /// Packages to remove along with `target`, dependants first
    ///
    /// Refuses when other installed packages depend on `target`, unless
    /// `force_remove` is set. With `remove_dependencies`, dependencies of the
    /// removed packages go too once nothing that stays needs them.
    pub fn get_packages_to_be_uninstalled(
        target: &PackageIdentity,
        dependency_infos: &[SourcePackageDependencyInfo],
        installed: &[PackageIdentity],
        context: &UninstallationContext,
    ) -> Result<Vec<PackageIdentity>> {
        let installed_keys: HashSet<String> = installed.iter().map(|p| p.key()).collect();
        let infos: Vec<&SourcePackageDependencyInfo> = dependency_infos
            .iter()
            .filter(|i| installed_keys.contains(&i.identity.key()))
            .collect();

        let dependants: BTreeSet<String> = infos
            .iter()
            .filter(|i| !i.identity.same_id(target) && i.depends_on(&target.id))
            .map(|i| format!("'{}'", i.identity))
            .collect();
        if !dependants.is_empty() && !context.force_remove {
            return Err(Error::PackageHasDependants {
                package: target.to_string(),
                dependants: dependants.into_iter().collect::<Vec<_>>().join(", "),
            });
        }

        let mut removing: HashSet<String> = HashSet::from([target.key()]);
        if context.remove_dependencies {
            loop {
                let candidates: BTreeSet<String> = infos
                    .iter()
                    .filter(|i| removing.contains(&i.identity.key()))
                    .flat_map(|i| i.dependencies.iter().map(|d| id_key(&d.id)))
                    .filter(|id| installed_keys.contains(id) && !removing.contains(id))
                    .collect();

                let removable: Vec<String> = candidates
                    .into_iter()
                    .filter(|id| {
                        !infos.iter().any(|i| {
                            !removing.contains(&i.identity.key()) && i.depends_on(id)
                        })
                    })
                    .collect();
                if removable.is_empty() {
                    break;
                }
                removing.extend(removable);
            }
        }

        // Dependants before their dependencies
        let sorted = topological_sort(
            &infos
                .iter()
                .filter(|i| removing.contains(&i.identity.key()))
                .map(|i| (*i).clone())
                .collect::<Vec<_>>(),
        );
        let mut result: Vec<PackageIdentity> =
            sorted.into_iter().rev().map(|i| i.identity).collect();
        if !result.iter().any(|p| p == target) {
            result.insert(0, target.clone());
        }
        Ok(result)
    }
}

impl PackageManager {
    /// Plan removing `id` from `project`
    pub async fn preview_uninstall_package(
        &self,
        project: &dyn Project,
        id: &str,
        uninstall: &UninstallationContext,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<PlannedActions> {
        check_cancelled(operation)?;
        let installed = project.installed_packages().await?;
        let Some(reference) = installed.iter().find(|r| r.identity.has_id(id)) else {
            return Err(Error::PackageNotInstalled {
                package: id.to_string(),
                project: project.name().to_string(),
            });
        };
        let identity = reference.identity.clone();

        if let Some(build_integrated) = project.as_build_integrated() {
            let action = NuGetProjectAction::uninstall(identity, project.name());
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

        context.log(
            MessageLevel::Info,
            &format!("Resolving actions to uninstall package '{identity}'"),
        );
        let infos = self.installed_package_infos(project, &installed).await?;
        let installed_identities: Vec<PackageIdentity> =
            installed.iter().map(|r| r.identity.clone()).collect();
        let to_remove = UninstallResolver::get_packages_to_be_uninstalled(
            &identity,
            &infos,
            &installed_identities,
            uninstall,
        )?;
        debug!(
            "Uninstalling {} removes {} package(s) from {}",
            identity,
            to_remove.len(),
            project.name()
        );
        context.log(
            MessageLevel::Info,
            &format!("Resolved actions to uninstall package '{identity}'"),
        );

        Ok(PlannedActions::Project(
            to_remove
                .into_iter()
                .map(|p| NuGetProjectAction::uninstall(p, project.name()))
                .collect(),
        ))
    }

    /// Plan and execute removing `id`
    pub async fn uninstall_package(
        &self,
        project: &dyn Project,
        id: &str,
        uninstall: &UninstallationContext,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        let plan = self
            .preview_uninstall_package(project, id, uninstall, context, operation)
            .await
            .inspect_err(|e| context.log(MessageLevel::Error, &e.to_string()))?;
        self.execute_planned(project, &plan, None, context, operation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::PackageDependency;
    use crate::version::VersionRange;

    fn info(id: &str, deps: &[&str]) -> SourcePackageDependencyInfo {
        SourcePackageDependencyInfo::new(
            PackageIdentity::parse(id, "1.0").unwrap(),
            deps.iter()
                .map(|d| PackageDependency::new(*d, VersionRange::parse("1.0").unwrap()))
                .collect(),
            true,
            "packages-folder",
        )
    }

    fn id(name: &str) -> PackageIdentity {
        PackageIdentity::parse(name, "1.0").unwrap()
    }

    fn setup() -> (Vec<SourcePackageDependencyInfo>, Vec<PackageIdentity>) {
        // Web -> Json, Web -> Log, Cli -> Log
        let infos = vec![
            info("Web", &["Json", "Log"]),
            info("Cli", &["Log"]),
            info("Json", &[]),
            info("Log", &[]),
        ];
        let installed = infos.iter().map(|i| i.identity.clone()).collect();
        (infos, installed)
    }

    #[test]
    fn test_refuses_with_dependants() {
        let (infos, installed) = setup();
        let err = UninstallResolver::get_packages_to_be_uninstalled(
            &id("Log"),
            &infos,
            &installed,
            &UninstallationContext::default(),
        )
        .unwrap_err();
        match err {
            Error::PackageHasDependants { dependants, .. } => {
                assert_eq!(dependants, "'Cli 1.0.0', 'Web 1.0.0'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_force_removes_only_target() {
        let (infos, installed) = setup();
        let removed = UninstallResolver::get_packages_to_be_uninstalled(
            &id("Log"),
            &infos,
            &installed,
            &UninstallationContext::new(false, true),
        )
        .unwrap();
        assert_eq!(removed, vec![id("Log")]);
    }

    #[test]
    fn test_remove_dependencies_keeps_shared_ones() {
        let (infos, installed) = setup();
        let removed = UninstallResolver::get_packages_to_be_uninstalled(
            &id("Web"),
            &infos,
            &installed,
            &UninstallationContext::new(true, false),
        )
        .unwrap();
        // Log is still needed by Cli
        assert_eq!(removed, vec![id("Web"), id("Json")]);
    }

    #[test]
    fn test_remove_dependencies_dependants_first() {
        let infos = vec![info("App", &["Mid"]), info("Mid", &["Base"]), info("Base", &[])];
        let installed: Vec<PackageIdentity> = infos.iter().map(|i| i.identity.clone()).collect();
        let removed = UninstallResolver::get_packages_to_be_uninstalled(
            &id("App"),
            &infos,
            &installed,
            &UninstallationContext::new(true, false),
        )
        .unwrap();
        assert_eq!(removed, vec![id("App"), id("Mid"), id("Base")]);
    }
}
