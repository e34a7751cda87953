// src/manager/execute.rs

//! Action execution with rollback
//!
//! Actions of one project run strictly in order. Every action is pushed on
//! a stack before it runs; when one fails the stack is unwound, installs
//! become uninstalls and uninstalls are reinstalled from the packages folder.
//! Package directories of uninstalled packages are removed only at the very
//! end, after a rollback too, and only when no other project still uses them.

use super::{ActionType, NuGetProjectAction, OperationContext, PackageManager, PlannedActions, check_cancelled};
use crate::download::PackagePrefetcher;
use crate::error::{Error, Result};
use crate::packaging::PackageIdentity;
use crate::project::{MessageLevel, Project, ProjectContext};
use crate::protocol::{DownloadedPackage, SharedSource};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

impl PackageManager {
    /// Apply planned actions to `project`, all or nothing
    pub async fn execute_project_actions(
        &self,
        project: &dyn Project,
        plan: &PlannedActions,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        self.execute_planned(project, plan, None, context, operation)
            .await
    }

    /// `direct_install` is the package the user asked for; its readme is
    /// offered once everything succeeded
    pub(crate) async fn execute_planned(
        &self,
        project: &dyn Project,
        plan: &PlannedActions,
        direct_install: Option<&PackageIdentity>,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        match plan {
            PlannedActions::BuildIntegrated(action) => {
                let build_integrated = project.as_build_integrated().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "Project '{}' does not use a package spec",
                        project.name()
                    ))
                })?;
                self.execute_build_integrated(build_integrated, action, direct_install, context, operation)
                    .await
            }
            PlannedActions::Project(actions) if actions.is_empty() => Ok(()),
            PlannedActions::Project(actions) => {
                if let Some(build_integrated) = project.as_build_integrated() {
                    let preview = self
                        .preview_build_integrated_project_actions(
                            build_integrated,
                            actions.clone(),
                            context,
                            operation,
                        )
                        .await?;
                    return self
                        .execute_build_integrated(build_integrated, &preview, direct_install, context, operation)
                        .await;
                }
                self.execute_actions(project, actions, direct_install, context, operation)
                    .await
            }
        }
    }

    async fn execute_actions(
        &self,
        project: &dyn Project,
        actions: &[NuGetProjectAction],
        direct_install: Option<&PackageIdentity>,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        let actions = self.expand_updates(project, actions).await?;
        let mut executed: Vec<NuGetProjectAction> = Vec::new();
        let mut to_delete: BTreeSet<PackageIdentity> = BTreeSet::new();

        let outcome = self
            .run_actions(project, &actions, &mut executed, &mut to_delete, context, operation)
            .await;

        if outcome.is_err() {
            self.rollback(project, &mut executed, &mut to_delete, context)
                .await;
            if let Err(e) = project.post_process(context).await {
                debug!("Post-processing {} after rollback failed: {}", project.name(), e);
            }
        }

        self.delete_uninstalled(project, &to_delete, context).await;

        match outcome {
            Ok(()) => {
                if let Some(identity) = direct_install
                    && !operation.is_cancelled()
                    && let Some(readme) = self.packages_folder.readme_path(identity)
                {
                    context.open_readme(&readme);
                }
                Ok(())
            }
            Err(e) => {
                context.log(MessageLevel::Error, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run_actions(
        &self,
        project: &dyn Project,
        actions: &[NuGetProjectAction],
        executed: &mut Vec<NuGetProjectAction>,
        to_delete: &mut BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
        operation: &OperationContext,
    ) -> Result<()> {
        check_cancelled(operation)?;
        project.pre_process(context).await?;

        let targets: Vec<(PackageIdentity, Vec<SharedSource>)> = actions
            .iter()
            .filter(|a| a.is_install())
            .map(|a| (a.identity.clone(), self.download_sources(a)))
            .collect();
        let mut prefetcher = PackagePrefetcher::start(
            &self.downloader,
            &self.packages_folder,
            targets,
            self.settings.max_parallel_downloads,
            operation.token(),
        );

        for action in actions {
            check_cancelled(operation)?;
            executed.push(action.clone());

            if action.is_uninstall() {
                self.execute_uninstall(project, &action.identity, to_delete, context)
                    .await?;
                context.log(
                    MessageLevel::Info,
                    &format!(
                        "Successfully uninstalled '{}' from {}",
                        action.identity,
                        project.name()
                    ),
                );
                continue;
            }

            let package = match prefetcher.take(&action.identity).await {
                Some(result) => result?,
                None => {
                    self.downloader
                        .download(&action.identity, &self.download_sources(action), operation.token())
                        .await?
                }
            };
            self.execute_install(project, &package, to_delete, context)
                .await?;
            context.log(
                MessageLevel::Info,
                &format!(
                    "Successfully installed '{}' to {}",
                    action.identity,
                    project.name()
                ),
            );
        }

        project.post_process(context).await
    }

    /// Sources an install may download from: the one that supplied the
    /// package when known, otherwise all of them
    fn download_sources(&self, action: &NuGetProjectAction) -> Vec<SharedSource> {
        match &action.source {
            Some(source) => vec![source.clone()],
            None => crate::protocol::dedup_sources(
                std::iter::once(self.packages_folder.as_source()).chain(self.sources.iter().cloned()),
            ),
        }
    }

    /// Replace update actions by an uninstall of the installed version and
    /// an install of the new one
    async fn expand_updates(
        &self,
        project: &dyn Project,
        actions: &[NuGetProjectAction],
    ) -> Result<Vec<NuGetProjectAction>> {
        if !actions.iter().any(|a| a.action_type == ActionType::Update) {
            return Ok(actions.to_vec());
        }

        let installed = project.installed_packages().await?;
        let mut expanded = Vec::with_capacity(actions.len() + 1);
        for action in actions {
            if action.action_type != ActionType::Update {
                expanded.push(action.clone());
                continue;
            }
            match installed.iter().find(|r| r.identity.same_id(&action.identity)) {
                Some(reference) if reference.identity == action.identity => continue,
                Some(reference) => expanded.push(NuGetProjectAction::uninstall(
                    reference.identity.clone(),
                    &action.project,
                )),
                None => {}
            }
            expanded.push(NuGetProjectAction::install(
                action.identity.clone(),
                action.source.clone(),
                &action.project,
            ));
        }
        Ok(expanded)
    }

    async fn execute_install(
        &self,
        project: &dyn Project,
        package: &DownloadedPackage,
        to_delete: &mut BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
    ) -> Result<()> {
        self.compatibility.validate(&package.manifest)?;
        to_delete.remove(package.identity());
        project.install_package(package, context).await?;
        Ok(())
    }

    async fn execute_uninstall(
        &self,
        project: &dyn Project,
        identity: &PackageIdentity,
        to_delete: &mut BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
    ) -> Result<()> {
        project.uninstall_package(identity, context).await?;
        to_delete.insert(identity.clone());
        Ok(())
    }

    /// Undo executed actions, newest first, ignoring failures
    async fn rollback(
        &self,
        project: &dyn Project,
        executed: &mut Vec<NuGetProjectAction>,
        to_delete: &mut BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
    ) {
        if executed.is_empty() {
            return;
        }
        context.log(
            MessageLevel::Warning,
            &format!("Rolling back package changes in project '{}'", project.name()),
        );

        while let Some(action) = executed.pop() {
            let undone = if action.is_install() {
                self.execute_uninstall(project, &action.identity, to_delete, context)
                    .await
            } else {
                to_delete.remove(&action.identity);
                match self.packages_folder.get_package(&action.identity) {
                    Some(package) => {
                        self.execute_install(project, &package, to_delete, context)
                            .await
                    }
                    None => {
                        warn!(
                            "{} is no longer in the packages folder and cannot be restored",
                            action.identity
                        );
                        Ok(())
                    }
                }
            };
            if let Err(e) = undone {
                debug!("Ignoring failure while undoing '{}': {}", action, e);
            }
        }
    }

    /// Remove package directories nothing references anymore
    async fn delete_uninstalled(
        &self,
        project: &dyn Project,
        to_delete: &BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
    ) {
        for identity in to_delete {
            match self
                .solution
                .package_exists_in_another_project(identity, project.name())
                .await
            {
                Ok(false) => {}
                Ok(true) => {
                    debug!("Keeping {}, another project still uses it", identity);
                    continue;
                }
                Err(e) => {
                    warn!("Could not check other projects for {}: {}", identity, e);
                    continue;
                }
            }
            if project.is_installed(identity).await.unwrap_or(true) {
                continue;
            }
            if !self.packages_folder.package_exists(identity) {
                continue;
            }

            match self.packages_folder.delete_package(identity) {
                Ok(()) => info!("Deleted {} from the packages folder", identity),
                Err(e) => context.log(
                    MessageLevel::Warning,
                    &format!("'{identity}' will be removed on the next run: {e}"),
                ),
            }
        }
    }

    /// Bring `identity` into the packages folder without touching projects
    ///
    /// Returns `false` when the package is already there. Uses the configured
    /// sources when `sources` is empty.
    pub async fn restore_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        sources: &[SharedSource],
        operation: &OperationContext,
    ) -> Result<bool> {
        check_cancelled(operation)?;
        if self.packages_folder.package_exists(identity) {
            return Ok(false);
        }

        context.log(MessageLevel::Info, &format!("Restoring package '{identity}'"));
        let sources = if sources.is_empty() {
            self.sources.as_slice()
        } else {
            sources
        };
        let package = self
            .downloader
            .download(identity, sources, operation.token())
            .await?;
        self.packages_folder
            .install(&package.manifest, &package.content)
            .await
    }

    /// Remove directories left by earlier failed deletions in both folders
    ///
    /// Packages a project of the solution still references are kept.
    pub async fn cleanup_marked_packages(&self) -> Result<usize> {
        let in_use = self.solution.referenced_packages().await?;
        Ok(self.packages_folder.cleanup_marked(&in_use)?
            + self.global_folder.cleanup_marked(&in_use)?)
    }
}
