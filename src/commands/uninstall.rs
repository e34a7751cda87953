// src/commands/uninstall.rs
//! Package removal command

use super::{Session, print_plan};
use anyhow::Result;
use nupm::Error;
use nupm::manager::UninstallationContext;
use std::path::Path;
use tracing::info;

/// Uninstall a package from the selected projects
///
/// Without `--project`, every project referencing the package loses it;
/// projects that do not reference it are skipped.
pub async fn cmd_uninstall(
    config_path: Option<&Path>,
    project: Option<&str>,
    package: &str,
    remove_dependencies: bool,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let projects = session.projects(project)?;
    let uninstall = UninstallationContext::new(remove_dependencies, force);
    let manager = &session.manager;
    info!("Uninstalling {} (remove_dependencies={}, force={})", package, remove_dependencies, force);

    let mut removed_from = 0;
    for target in &projects {
        let plan = match manager
            .preview_uninstall_package(target.as_ref(), package, &uninstall, &session.context, &session.operation)
            .await
        {
            Ok(plan) => plan,
            Err(Error::PackageNotInstalled { .. }) if project.is_none() => continue,
            Err(e) => return Err(e.into()),
        };

        if dry_run {
            print_plan(target.name(), &plan);
            continue;
        }
        manager
            .execute_project_actions(target.as_ref(), &plan, &session.context, &session.operation)
            .await?;
        removed_from += 1;
    }

    if dry_run {
        println!("\nDry run: no changes made.");
    } else if removed_from == 0 {
        return Err(anyhow::anyhow!("Package '{}' is not installed in any project", package));
    } else {
        println!("Uninstalled {} from {} project(s)", package, removed_from);
    }
    Ok(())
}
