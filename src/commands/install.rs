// src/commands/install.rs
//! Package installation command

use super::{Session, print_plan};
use anyhow::Result;
use nupm::packaging::PackageIdentity;
use nupm::Error;
use std::path::Path;
use tracing::info;

/// Install a package into the selected projects
#[allow(clippy::too_many_arguments)]
pub async fn cmd_install(
    config_path: Option<&Path>,
    project: Option<&str>,
    package: &str,
    version: Option<&str>,
    prerelease: bool,
    dependency_behavior: Option<&str>,
    source_names: &[String],
    dry_run: bool,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let projects = session.projects(project)?;
    let resolution = session.resolution(dependency_behavior, prerelease)?;
    let sources = session.sources(source_names)?;
    let manager = &session.manager;

    // One version for every project, so a solution stays consistent
    let identity = match version {
        Some(version) => PackageIdentity::parse(package, version)?,
        None => {
            let framework = projects[0].target_framework();
            let latest = manager
                .get_latest_version(package, &framework, &resolution, &sources.primary, &session.operation)
                .await?;
            let version = latest
                .latest_version
                .ok_or_else(|| anyhow::anyhow!("Package '{}' was not found on any source", package))?;
            PackageIdentity::new(package, version)
        }
    };
    info!("Installing {} into {} project(s)", identity, projects.len());

    if dry_run {
        for project in &projects {
            match manager
                .preview_install_package(
                    project.as_ref(),
                    &identity,
                    &resolution,
                    &session.context,
                    &sources,
                    &session.operation,
                )
                .await
            {
                Ok(plan) => print_plan(project.name(), &plan),
                Err(Error::AlreadyInstalled { .. }) => {
                    println!("{}: {} is already installed", project.name(), identity);
                }
                Err(e) => return Err(e.into()),
            }
        }
        println!("\nDry run: no changes made.");
        return Ok(());
    }

    let installed_into = manager
        .install_package_in_projects(
            &projects,
            &identity,
            &resolution,
            &session.context,
            &sources,
            &session.operation,
        )
        .await?;

    if installed_into == 0 {
        println!("{} is already installed", identity);
    } else {
        println!("Installed {} into {} project(s)", identity, installed_into);
    }
    Ok(())
}
