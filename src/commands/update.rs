// src/commands/update.rs
//! Package update command

use super::{Session, print_plan};
use anyhow::Result;
use nupm::Error;
use nupm::manager::UpdateRequest;
use nupm::packaging::PackageIdentity;
use nupm::version::VersionConstraints;
use std::path::Path;
use tracing::info;

/// Update one package, or every user-installed package, in the selected projects
#[allow(clippy::too_many_arguments)]
pub async fn cmd_update(
    config_path: Option<&Path>,
    project: Option<&str>,
    package: Option<&str>,
    version: Option<&str>,
    prerelease: bool,
    safe: bool,
    reinstall: bool,
    source_names: &[String],
    dry_run: bool,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let projects = session.projects(project)?;
    let sources = session.sources(source_names)?;

    let mut constraints = VersionConstraints::none();
    if reinstall {
        constraints = VersionConstraints::exact();
    } else if safe {
        constraints.exact_major = true;
    }
    let resolution = session
        .resolution(None, prerelease)?
        .with_constraints(constraints);

    let request = match (package, version) {
        (Some(id), Some(version)) => UpdateRequest::Identities(vec![PackageIdentity::parse(id, version)?]),
        (Some(id), None) => UpdateRequest::Id(id.to_string()),
        (None, _) => UpdateRequest::All,
    };
    info!("Updating {:?} in {} project(s)", request, projects.len());

    let mut changed = 0;
    for target in &projects {
        let plan = match session
            .manager
            .preview_update_packages(
                target.as_ref(),
                &request,
                &resolution,
                &session.context,
                &sources,
                &session.operation,
            )
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
        if plan.is_empty() {
            continue;
        }
        session
            .manager
            .execute_project_actions(target.as_ref(), &plan, &session.context, &session.operation)
            .await?;
        changed += 1;
    }

    if dry_run {
        println!("\nDry run: no changes made.");
    } else if changed == 0 {
        println!("All packages are up to date");
    } else {
        println!("Updated {} project(s)", changed);
    }
    Ok(())
}
