// src/commands/list.rs
//! Installed package listing

use super::Session;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ProjectListing {
    project: String,
    build_integrated: bool,
    packages: Vec<PackageListing>,
}

#[derive(Serialize)]
struct PackageListing {
    id: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_versions: Option<String>,
    development_dependency: bool,
}

/// List the packages of the selected projects, dependencies first where the
/// packages folder knows them
pub async fn cmd_list(config_path: Option<&Path>, project: Option<&str>, json: bool) -> Result<()> {
    let session = Session::open(config_path)?;
    let mut listings = Vec::new();

    for target in session.projects(project)? {
        let mut references = target.installed_packages().await?;
        let order = session
            .manager
            .get_installed_packages_in_dependency_order(target.as_ref())
            .await?;
        references.sort_by_key(|r| {
            order
                .iter()
                .position(|p| *p == r.identity)
                .unwrap_or(usize::MAX)
        });

        listings.push(ProjectListing {
            project: target.name().to_string(),
            build_integrated: target.is_build_integrated(),
            packages: references
                .into_iter()
                .map(|r| PackageListing {
                    id: r.identity.id.clone(),
                    version: r.identity.version.to_string(),
                    allowed_versions: r.allowed_versions.map(|range| range.to_string()),
                    development_dependency: r.development_dependency,
                })
                .collect(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    for listing in &listings {
        let kind = if listing.build_integrated { "package spec" } else { "packages.config" };
        println!("{} ({}):", listing.project, kind);
        if listing.packages.is_empty() {
            println!("  (no packages)");
        }
        for package in &listing.packages {
            match &package.allowed_versions {
                Some(allowed) => println!("  {} {} [allowed: {}]", package.id, package.version, allowed),
                None => println!("  {} {}", package.id, package.version),
            }
        }
    }
    Ok(())
}
