// src/resolver/prune.rs

//! Candidate pruning
//!
//! Each function narrows the gathered candidate set before resolution. The
//! planner applies them in a fixed order per operation; the `throw_if_*`
//! helpers raise user errors for explicit targets that pruning would
//! otherwise silently remove.

use crate::error::{Error, Result};
use crate::packaging::{PackageIdentity, PackageReference, SourcePackageDependencyInfo};
use crate::version::VersionConstraints;
use std::collections::HashSet;

type Packages = Vec<SourcePackageDependencyInfo>;

/// Keep only `target` among the versions of its id
pub fn remove_all_versions_for_id_except(packages: Packages, target: &PackageIdentity) -> Packages {
    packages
        .into_iter()
        .filter(|p| !p.identity.same_id(target) || p.identity.version == target.version)
        .collect()
}

/// Drop versions lower than the installed version of the same id
pub fn prune_downgrades(packages: Packages, installed: &[PackageReference]) -> Packages {
    packages
        .into_iter()
        .filter(|p| {
            !installed.iter().any(|r| {
                r.identity.same_id(&p.identity) && p.identity.version < r.identity.version
            })
        })
        .collect()
}

/// Drop prerelease versions unless a target or package being installed with
/// that id is itself prerelease
pub fn prune_prerelease_for_stable_targets(
    packages: Packages,
    targets: &[PackageIdentity],
    packages_to_install: &[PackageIdentity],
) -> Packages {
    let allowed: HashSet<String> = targets
        .iter()
        .chain(packages_to_install)
        .filter(|p| p.version.is_prerelease())
        .map(|p| p.key())
        .collect();

    packages
        .into_iter()
        .filter(|p| !p.identity.version.is_prerelease() || allowed.contains(&p.identity.key()))
        .collect()
}

/// Drop prerelease versions except for ids installed as prerelease
///
/// For update-all the exception only covers prereleases of the same
/// numeric version as the installed one.
pub fn prune_prerelease_except_allowed(
    packages: Packages,
    installed: &[PackageIdentity],
    is_update_all: bool,
) -> Packages {
    let prerelease_installed: Vec<&PackageIdentity> =
        installed.iter().filter(|p| p.version.is_prerelease()).collect();

    packages
        .into_iter()
        .filter(|p| {
            if !p.identity.version.is_prerelease() {
                return true;
            }
            prerelease_installed.iter().any(|i| {
                i.same_id(&p.identity)
                    && (!is_update_all
                        || (i.version.major, i.version.minor, i.version.patch, i.version.revision)
                            == (
                                p.identity.version.major,
                                p.identity.version.minor,
                                p.identity.version.patch,
                                p.identity.version.revision,
                            ))
            })
        })
        .collect()
}

/// Drop candidates that break the update constraints of installed packages
pub fn prune_by_update_constraints(
    packages: Packages,
    installed: &[PackageReference],
    constraints: VersionConstraints,
) -> Packages {
    if constraints == VersionConstraints::none() {
        return packages;
    }

    packages
        .into_iter()
        .filter(|p| {
            installed
                .iter()
                .find(|r| r.identity.same_id(&p.identity))
                .is_none_or(|r| constraints.allows(&r.identity.version, &p.identity.version))
        })
        .collect()
}

/// Keep only the highest version of `id`
pub fn prune_all_but_highest(packages: Packages, id: &str) -> Packages {
    let highest = packages
        .iter()
        .filter(|p| p.identity.has_id(id))
        .map(|p| p.identity.version.clone())
        .max();

    match highest {
        Some(highest) => packages
            .into_iter()
            .filter(|p| !p.identity.has_id(id) || p.identity.version == highest)
            .collect(),
        None => packages,
    }
}

/// Honor `allowed_versions` on existing references
pub fn prune_disallowed_versions(packages: Packages, installed: &[PackageReference]) -> Packages {
    packages
        .into_iter()
        .filter(|p| {
            installed
                .iter()
                .filter(|r| r.identity.same_id(&p.identity))
                .all(|r| {
                    r.allowed_versions
                        .as_ref()
                        .is_none_or(|range| range.satisfies(&p.identity.version))
                })
        })
        .collect()
}

/// Keep only the requested version of every primary target id
pub fn prune_by_primary_targets(packages: Packages, targets: &[PackageIdentity]) -> Packages {
    packages
        .into_iter()
        .filter(|p| {
            targets
                .iter()
                .filter(|t| t.same_id(&p.identity))
                .all(|t| t.version == p.identity.version)
        })
        .collect()
}

/// Raise when every remaining version of a target is disallowed by its reference
pub fn throw_if_version_is_disallowed(
    target_ids: &[String],
    installed: &[PackageReference],
    packages: &[SourcePackageDependencyInfo],
) -> Result<()> {
    for id in target_ids {
        let Some(reference) = installed.iter().find(|r| r.identity.has_id(id)) else {
            continue;
        };
        let Some(allowed) = reference.allowed_versions.as_ref() else {
            continue;
        };

        let candidates: Vec<&SourcePackageDependencyInfo> =
            packages.iter().filter(|p| p.identity.has_id(id)).collect();
        if !candidates.is_empty() && !candidates.iter().any(|p| allowed.satisfies(&p.identity.version)) {
            let versions: Vec<String> = candidates
                .iter()
                .map(|p| p.identity.version.to_string())
                .collect();
            return Err(Error::VersionDisallowed {
                package: reference.identity.id.clone(),
                version: versions.join(", "),
                allowed: allowed.pretty_print(),
            });
        }
    }
    Ok(())
}

/// Raise when the installed version of `id` is newer than anything left
pub fn throw_if_newer_version_already_referenced(
    id: &str,
    installed: &[PackageReference],
    packages: &[SourcePackageDependencyInfo],
) -> Result<()> {
    let Some(reference) = installed.iter().find(|r| r.identity.has_id(id)) else {
        return Ok(());
    };

    let highest = packages
        .iter()
        .filter(|p| p.identity.has_id(id))
        .map(|p| &p.identity.version)
        .max();

    if let Some(highest) = highest
        && &reference.identity.version > highest
    {
        return Err(Error::NewerVersionAlreadyReferenced {
            package: reference.identity.id.clone(),
            installed: reference.identity.version.to_string(),
            requested: highest.to_string(),
        });
    }
    Ok(())
}
