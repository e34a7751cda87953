// src/resolver/diagnostic.rs

//! Explaining a failed resolution
//!
//! When no solution exists the resolver hands its best partial solution here
//! and gets back a single message naming the most relevant broken package.

use super::sort::lowest_distance_from_target;
use crate::packaging::{PackageDependency, PackageReference, SourcePackageDependencyInfo, id_key};
use crate::project::PACKAGES_CONFIG_FILE;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// A problem found in a failed or invalid solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// No candidate exists for a dependency at all
    MissingDependency { package: String, sources: Vec<String> },
    /// The only available version does not satisfy its dependants
    IncompatibleVersion {
        package: String,
        dependants: Vec<String>,
    },
    /// No available version satisfies every dependant
    NoCompatibleVersion {
        package: String,
        dependants: Vec<String>,
    },
    /// The chosen packages depend on each other in a loop
    CircularDependency { cycle: Vec<String> },
    /// Nothing specific could be pinned down
    NoSolution,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::MissingDependency { package, sources } if sources.is_empty() => {
                write!(f, "Unable to resolve dependency '{}'.", package)
            }
            Conflict::MissingDependency { package, sources } => {
                let quoted: Vec<String> = sources.iter().map(|s| format!("'{}'", s)).collect();
                write!(
                    f,
                    "Unable to resolve dependency '{}'. Source(s) used: {}.",
                    package,
                    quoted.join(", ")
                )
            }
            Conflict::IncompatibleVersion {
                package,
                dependants,
            } => write!(
                f,
                "Unable to resolve dependencies. '{}' is not compatible with {}.",
                package,
                dependants.join(", ")
            ),
            Conflict::NoCompatibleVersion {
                package,
                dependants,
            } => write!(
                f,
                "Unable to find a version of '{}' that is compatible with {}.",
                package,
                dependants.join(", ")
            ),
            Conflict::CircularDependency { cycle } => {
                write!(f, "Circular dependency detected '{}'.", cycle.join(" => "))
            }
            Conflict::NoSolution => write!(f, "Unable to resolve dependencies."),
        }
    }
}

fn find<'a>(
    packages: &'a [SourcePackageDependencyInfo],
    id: &str,
) -> Option<&'a SourcePackageDependencyInfo> {
    packages.iter().find(|p| p.identity.has_id(id))
}

fn dependency_on<'a>(package: &'a SourcePackageDependencyInfo, id: &str) -> Option<&'a PackageDependency> {
    package.dependencies.iter().find(|d| d.has_id(id))
}

fn is_satisfied(dependency: &PackageDependency, package: Option<&SourcePackageDependencyInfo>) -> bool {
    package.is_some_and(|p| dependency.range.satisfies(&p.identity.version))
}

/// Build the user-facing message for an unresolvable set of packages
pub fn get_diagnostic_message(
    solution: &[SourcePackageDependencyInfo],
    available: &[SourcePackageDependencyInfo],
    packages_config: &[PackageReference],
    new_package_ids: &[String],
    sources: &[String],
) -> String {
    let error = |id: &str| get_error_message(id, solution, available, packages_config, sources);

    let new_ids: HashSet<String> = new_package_ids.iter().map(|id| id_key(id)).collect();
    let installed_ids: HashSet<String> = packages_config.iter().map(|r| r.identity.key()).collect();
    let required_ids: HashSet<String> = new_ids.union(&installed_ids).cloned().collect();

    let required = sorted_by_id(solution, |p| required_ids.contains(&p.identity.key()));

    // 1. a required package does not accept the new target
    let mut sorted_new: Vec<&String> = new_ids.iter().collect();
    sorted_new.sort();
    for target in sorted_new {
        let chosen = find(solution, target);
        let broken = required.iter().any(|p| {
            dependency_on(p, target).is_some_and(|d| !is_satisfied(d, chosen))
        });
        if broken {
            return error(target);
        }
    }

    // 2. the new targets' dependency trees can't be satisfied by anything available
    let mut visited = HashSet::new();
    for target in sorted_by_id(solution, |p| new_ids.contains(&p.identity.key())) {
        let mut broken = broken_dependencies_with_available(target, solution, available, &mut visited);
        broken.sort_by_key(|d| id_key(&d.id));
        if let Some(dependency) = broken.first() {
            return error(&dependency.id);
        }
    }

    // 3. an installed package lost a dependency
    for package in sorted_by_id(solution, |p| installed_ids.contains(&p.identity.key())) {
        if let Some(dependency) = first_broken_dependency(package, solution) {
            return error(&dependency.id);
        }
    }

    // 4. a new dependency has a broken dependency, nearest to a target first
    let mut new_dependencies = sorted_by_id(solution, |p| !required_ids.contains(&p.identity.key()));
    new_dependencies.sort_by_key(|p| {
        (
            lowest_distance_from_target(p.id(), &required_ids, solution),
            p.identity.key(),
        )
    });
    for package in new_dependencies {
        if let Some(dependency) = first_broken_dependency(package, solution) {
            return error(&dependency.id);
        }
    }

    Conflict::NoSolution.to_string()
}

fn sorted_by_id<F>(
    solution: &[SourcePackageDependencyInfo],
    filter: F,
) -> Vec<&SourcePackageDependencyInfo>
where
    F: Fn(&SourcePackageDependencyInfo) -> bool,
{
    let mut packages: Vec<&SourcePackageDependencyInfo> =
        solution.iter().filter(|p| filter(p)).collect();
    packages.sort_by_key(|p| p.identity.key());
    packages
}

fn first_broken_dependency<'a>(
    package: &'a SourcePackageDependencyInfo,
    solution: &[SourcePackageDependencyInfo],
) -> Option<&'a PackageDependency> {
    let mut broken: Vec<&PackageDependency> = package
        .dependencies
        .iter()
        .filter(|d| !is_satisfied(d, find(solution, &d.id)))
        .collect();
    broken.sort_by_key(|d| id_key(&d.id));
    broken.first().copied()
}

/// Breadth-first walk from `package` collecting dependencies that neither the
/// solution nor any available package can satisfy
fn broken_dependencies_with_available<'a>(
    package: &'a SourcePackageDependencyInfo,
    solution: &'a [SourcePackageDependencyInfo],
    available: &[SourcePackageDependencyInfo],
    visited: &mut HashSet<String>,
) -> Vec<&'a PackageDependency> {
    let mut broken = Vec::new();
    if visited.contains(&package.identity.key()) {
        return broken;
    }

    let mut queue = VecDeque::from([package]);
    while let Some(node) = queue.pop_front() {
        for dependency in &node.dependencies {
            let target = find(solution, &dependency.id);
            let unsatisfiable = match target {
                None => true,
                Some(t) => {
                    !dependency.range.satisfies(&t.identity.version)
                        && !available
                            .iter()
                            .filter(|p| p.identity.has_id(&dependency.id))
                            .any(|p| dependency.range.satisfies(&p.identity.version))
                }
            };
            if unsatisfiable {
                broken.push(dependency);
            }

            if let Some(target) = target
                && visited.insert(id_key(&dependency.id))
            {
                queue.push_back(target);
            }
        }
    }

    broken
}

/// `'A 1.0.0 constraint: B (>= 1.0.0)'`
fn format_dependency_constraint(package: &SourcePackageDependencyInfo, dependency_id: &str) -> String {
    let dependency = match dependency_on(package, dependency_id) {
        Some(d) => format!("{} {}", d.id, d.range.pretty_print()),
        None => dependency_id.to_string(),
    };
    format!(
        "'{} {} constraint: {}'",
        package.id(),
        package.identity.version.to_normalized_string(),
        dependency.trim()
    )
}

/// Message for one problem package
pub fn get_error_message(
    problem_id: &str,
    solution: &[SourcePackageDependencyInfo],
    available: &[SourcePackageDependencyInfo],
    packages_config: &[PackageReference],
    sources: &[String],
) -> String {
    let problem = find(solution, problem_id);
    // Callers may pass a case-folded key; messages show the id as published
    let display_id = problem
        .or_else(|| find(available, problem_id))
        .map(|p| p.id())
        .or_else(|| {
            solution
                .iter()
                .find_map(|p| dependency_on(p, problem_id))
                .map(|d| d.id.as_str())
        })
        .unwrap_or(problem_id);

    let mut dependants: Vec<String> = solution
        .iter()
        .filter(|p| dependency_on(p, problem_id).is_some_and(|d| !is_satisfied(d, problem)))
        .map(|p| format_dependency_constraint(p, problem_id))
        .collect();
    dependants.sort_by_key(|s| s.to_ascii_lowercase());

    let config_entry = packages_config.iter().find(|r| r.identity.has_id(problem_id));
    let allowed_versions = config_entry.and_then(|r| r.allowed_versions.as_ref());

    let options: Vec<&SourcePackageDependencyInfo> = available
        .iter()
        .filter(|p| p.identity.has_id(problem_id))
        .collect();

    let conflict = if options.is_empty() || dependants.is_empty() {
        Conflict::MissingDependency {
            package: display_id.to_string(),
            sources: sources.to_vec(),
        }
    } else if options.len() == 1 && allowed_versions.is_none() {
        Conflict::IncompatibleVersion {
            package: format!(
                "{} {}",
                display_id,
                options[0].identity.version.to_normalized_string()
            ),
            dependants,
        }
    } else {
        Conflict::NoCompatibleVersion {
            package: display_id.to_string(),
            dependants,
        }
    };

    let mut message = conflict.to_string();
    if let Some(allowed) = allowed_versions {
        message.push_str(&format!(
            " '{}' has an additional constraint {} defined in {}.",
            display_id,
            allowed.pretty_print(),
            PACKAGES_CONFIG_FILE
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::TargetFramework;
    use crate::packaging::PackageIdentity;
    use crate::version::VersionRange;

    fn package(id: &str, version: &str, deps: &[(&str, &str)]) -> SourcePackageDependencyInfo {
        SourcePackageDependencyInfo::new(
            PackageIdentity::parse(id, version).unwrap(),
            deps.iter()
                .map(|(d, r)| PackageDependency::new(*d, VersionRange::parse(r).unwrap()))
                .collect(),
            true,
            "feed",
        )
    }

    #[test]
    fn test_incompatible_single_version() {
        let a = package("A", "1.0", &[("B", "[1.5]")]);
        let b = package("B", "1.4", &[]);
        let solution = vec![a.clone(), b.clone()];
        let message = get_diagnostic_message(&solution, &solution, &[], &["A".to_string()], &[]);
        assert_eq!(
            message,
            "Unable to resolve dependencies. 'B 1.4.0' is not compatible with 'A 1.0.0 constraint: B (= 1.5.0)'."
        );
    }

    #[test]
    fn test_missing_dependency() {
        let a = package("A", "1.0", &[("B", "1.0")]);
        let solution = vec![a];
        let message = get_diagnostic_message(&solution, &solution, &[], &["A".to_string()], &[]);
        assert_eq!(message, "Unable to resolve dependency 'B'.");

        let sources = vec!["nuget.org".to_string(), "local".to_string()];
        let message = get_diagnostic_message(&solution, &solution, &[], &["A".to_string()], &sources);
        assert_eq!(
            message,
            "Unable to resolve dependency 'B'. Source(s) used: 'nuget.org', 'local'."
        );
    }

    #[test]
    fn test_no_compatible_version_with_config_constraint() {
        let a = package("A", "1.0", &[("B", "[2.0]")]);
        let b1 = package("B", "1.0", &[]);
        let b3 = package("B", "3.0", &[]);
        let solution = vec![a.clone(), b1.clone()];
        let available = vec![a, b1, b3];
        let config = vec![
            PackageReference::new(PackageIdentity::parse("B", "1.0").unwrap(), TargetFramework::any())
                .with_allowed_versions(VersionRange::parse("[1.0, 2.0)").unwrap()),
        ];
        let message = get_diagnostic_message(&solution, &available, &config, &["A".to_string()], &[]);
        assert_eq!(
            message,
            "Unable to find a version of 'B' that is compatible with 'A 1.0.0 constraint: B (= 2.0.0)'. \
             'B' has an additional constraint (>= 1.0.0 && < 2.0.0) defined in packages.config."
        );
    }

    #[test]
    fn test_installed_package_broken_by_target() {
        let installed = package("Old", "1.0", &[("A", "[1.0]")]);
        let a = package("A", "2.0", &[]);
        let solution = vec![installed, a];
        let config = vec![PackageReference::new(
            PackageIdentity::parse("Old", "1.0").unwrap(),
            TargetFramework::any(),
        )];
        let message = get_diagnostic_message(&solution, &solution, &config, &["A".to_string()], &[]);
        assert_eq!(
            message,
            "Unable to resolve dependencies. 'A 2.0.0' is not compatible with 'Old 1.0.0 constraint: A (= 1.0.0)'."
        );
    }

    #[test]
    fn test_message_keeps_published_id_casing() {
        let app = package("App", "1.0", &[("Json.Net", "[2.0]")]);
        let json = package("Json.Net", "1.0", &[]);
        let solution = vec![app, json];
        let message = get_error_message("json.net", &solution, &solution, &[], &[]);
        assert_eq!(
            message,
            "Unable to resolve dependencies. 'Json.Net 1.0.0' is not compatible with 'App 1.0.0 constraint: Json.Net (= 2.0.0)'."
        );

        let missing = get_error_message("gone", &[], &[], &[], &["feed".to_string()]);
        assert!(missing.contains("'gone'"));
    }

    #[test]
    fn test_valid_solution_has_no_problem() {
        let a = package("A", "1.0", &[("B", "1.0")]);
        let b = package("B", "1.0", &[]);
        let solution = vec![a, b];
        let message = get_diagnostic_message(&solution, &solution, &[], &["A".to_string()], &[]);
        assert_eq!(message, Conflict::NoSolution.to_string());
    }

    #[test]
    fn test_circular_display() {
        let conflict = Conflict::CircularDependency {
            cycle: vec!["A 1.0.0".into(), "B 1.0.0".into(), "A 1.0.0".into()],
        };
        assert_eq!(
            conflict.to_string(),
            "Circular dependency detected 'A 1.0.0 => B 1.0.0 => A 1.0.0'."
        );
    }
}
