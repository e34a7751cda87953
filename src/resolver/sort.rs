// src/resolver/sort.rs

//! Ordering and cycle detection over a resolved package set
//!
//! A solution holds exactly one package per id, so edges are followed by id.
//! Ties are always broken by case-insensitive id to keep output stable.

use crate::packaging::{SourcePackageDependencyInfo, id_key};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Maximum depth walked when measuring distance from a target
pub const MAX_DISTANCE: usize = 20;

/// Sort packages so that dependencies come before their dependants
///
/// Kahn's algorithm with the ready set ordered by id. Packages that never
/// become ready (cycles, or dependencies outside the set) are appended at the
/// end, sorted by id.
pub fn topological_sort(nodes: &[SourcePackageDependencyInfo]) -> Vec<SourcePackageDependencyInfo> {
    let by_key: HashMap<String, &SourcePackageDependencyInfo> =
        nodes.iter().map(|n| (n.identity.key(), n)).collect();

    // Remaining unsatisfied dependency ids per package
    let mut pending: HashMap<String, HashSet<String>> = HashMap::new();
    // Reverse edges: dependency id -> dependants
    let mut dependants: HashMap<String, Vec<String>> = HashMap::new();

    for node in nodes {
        let key = node.identity.key();
        let deps: HashSet<String> = node.dependencies.iter().map(|d| id_key(&d.id)).collect();
        for dep in &deps {
            dependants.entry(dep.clone()).or_default().push(key.clone());
        }
        pending.insert(key, deps);
    }

    let mut ready: BTreeMap<String, ()> = pending
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(key, _)| (key.clone(), ()))
        .collect();

    let mut result = Vec::with_capacity(nodes.len());
    let mut placed: HashSet<String> = HashSet::new();

    while let Some((key, ())) = ready.pop_first() {
        if !placed.insert(key.clone()) {
            continue;
        }
        if let Some(node) = by_key.get(&key) {
            result.push((*node).clone());
        }

        if let Some(parents) = dependants.get(&key) {
            for parent in parents {
                if placed.contains(parent) {
                    continue;
                }
                if let Some(deps) = pending.get_mut(parent) {
                    deps.remove(&key);
                    if deps.is_empty() {
                        ready.insert(parent.clone(), ());
                    }
                }
            }
        }
    }

    let mut unsorted: Vec<&SourcePackageDependencyInfo> = nodes
        .iter()
        .filter(|n| !placed.contains(&n.identity.key()))
        .collect();
    unsorted.sort_by_key(|n| n.identity.key());
    result.extend(unsorted.into_iter().cloned());

    result
}

/// Find the first dependency cycle in a solution
///
/// Packages are visited in the given order, so sorting topologically first
/// keeps the walk short. The returned path starts at the package where the
/// walk began and ends with the repeated package.
pub fn find_first_circular_dependency(
    solution: &[SourcePackageDependencyInfo],
) -> Option<Vec<SourcePackageDependencyInfo>> {
    let lookup: HashMap<String, &SourcePackageDependencyInfo> =
        solution.iter().map(|p| (p.identity.key(), p)).collect();

    let mut visited = HashSet::new();
    for package in solution {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        if dfs_cycle_detect(package, &lookup, &mut visited, &mut on_path, &mut path) {
            return Some(path.into_iter().cloned().collect());
        }
    }

    None
}

fn dfs_cycle_detect<'a>(
    package: &'a SourcePackageDependencyInfo,
    lookup: &HashMap<String, &'a SourcePackageDependencyInfo>,
    visited: &mut HashSet<String>,
    on_path: &mut HashSet<String>,
    path: &mut Vec<&'a SourcePackageDependencyInfo>,
) -> bool {
    let key = package.identity.key();
    if visited.contains(&key) {
        return false;
    }

    on_path.insert(key.clone());
    path.push(package);

    let mut deps: Vec<String> = package.dependencies.iter().map(|d| id_key(&d.id)).collect();
    deps.sort();
    deps.dedup();

    for dep in deps {
        let Some(next) = lookup.get(&dep) else {
            continue;
        };
        if on_path.contains(&dep) {
            path.push(next);
            return true;
        }
        if dfs_cycle_detect(next, lookup, visited, on_path, path) {
            return true;
        }
    }

    on_path.remove(&key);
    path.pop();
    visited.insert(key);
    false
}

/// Number of dependency hops from the nearest target to `id`, capped at
/// [`MAX_DISTANCE`]
pub fn lowest_distance_from_target(
    id: &str,
    targets: &HashSet<String>,
    packages: &[SourcePackageDependencyInfo],
) -> usize {
    let wanted = id_key(id);
    let mut walked: HashSet<String> = packages
        .iter()
        .map(|p| p.identity.key())
        .filter(|key| targets.contains(key))
        .collect();

    let mut level = 0;
    while level < MAX_DISTANCE && !walked.contains(&wanted) {
        level += 1;

        let next: Vec<String> = packages
            .iter()
            .filter(|p| walked.contains(&p.identity.key()))
            .flat_map(|p| p.dependencies.iter().map(|d| id_key(&d.id)))
            .filter(|dep| packages.iter().any(|p| &p.identity.key() == dep))
            .collect();

        walked.extend(next);
    }

    level
}
