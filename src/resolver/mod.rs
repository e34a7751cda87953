// src/resolver/mod.rs

//! Dependency resolution
//!
//! Picks exactly one version per package id such that every dependency range
//! of every chosen package is satisfied, all required ids are present and the
//! result is acyclic. The search is a depth-first backtracking walk over
//! ordered candidates; candidates that can never be satisfied are removed up
//! front so that hopeless branches fail without being explored.

pub mod context;
pub mod diagnostic;
pub mod prune;
pub mod sort;

pub use context::{DependencyBehavior, ResolverContext};
pub use diagnostic::{Conflict, get_diagnostic_message};
pub use sort::{find_first_circular_dependency, topological_sort};

use crate::error::{Error, Result};
use crate::packaging::{PackageDependency, SourcePackageDependencyInfo, id_key};
use crate::version::NuGetVersion;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Domains = HashMap<String, Vec<SourcePackageDependencyInfo>>;

/// Backtracking package resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageResolver;

impl PackageResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a consistent set of packages, dependencies first
    pub fn resolve(
        &self,
        context: &ResolverContext,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let ignore = context.dependency_behavior == DependencyBehavior::Ignore;

        let required: BTreeSet<String> = context
            .required_package_ids
            .iter()
            .chain(&context.target_ids)
            .map(|id| id_key(id))
            .collect();

        let mut domains = build_domains(context, ignore);
        debug!(
            "Resolving {} required ids over {} candidate ids",
            required.len(),
            domains.len()
        );

        for id in &required {
            if domains.get(id).is_none_or(|c| c.is_empty()) {
                let display = context
                    .target_ids
                    .iter()
                    .chain(&context.required_package_ids)
                    .find(|t| &id_key(t) == id)
                    .cloned()
                    .unwrap_or_else(|| id.clone());
                return Err(Error::ResolutionError(
                    Conflict::MissingDependency {
                        package: display,
                        sources: context.package_sources.clone(),
                    }
                    .to_string(),
                ));
            }
        }

        let unpruned = domains.clone();
        remove_unsatisfiable(&mut domains);

        let viable = required
            .iter()
            .all(|id| domains.get(id).is_some_and(|c| !c.is_empty()));

        let solution = if viable {
            let mut search = Search {
                domains: &domains,
                token,
                chosen: HashMap::new(),
            };
            if search.solve(&required)? {
                Some(search.chosen.into_values().collect::<Vec<_>>())
            } else {
                None
            }
        } else {
            None
        };

        let Some(solution) = solution else {
            let partial = best_effort_solution(&unpruned, &required);
            let message = get_diagnostic_message(
                &partial,
                &context.available_packages,
                &context.packages_config,
                &context.target_ids,
                &context.package_sources,
            );
            return Err(Error::ResolutionError(message));
        };

        let sorted = topological_sort(&solution);
        if let Some(cycle) = find_first_circular_dependency(&sorted) {
            let cycle = cycle
                .iter()
                .map(|p| format!("{} {}", p.id(), p.identity.version.to_normalized_string()))
                .collect();
            return Err(Error::ResolutionError(
                Conflict::CircularDependency { cycle }.to_string(),
            ));
        }

        debug!("Resolved {} packages", sorted.len());
        Ok(sorted)
    }
}

/// Group, dedupe and order candidates per id
fn build_domains(context: &ResolverContext, ignore: bool) -> Domains {
    let preferred: HashMap<String, &NuGetVersion> = context
        .preferred_versions
        .iter()
        .map(|p| (p.key(), &p.version))
        .collect();
    let targets: HashSet<String> = context.target_ids.iter().map(|id| id_key(id)).collect();

    let mut seen = HashSet::new();
    let mut domains: Domains = HashMap::new();
    for package in &context.available_packages {
        if !seen.insert(package.identity.clone()) {
            continue;
        }
        let mut package = package.clone();
        if ignore {
            package.dependencies.clear();
        }
        domains.entry(package.identity.key()).or_default().push(package);
    }

    for (id, candidates) in domains.iter_mut() {
        let prefer = preferred.get(id).copied();
        let highest_first = targets.contains(id) && prefer.is_none();
        candidates.sort_by(|a, b| {
            compare_candidates(a, b, prefer, highest_first, context.dependency_behavior)
        });
    }

    domains
}

fn compare_candidates(
    a: &SourcePackageDependencyInfo,
    b: &SourcePackageDependencyInfo,
    preferred: Option<&NuGetVersion>,
    highest_first: bool,
    behavior: DependencyBehavior,
) -> Ordering {
    let (va, vb) = (&a.identity.version, &b.identity.version);
    let is_preferred = |v: &NuGetVersion| preferred.is_some_and(|p| p == v);

    is_preferred(vb)
        .cmp(&is_preferred(va))
        .then_with(|| b.listed.cmp(&a.listed))
        .then_with(|| {
            if highest_first {
                return vb.cmp(va);
            }
            match behavior {
                DependencyBehavior::Ignore | DependencyBehavior::Lowest => va.cmp(vb),
                DependencyBehavior::Highest => vb.cmp(va),
                DependencyBehavior::HighestPatch => (va.major, va.minor)
                    .cmp(&(vb.major, vb.minor))
                    .then_with(|| vb.cmp(va)),
                DependencyBehavior::HighestMinor => {
                    va.major.cmp(&vb.major).then_with(|| vb.cmp(va))
                }
            }
        })
}

/// Drop candidates with a dependency no candidate can satisfy, until stable
fn remove_unsatisfiable(domains: &mut Domains) {
    loop {
        let versions: HashMap<String, Vec<NuGetVersion>> = domains
            .iter()
            .map(|(id, c)| (id.clone(), c.iter().map(|p| p.identity.version.clone()).collect()))
            .collect();

        let mut removed = false;
        for candidates in domains.values_mut() {
            let before = candidates.len();
            candidates.retain(|c| {
                c.dependencies.iter().all(|d| {
                    versions
                        .get(&id_key(&d.id))
                        .is_some_and(|vs| vs.iter().any(|v| d.range.satisfies(v)))
                })
            });
            removed |= candidates.len() != before;
        }

        if !removed {
            break;
        }
    }
}

fn dependency_on<'a>(package: &'a SourcePackageDependencyInfo, key: &str) -> Option<&'a PackageDependency> {
    package.dependencies.iter().find(|d| d.has_id(key))
}

struct Search<'a> {
    domains: &'a Domains,
    token: &'a CancellationToken,
    chosen: HashMap<String, SourcePackageDependencyInfo>,
}

impl Search<'_> {
    fn solve(&mut self, pending: &BTreeSet<String>) -> Result<bool> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(id) = pending.first().cloned() else {
            return Ok(true);
        };
        let Some(candidates) = self.domains.get(&id) else {
            return Ok(false);
        };

        for candidate in candidates {
            if !self.is_consistent(&id, candidate) {
                continue;
            }

            let mut next = pending.clone();
            next.remove(&id);
            for dependency in &candidate.dependencies {
                let key = id_key(&dependency.id);
                if key != id && !self.chosen.contains_key(&key) {
                    next.insert(key);
                }
            }

            self.chosen.insert(id.clone(), candidate.clone());
            if self.solve(&next)? {
                return Ok(true);
            }
            self.chosen.remove(&id);
        }

        Ok(false)
    }

    /// Check `candidate` against the chosen packages, and make sure each of
    /// its unchosen dependencies still has a candidate that fits
    fn is_consistent(&self, id: &str, candidate: &SourcePackageDependencyInfo) -> bool {
        let version = &candidate.identity.version;
        let accepted_by_chosen = self
            .chosen
            .values()
            .all(|c| dependency_on(c, id).is_none_or(|d| d.range.satisfies(version)));
        if !accepted_by_chosen {
            return false;
        }

        candidate.dependencies.iter().all(|dependency| {
            let key = id_key(&dependency.id);
            if key == id {
                return dependency.range.satisfies(version);
            }
            if let Some(chosen) = self.chosen.get(&key) {
                return dependency.range.satisfies(&chosen.identity.version);
            }
            self.domains.get(&key).is_some_and(|options| {
                options.iter().any(|option| {
                    let v = &option.identity.version;
                    dependency.range.satisfies(v)
                        && self
                            .chosen
                            .values()
                            .all(|c| dependency_on(c, &key).is_none_or(|d| d.range.satisfies(v)))
                })
            })
        })
    }
}

/// Greedy walk used only to explain a failure
///
/// Each id gets its first candidate that the packages chosen so far accept,
/// or simply its first candidate when none does.
fn best_effort_solution(domains: &Domains, required: &BTreeSet<String>) -> Vec<SourcePackageDependencyInfo> {
    let mut chosen: HashMap<String, SourcePackageDependencyInfo> = HashMap::new();
    let mut queue: VecDeque<String> = required.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if chosen.contains_key(&id) {
            continue;
        }
        let Some(candidates) = domains.get(&id) else {
            continue;
        };
        let accepted = candidates.iter().find(|c| {
            chosen
                .values()
                .all(|p| dependency_on(p, &id).is_none_or(|d| d.range.satisfies(&c.identity.version)))
        });
        let Some(pick) = accepted.or_else(|| candidates.first()) else {
            continue;
        };

        let mut deps: Vec<String> = pick.dependencies.iter().map(|d| id_key(&d.id)).collect();
        deps.sort();
        queue.extend(deps);
        chosen.insert(id, pick.clone());
    }

    let mut solution: Vec<SourcePackageDependencyInfo> = chosen.into_values().collect();
    solution.sort_by_key(|p| p.identity.key());
    solution
}
