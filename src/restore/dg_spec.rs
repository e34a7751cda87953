// src/restore/dg_spec.rs

//! Solution-wide dependency graph spec
//!
//! Holds the package spec of every build-integrated project in the solution
//! so that restores can flow package dependencies through project references
//! and so that parents of a modified project can be found.

use super::spec::PackageSpec;
use crate::framework::TargetFramework;
use crate::packaging::{PackageDependency, id_key};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraphSpec {
    projects: BTreeMap<String, PackageSpec>,
}

impl DependencyGraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a project spec
    pub fn add_project(&mut self, spec: PackageSpec) {
        self.projects.insert(id_key(&spec.name), spec);
    }

    pub fn get_project(&self, name: &str) -> Option<&PackageSpec> {
        self.projects.get(&id_key(name))
    }

    pub fn projects(&self) -> impl Iterator<Item = &PackageSpec> {
        self.projects.values()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    fn references(&self, spec: &PackageSpec) -> Vec<String> {
        spec.project_references
            .iter()
            .map(|r| id_key(r))
            .filter(|r| self.projects.contains_key(r))
            .collect()
    }

    /// Projects ordered so that referenced projects come first
    ///
    /// Projects without references lead; ties are broken by name. Projects
    /// caught in a reference cycle are appended at the end.
    pub fn sorted_projects(&self) -> Vec<&PackageSpec> {
        let mut pending: BTreeMap<&String, BTreeSet<String>> = self
            .projects
            .iter()
            .map(|(key, spec)| (key, self.references(spec).into_iter().collect()))
            .collect();

        let mut sorted = Vec::with_capacity(self.projects.len());
        let mut placed: HashSet<String> = HashSet::new();

        loop {
            let ready: Vec<String> = pending
                .iter()
                .filter(|(_, refs)| refs.iter().all(|r| placed.contains(r)))
                .map(|(key, _)| (*key).clone())
                .collect();
            let Some(next) = ready.into_iter().next() else {
                break;
            };
            pending.remove(&next);
            if let Some(spec) = self.projects.get(&next) {
                sorted.push(spec);
            }
            placed.insert(next);
        }

        sorted.extend(pending.keys().filter_map(|key| self.projects.get(*key)));
        sorted
    }

    /// Projects reachable through references from `name`, nearest first
    pub fn closure(&self, name: &str) -> Vec<&PackageSpec> {
        let root = id_key(name);
        let mut seen: HashSet<String> = HashSet::from([root.clone()]);
        let mut queue: VecDeque<String> = VecDeque::from([root]);
        let mut result = Vec::new();

        while let Some(key) = queue.pop_front() {
            let Some(spec) = self.projects.get(&key) else {
                continue;
            };
            let mut refs = self.references(spec);
            refs.sort();
            for reference in refs {
                if seen.insert(reference.clone()) {
                    if let Some(child) = self.projects.get(&reference) {
                        result.push(child);
                    }
                    queue.push_back(reference);
                }
            }
        }

        result
    }

    /// Every project whose reference closure includes `name`, in restore order
    pub fn parents_of(&self, name: &str) -> Vec<String> {
        let key = id_key(name);
        self.sorted_projects()
            .into_iter()
            .filter(|spec| id_key(&spec.name) != key)
            .filter(|spec| {
                self.closure(&spec.name)
                    .iter()
                    .any(|child| id_key(&child.name) == key)
            })
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Package dependencies of `spec` for `framework`, including those flowing
    /// in from referenced projects
    ///
    /// The project's own entry for an id wins over a referenced project's.
    pub fn effective_dependencies(
        &self,
        spec: &PackageSpec,
        framework: &TargetFramework,
    ) -> Vec<PackageDependency> {
        let mut dependencies = spec.dependencies_for(framework);
        let mut seen: HashSet<String> = dependencies.iter().map(|d| id_key(&d.id)).collect();

        for child in self.closure(&spec.name) {
            for dependency in child.dependencies_for(framework) {
                if seen.insert(id_key(&dependency.id)) {
                    dependencies.push(dependency);
                }
            }
        }

        dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::spec::SpecDependency;
    use crate::version::VersionRange;

    fn project(name: &str, refs: &[&str]) -> PackageSpec {
        let mut spec = PackageSpec::new(name, Vec::new());
        spec.project_references = refs.iter().map(|r| r.to_string()).collect();
        spec
    }

    fn graph() -> DependencyGraphSpec {
        // App -> Web -> Core, Tool -> Core, Lone
        let mut dg = DependencyGraphSpec::new();
        dg.add_project(project("App", &["Web"]));
        dg.add_project(project("Web", &["Core"]));
        dg.add_project(project("Core", &[]));
        dg.add_project(project("Tool", &["core"]));
        dg.add_project(project("Lone", &[]));
        dg
    }

    fn names(specs: Vec<&PackageSpec>) -> Vec<String> {
        specs.into_iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_sorted_projects_dependencies_first() {
        let dg = graph();
        assert_eq!(
            names(dg.sorted_projects()),
            vec!["Core", "Lone", "Tool", "Web", "App"]
        );
    }

    #[test]
    fn test_parents_include_transitive() {
        let dg = graph();
        assert_eq!(dg.parents_of("core"), vec!["Tool", "Web", "App"]);
        assert_eq!(dg.parents_of("Web"), vec!["App"]);
        assert!(dg.parents_of("App").is_empty());
    }

    #[test]
    fn test_cycle_is_appended() {
        let mut dg = DependencyGraphSpec::new();
        dg.add_project(project("A", &["B"]));
        dg.add_project(project("B", &["A"]));
        dg.add_project(project("C", &[]));
        assert_eq!(names(dg.sorted_projects()), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_effective_dependencies_flow_through_references() {
        let mut dg = DependencyGraphSpec::new();
        let core = project("Core", &[])
            .with_dependency(SpecDependency::new("Json", VersionRange::parse("1.0").unwrap()))
            .with_dependency(SpecDependency::new("Log", VersionRange::parse("1.0").unwrap()));
        let app = project("App", &["Core"])
            .with_dependency(SpecDependency::new("json", VersionRange::parse("2.0").unwrap()));
        dg.add_project(core);
        dg.add_project(app.clone());

        let deps = dg.effective_dependencies(&app, &TargetFramework::any());
        assert_eq!(deps.len(), 2);
        let json = deps.iter().find(|d| d.has_id("Json")).unwrap();
        assert_eq!(json.range.to_string(), "2.0.0");
    }
}
