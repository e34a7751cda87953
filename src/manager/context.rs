// src/manager/context.rs

//! Inputs that shape one package operation

use crate::gather::GatherCache;
use crate::packaging::PackageIdentity;
use crate::protocol::{SharedSource, dedup_sources};
use crate::resolver::DependencyBehavior;
use crate::version::VersionConstraints;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// How versions are picked during an install or update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionContext {
    pub dependency_behavior: DependencyBehavior,
    pub include_prerelease: bool,
    pub include_unlisted: bool,
    pub version_constraints: VersionConstraints,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self {
            dependency_behavior: DependencyBehavior::Lowest,
            include_prerelease: false,
            include_unlisted: true,
            version_constraints: VersionConstraints::none(),
        }
    }
}

impl ResolutionContext {
    pub fn new(dependency_behavior: DependencyBehavior) -> Self {
        Self {
            dependency_behavior,
            ..Self::default()
        }
    }

    pub fn with_prerelease(mut self, include_prerelease: bool) -> Self {
        self.include_prerelease = include_prerelease;
        self
    }

    pub fn with_constraints(mut self, constraints: VersionConstraints) -> Self {
        self.version_constraints = constraints;
        self
    }

    pub fn with_unlisted(mut self, include_unlisted: bool) -> Self {
        self.include_unlisted = include_unlisted;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallationContext {
    /// Also remove dependencies nothing else needs
    pub remove_dependencies: bool,
    /// Remove even when other installed packages depend on the target
    pub force_remove: bool,
}

impl UninstallationContext {
    pub fn new(remove_dependencies: bool, force_remove: bool) -> Self {
        Self {
            remove_dependencies,
            force_remove,
        }
    }
}

/// State shared by every step of one operation
///
/// Owns the cancellation scope and the gather cache, so answers fetched
/// while looking up the latest version are reused by the gather that
/// follows.
#[derive(Debug, Default)]
pub struct OperationContext {
    token: CancellationToken,
    pub(crate) gather_cache: Mutex<GatherCache>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            gather_cache: Mutex::new(GatherCache::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Sources an operation may use
///
/// Install targets come from the primary sources only; the rest of the
/// closure may come from any of them.
#[derive(Clone, Default)]
pub struct SourceSelection {
    pub primary: Vec<SharedSource>,
    pub secondary: Vec<SharedSource>,
}

impl SourceSelection {
    pub fn new(primary: Vec<SharedSource>, secondary: Vec<SharedSource>) -> Self {
        Self { primary, secondary }
    }

    /// Use the same sources for both roles
    pub fn all(sources: Vec<SharedSource>) -> Self {
        Self {
            primary: sources.clone(),
            secondary: sources,
        }
    }

    /// Primary sources, then `folder`, then secondary sources, each once
    pub fn effective(&self, folder: SharedSource) -> Vec<SharedSource> {
        dedup_sources(
            self.primary
                .iter()
                .cloned()
                .chain(std::iter::once(folder))
                .chain(self.secondary.iter().cloned()),
        )
    }

    pub fn primary_names(&self) -> Vec<String> {
        self.primary.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Which packages an update touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRequest {
    /// Move to exactly these versions
    Identities(Vec<PackageIdentity>),
    /// Move one id to its best version
    Id(String),
    /// Every installed package
    All,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::PACKAGES_FOLDER_SOURCE;
    use crate::protocol::MemorySourceRepository;
    use std::sync::Arc;

    #[test]
    fn test_effective_sources_order() {
        let a: SharedSource = Arc::new(MemorySourceRepository::new("a"));
        let b: SharedSource = Arc::new(MemorySourceRepository::new("b"));
        let folder: SharedSource = Arc::new(MemorySourceRepository::local(PACKAGES_FOLDER_SOURCE));
        let selection = SourceSelection::new(vec![a.clone()], vec![b, a]);

        let names: Vec<String> = selection
            .effective(folder)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", PACKAGES_FOLDER_SOURCE, "b"]);
    }

    #[test]
    fn test_cancel() {
        let ctx = OperationContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.token().is_cancelled());
    }

    #[test]
    fn test_default_resolution() {
        let ctx = ResolutionContext::default();
        assert_eq!(ctx.dependency_behavior, DependencyBehavior::Lowest);
        assert!(ctx.include_unlisted);
        assert!(!ctx.version_constraints.is_exact());
    }
}
