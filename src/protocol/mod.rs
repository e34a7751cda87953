// src/protocol/mod.rs

//! Package source abstraction
//!
//! A source answers metadata queries (all versions of an id, one exact
//! identity, existence) and serves package content. Three backends exist:
//! - In-memory feeds, used by tests and embedders
//! - Local folder feeds laid out like the packages folder
//! - HTTP feeds with a JSON index per id and flat package URLs
//!
//! The gatherer, downloader and planner only ever see `Arc<dyn SourceRepository>`.

mod http;
mod local;
mod memory;

pub use http::HttpSourceRepository;
pub use local::LocalFolderRepository;
pub use memory::MemorySourceRepository;

use crate::error::Result;
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageManifest, SourcePackageDependencyInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Package content delivered by a source
#[derive(Debug, Clone)]
pub struct DownloadedPackage {
    pub manifest: PackageManifest,
    /// Opaque archive bytes
    pub content: Vec<u8>,
    /// Name of the source that served the package
    pub source: String,
}

impl DownloadedPackage {
    pub fn identity(&self) -> &PackageIdentity {
        &self.manifest.identity
    }
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Unique source name, used for deduplication and diagnostics
    fn name(&self) -> &str;

    /// Local sources are raced before any network source
    fn is_local(&self) -> bool {
        false
    }

    /// Dependency info for every version of `id`, for one framework
    ///
    /// An unknown id yields an empty list, not an error.
    async fn resolve_packages(
        &self,
        id: &str,
        framework: &TargetFramework,
    ) -> Result<Vec<SourcePackageDependencyInfo>>;

    /// Dependency info for one exact identity
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Result<Option<SourcePackageDependencyInfo>> {
        let all = self.resolve_packages(&identity.id, framework).await?;
        Ok(all.into_iter().find(|info| &info.identity == identity))
    }

    /// Whether the source hosts the exact identity
    async fn exists(&self, identity: &PackageIdentity) -> Result<bool>;

    /// Fetch package content
    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<DownloadedPackage>;
}

/// Shared handle to a source
pub type SharedSource = Arc<dyn SourceRepository>;

/// Deduplicate sources by name, keeping the first occurrence
pub fn dedup_sources<I>(sources: I) -> Vec<SharedSource>
where
    I: IntoIterator<Item = SharedSource>,
{
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.name().to_ascii_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_sources_keeps_first() {
        let a: SharedSource = Arc::new(MemorySourceRepository::new("feed"));
        let b: SharedSource = Arc::new(MemorySourceRepository::new("FEED"));
        let c: SharedSource = Arc::new(MemorySourceRepository::new("other"));
        let deduped = dedup_sources(vec![a.clone(), b, c]);
        assert_eq!(deduped.len(), 2);
        assert!(Arc::ptr_eq(&deduped[0], &a));
    }
}
