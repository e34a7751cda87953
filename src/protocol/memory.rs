// src/protocol/memory.rs

//! In-memory package feed
//!
//! Holds manifests and content in process. Faults can be injected per
//! identity (failed downloads) or for the whole feed (metadata errors), and
//! every served download is counted.

use super::{DownloadedPackage, SourceRepository};
use crate::error::{Error, Result};
use crate::framework::{ANY_FRAMEWORK, TargetFramework};
use crate::packaging::{
    PackageDependency, PackageIdentity, PackageManifest, SourcePackageDependencyInfo,
};
use crate::version::VersionRange;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct MemoryPackage {
    manifest: PackageManifest,
    content: Vec<u8>,
}

pub struct MemorySourceRepository {
    name: String,
    local: bool,
    packages: RwLock<HashMap<PackageIdentity, MemoryPackage>>,
    failing_downloads: RwLock<HashSet<PackageIdentity>>,
    metadata_error: RwLock<Option<String>>,
    download_delay: RwLock<Option<Duration>>,
    downloads: AtomicUsize,
}

impl MemorySourceRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: false,
            packages: RwLock::new(HashMap::new()),
            failing_downloads: RwLock::new(HashSet::new()),
            metadata_error: RwLock::new(None),
            download_delay: RwLock::new(None),
            downloads: AtomicUsize::new(0),
        }
    }

    /// A feed that reports itself as local
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            local: true,
            ..Self::new(name)
        }
    }

    pub fn add_package(&self, manifest: PackageManifest) {
        let content = format!("{}", manifest.identity).into_bytes();
        self.add_package_with_content(manifest, content);
    }

    pub fn add_package_with_content(&self, manifest: PackageManifest, content: Vec<u8>) {
        self.packages
            .write()
            .insert(manifest.identity.clone(), MemoryPackage { manifest, content });
    }

    /// Add `id` at `version` with framework-agnostic dependencies given as
    /// `(id, range)` pairs
    pub fn add(&self, id: &str, version: &str, dependencies: &[(&str, &str)]) -> Result<()> {
        let mut manifest = PackageManifest::new(PackageIdentity::parse(id, version)?);
        for (dep_id, range) in dependencies {
            manifest = manifest.with_dependency(
                TargetFramework::parse(ANY_FRAMEWORK)?,
                PackageDependency::new(*dep_id, VersionRange::parse(range)?),
            );
        }
        self.add_package(manifest);
        Ok(())
    }

    /// Mark a version as unlisted
    pub fn unlist(&self, identity: &PackageIdentity) {
        if let Some(pkg) = self.packages.write().get_mut(identity) {
            pkg.manifest.listed = false;
        }
    }

    pub fn fail_download(&self, identity: PackageIdentity) {
        self.failing_downloads.write().insert(identity);
    }

    /// Make every metadata query fail with `message`
    pub fn set_unavailable(&self, message: impl Into<String>) {
        *self.metadata_error.write() = Some(message.into());
    }

    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.write() = Some(delay);
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        match self.metadata_error.read().as_ref() {
            Some(message) => Err(Error::SourceError {
                source_name: self.name.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceRepository for MemorySourceRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        self.local
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &TargetFramework,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        self.check_available()?;

        let packages = self.packages.read();
        let mut infos: Vec<SourcePackageDependencyInfo> = packages
            .values()
            .filter(|p| p.manifest.identity.has_id(id))
            .map(|p| {
                SourcePackageDependencyInfo::new(
                    p.manifest.identity.clone(),
                    p.manifest.dependencies_for(framework),
                    p.manifest.listed,
                    self.name.clone(),
                )
            })
            .collect();
        infos.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));

        debug!("{}: {} version(s) of {}", self.name, infos.len(), id);
        Ok(infos)
    }

    async fn exists(&self, identity: &PackageIdentity) -> Result<bool> {
        self.check_available()?;
        Ok(self.packages.read().contains_key(identity))
    }

    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<DownloadedPackage> {
        let delay = *self.download_delay.read();
        if let Some(delay) = delay {
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if self.failing_downloads.read().contains(identity) {
            return Err(Error::DownloadError(format!(
                "{} could not be downloaded from {}",
                identity, self.name
            )));
        }

        let packages = self.packages.read();
        let pkg = packages.get(identity).ok_or_else(|| {
            Error::PackageNotFound(format!("{} not found in {}", identity, self.name))
        })?;

        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadedPackage {
            manifest: pkg.manifest.clone(),
            content: pkg.content.clone(),
            source: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> TargetFramework {
        TargetFramework::parse("net8.0").unwrap()
    }

    #[tokio::test]
    async fn test_resolve_packages_sorted() {
        let feed = MemorySourceRepository::new("feed");
        feed.add("A", "2.0", &[]).unwrap();
        feed.add("A", "1.0", &[("B", "1.0")]).unwrap();
        feed.add("B", "1.0", &[]).unwrap();

        let infos = feed.resolve_packages("a", &net()).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].identity.version.to_string(), "1.0.0");
        assert_eq!(infos[0].dependencies[0].id, "B");
        assert_eq!(infos[0].source, "feed");
    }

    #[tokio::test]
    async fn test_unknown_id_is_empty() {
        let feed = MemorySourceRepository::new("feed");
        assert!(feed.resolve_packages("nope", &net()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let feed = MemorySourceRepository::new("feed");
        feed.add("A", "1.0", &[]).unwrap();
        let id = PackageIdentity::parse("A", "1.0").unwrap();

        feed.fail_download(id.clone());
        let token = CancellationToken::new();
        assert!(matches!(
            feed.download(&id, &token).await,
            Err(Error::DownloadError(_))
        ));

        feed.set_unavailable("offline");
        assert!(feed.resolve_packages("A", &net()).await.is_err());
    }

    #[tokio::test]
    async fn test_download_counts() {
        let feed = MemorySourceRepository::new("feed");
        feed.add("A", "1.0", &[]).unwrap();
        let id = PackageIdentity::parse("A", "1.0").unwrap();
        let pkg = feed.download(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(pkg.identity(), &id);
        assert_eq!(feed.download_count(), 1);
    }
}
