// src/protocol/local.rs

//! Local folder feed
//!
//! Serves packages from a directory in the packages-folder layout:
//! `<root>/<Id>.<Version>/{manifest.json, <Id>.<Version>.nupkg}`.
//! The packages folder exposes itself through this type so packages already
//! on disk stay resolvable when a remote feed stops listing them.

use super::{DownloadedPackage, SourceRepository};
use crate::error::{Error, Result};
use crate::folder::{MANIFEST_FILE_NAME, PackagePathResolver};
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageManifest, SourcePackageDependencyInfo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct LocalFolderRepository {
    name: String,
    resolver: PackagePathResolver,
}

impl LocalFolderRepository {
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            resolver: PackagePathResolver::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Every manifest below the root, skipping unreadable ones
    pub fn read_manifests(&self) -> Vec<(PathBuf, PackageManifest)> {
        if !self.root().exists() {
            return Vec::new();
        }

        let mut manifests = Vec::new();
        for entry in WalkDir::new(self.root())
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE_NAME)
        {
            match std::fs::read(entry.path()).map_err(Error::from).and_then(|d| PackageManifest::from_json(&d)) {
                Ok(manifest) => {
                    let dir = entry.path().parent().map(Path::to_path_buf).unwrap_or_default();
                    manifests.push((dir, manifest));
                }
                Err(e) => warn!("Skipping unreadable manifest {}: {}", entry.path().display(), e),
            }
        }
        manifests
    }

    /// Directory and manifest for an exact identity
    pub fn find_package(&self, identity: &PackageIdentity) -> Option<(PathBuf, PackageManifest)> {
        let dir = self.resolver.package_dir(identity);
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if manifest_path.is_file()
            && let Ok(data) = std::fs::read(&manifest_path)
            && let Ok(manifest) = PackageManifest::from_json(&data)
            && &manifest.identity == identity
        {
            return Some((dir, manifest));
        }

        // Folder names may differ in casing or version spelling
        self.read_manifests()
            .into_iter()
            .find(|(_, m)| &m.identity == identity)
    }
}

#[async_trait]
impl SourceRepository for LocalFolderRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &TargetFramework,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let mut infos: Vec<SourcePackageDependencyInfo> = self
            .read_manifests()
            .into_iter()
            .filter(|(_, m)| m.identity.has_id(id))
            .map(|(_, m)| {
                let deps = m.dependencies_for(framework);
                SourcePackageDependencyInfo::new(m.identity, deps, m.listed, self.name.clone())
            })
            .collect();
        infos.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));
        Ok(infos)
    }

    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Result<Option<SourcePackageDependencyInfo>> {
        Ok(self.find_package(identity).map(|(_, m)| {
            let deps = m.dependencies_for(framework);
            SourcePackageDependencyInfo::new(m.identity, deps, m.listed, self.name.clone())
        }))
    }

    async fn exists(&self, identity: &PackageIdentity) -> Result<bool> {
        Ok(self.find_package(identity).is_some())
    }

    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<DownloadedPackage> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (dir, manifest) = self.find_package(identity).ok_or_else(|| {
            Error::PackageNotFound(format!("{} not found in {}", identity, self.name))
        })?;

        let file = dir.join(self.resolver.package_file_name(&manifest.identity));
        let content = tokio::fs::read(&file).await.map_err(|e| {
            Error::IoError(format!("Failed to read {}: {e}", file.display()))
        })?;

        debug!("Local hit for {} in {}", identity, self.name);
        Ok(DownloadedPackage {
            manifest,
            content,
            source: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::PackagesFolder;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_packages_folder_layout() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let id = PackageIdentity::parse("Contoso.Core", "1.2.0").unwrap();
        folder
            .install(&PackageManifest::new(id.clone()), b"payload")
            .await
            .unwrap();

        let feed = LocalFolderRepository::new("local", temp.path());
        let fw = TargetFramework::any();
        let infos = feed.resolve_packages("contoso.core", &fw).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert!(feed.exists(&id).await.unwrap());

        let pkg = feed.download(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(pkg.content, b"payload");
        assert_eq!(pkg.source, "local");
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let feed = LocalFolderRepository::new("local", "/nonexistent/nupm/feed");
        let infos = feed
            .resolve_packages("A", &TargetFramework::any())
            .await
            .unwrap();
        assert!(infos.is_empty());
    }
}
