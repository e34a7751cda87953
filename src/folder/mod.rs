// src/folder/mod.rs

//! Shared on-disk packages folder
//!
//! The packages folder is an append-only cache shared by every project of a
//! solution. Each package lives in `<root>/<Id>.<Version>/` with its content,
//! its manifest and a content hash. Installs are no-ops when the package is
//! already present; new packages are written to temp files and renamed into
//! place under a per-package lock. Deletions are deferred by the executor and
//! leave a `.deleteme` marker when the directory cannot be removed.

mod lock;
mod path;

pub use lock::PackageLock;
pub use path::{
    DELETE_MARKER_EXTENSION, HASH_EXTENSION, MANIFEST_FILE_NAME, PACKAGE_EXTENSION,
    PackagePathResolver, README_FILE_NAME,
};

use crate::error::{Error, Result};
use crate::hash::{content_hash, verify_content_hash};
use crate::packaging::{PackageIdentity, PackageManifest};
use crate::protocol::{DownloadedPackage, LocalFolderRepository, SharedSource};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Source name under which the packages folder takes part in gathers
pub const PACKAGES_FOLDER_SOURCE: &str = "packages-folder";

#[derive(Debug, Clone)]
pub struct PackagesFolder {
    resolver: PackagePathResolver,
}

impl PackagesFolder {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            resolver: PackagePathResolver::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PackagePathResolver {
        &self.resolver
    }

    /// The folder as a local source
    pub fn as_source(&self) -> SharedSource {
        Arc::new(LocalFolderRepository::new(PACKAGES_FOLDER_SOURCE, self.root()))
    }

    fn feed(&self) -> LocalFolderRepository {
        LocalFolderRepository::new(PACKAGES_FOLDER_SOURCE, self.root())
    }

    pub fn package_exists(&self, identity: &PackageIdentity) -> bool {
        self.feed().find_package(identity).is_some()
    }

    pub fn package_dir(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        self.feed().find_package(identity).map(|(dir, _)| dir)
    }

    pub fn read_manifest(&self, identity: &PackageIdentity) -> Option<PackageManifest> {
        self.feed().find_package(identity).map(|(_, m)| m)
    }

    /// All manifests on disk
    pub fn manifests(&self) -> Vec<PackageManifest> {
        self.feed().read_manifests().into_iter().map(|(_, m)| m).collect()
    }

    /// True when the package is present and its content matches the recorded hash
    pub fn has_valid_content(&self, identity: &PackageIdentity) -> bool {
        let Some((dir, manifest)) = self.feed().find_package(identity) else {
            return false;
        };
        let file = dir.join(self.resolver.package_file_name(&manifest.identity));
        let hash_file = dir.join(format!("{}.{}", manifest.identity.file_stem(), HASH_EXTENSION));

        match (fs::read(&file), fs::read_to_string(&hash_file)) {
            (Ok(data), Ok(expected)) => verify_content_hash(&data, &expected).is_ok(),
            _ => false,
        }
    }

    /// Path of the package readme, if the installed package has one
    pub fn readme_path(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        let (dir, _) = self.feed().find_package(identity)?;
        let path = dir.join(README_FILE_NAME);
        path.exists().then_some(path)
    }

    /// Locally cached copy of a package, used to undo uninstalls
    pub fn get_package(&self, identity: &PackageIdentity) -> Option<DownloadedPackage> {
        let (dir, manifest) = self.feed().find_package(identity)?;
        let file = dir.join(self.resolver.package_file_name(&manifest.identity));
        let content = fs::read(file).ok()?;
        Some(DownloadedPackage {
            manifest,
            content,
            source: PACKAGES_FOLDER_SOURCE.to_string(),
        })
    }

    /// Write a package into the folder
    ///
    /// Returns `false` without touching disk if the package is already there.
    pub async fn install(&self, manifest: &PackageManifest, content: &[u8]) -> Result<bool> {
        let folder = self.clone();
        let manifest = manifest.clone();
        let content = content.to_vec();
        tokio::task::spawn_blocking(move || folder.install_blocking(&manifest, &content))
            .await
            .map_err(|e| Error::IoError(format!("Install task failed: {e}")))?
    }

    fn install_blocking(&self, manifest: &PackageManifest, content: &[u8]) -> Result<bool> {
        let identity = &manifest.identity;
        if self.package_exists(identity) {
            debug!("{} already present in {}", identity, self.root().display());
            self.clear_deletion_mark(identity);
            return Ok(false);
        }

        let _lock = PackageLock::acquire(self.resolver.lock_file(identity))?;

        // Another process may have finished while we waited
        if self.package_exists(identity) {
            self.clear_deletion_mark(identity);
            return Ok(false);
        }

        let dir = self.resolver.package_dir(identity);
        fs::create_dir_all(&dir).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", dir.display()))
        })?;

        write_atomic(&dir, &self.resolver.package_file(identity), content)?;
        write_atomic(
            &dir,
            &self.resolver.hash_file(identity),
            content_hash(content).as_bytes(),
        )?;
        if let Some(readme) = &manifest.readme {
            write_atomic(&dir, &self.resolver.readme_file(identity), readme.as_bytes())?;
        }
        // The manifest goes last; its presence marks a complete package
        write_atomic(&dir, &self.resolver.manifest_file(identity), &manifest.to_json()?)?;

        self.clear_deletion_mark(identity);

        info!("Added {} to {}", identity, self.root().display());
        Ok(true)
    }

    /// Remove a package directory
    ///
    /// When removal fails the package is marked for deletion on the next run
    /// and the error is returned.
    pub fn delete_package(&self, identity: &PackageIdentity) -> Result<()> {
        let Some(dir) = self.package_dir(identity) else {
            return Ok(());
        };

        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Removed {} from {}", identity, self.root().display());
                Ok(())
            }
            Err(e) => {
                warn!("Could not remove {}: {}", dir.display(), e);
                self.mark_for_deletion(identity)?;
                Err(Error::IoError(format!(
                    "Failed to delete {}: {e}",
                    dir.display()
                )))
            }
        }
    }

    pub fn mark_for_deletion(&self, identity: &PackageIdentity) -> Result<()> {
        fs::create_dir_all(self.root())?;
        fs::write(
            self.resolver.delete_marker(identity),
            identity.file_stem().as_bytes(),
        )?;
        Ok(())
    }

    pub fn is_marked_for_deletion(&self, identity: &PackageIdentity) -> bool {
        self.resolver.delete_marker(identity).exists()
    }

    /// A package that is (re)installed is no longer pending deletion
    fn clear_deletion_mark(&self, identity: &PackageIdentity) {
        let marker = self.resolver.delete_marker(identity);
        if marker.exists()
            && let Err(e) = fs::remove_file(&marker)
        {
            warn!("Could not remove {}: {}", marker.display(), e);
        }
    }

    /// Remove every directory left behind by an earlier failed delete
    ///
    /// Packages in `in_use` keep their directory; only their stale marker
    /// goes. Returns how many directories were cleaned.
    pub fn cleanup_marked(&self, in_use: &[PackageIdentity]) -> Result<usize> {
        if !self.root().exists() {
            return Ok(0);
        }

        let keep: HashSet<PathBuf> = in_use
            .iter()
            .map(|p| self.resolver.delete_marker(p))
            .collect();

        let mut cleaned = 0;
        for entry in fs::read_dir(self.root())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DELETE_MARKER_EXTENSION) {
                continue;
            }
            if keep.contains(&path) {
                debug!("Keeping {}, still referenced", path.with_extension("").display());
                fs::remove_file(&path)?;
                continue;
            }
            let dir = path.with_extension("");
            if dir.exists() && fs::remove_dir_all(&dir).is_err() {
                continue;
            }
            fs::remove_file(&path)?;
            cleaned += 1;
        }

        if cleaned > 0 {
            info!("Cleaned {} package(s) marked for deletion", cleaned);
        }
        Ok(cleaned)
    }
}

fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.flush()?;
    temp.persist(target).map_err(|e| {
        Error::IoError(format!("Failed to rename into {}: {}", target.display(), e.error))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(id: &str, version: &str) -> PackageManifest {
        PackageManifest::new(PackageIdentity::parse(id, version).unwrap())
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let m = manifest("A", "1.0");

        assert!(folder.install(&m, b"one").await.unwrap());
        assert!(!folder.install(&m, b"two").await.unwrap());

        let pkg = folder.get_package(&m.identity).unwrap();
        assert_eq!(pkg.content, b"one");
        assert!(folder.has_valid_content(&m.identity));
    }

    #[tokio::test]
    async fn test_corrupt_content_detected() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let m = manifest("A", "1.0");
        folder.install(&m, b"one").await.unwrap();

        fs::write(folder.resolver().package_file(&m.identity), b"tampered").unwrap();
        assert!(folder.package_exists(&m.identity));
        assert!(!folder.has_valid_content(&m.identity));
    }

    #[tokio::test]
    async fn test_delete_package() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let m = manifest("A", "1.0");
        folder.install(&m, b"one").await.unwrap();

        folder.delete_package(&m.identity).unwrap();
        assert!(!folder.package_exists(&m.identity));
        // Deleting a missing package is fine
        folder.delete_package(&m.identity).unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_marked() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let m = manifest("A", "1.0");
        folder.install(&m, b"one").await.unwrap();
        folder.mark_for_deletion(&m.identity).unwrap();
        assert!(folder.is_marked_for_deletion(&m.identity));

        assert_eq!(folder.cleanup_marked(&[]).unwrap(), 1);
        assert!(!folder.package_exists(&m.identity));
        assert!(!folder.is_marked_for_deletion(&m.identity));
    }

    #[tokio::test]
    async fn test_reinstall_clears_deletion_mark() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let m = manifest("A", "1.0");
        folder.install(&m, b"one").await.unwrap();
        folder.mark_for_deletion(&m.identity).unwrap();

        assert!(!folder.install(&m, b"one").await.unwrap());
        assert!(!folder.is_marked_for_deletion(&m.identity));
        assert_eq!(folder.cleanup_marked(&[]).unwrap(), 0);
        assert!(folder.package_exists(&m.identity));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_packages_in_use() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolder::new(temp.path());
        let used = manifest("A", "1.0");
        let stale = manifest("B", "1.0");
        folder.install(&used, b"a").await.unwrap();
        folder.install(&stale, b"b").await.unwrap();
        folder.mark_for_deletion(&used.identity).unwrap();
        folder.mark_for_deletion(&stale.identity).unwrap();

        let in_use = [used.identity.clone()];
        assert_eq!(folder.cleanup_marked(&in_use).unwrap(), 1);
        assert!(folder.package_exists(&used.identity));
        assert!(!folder.is_marked_for_deletion(&used.identity));
        assert!(!folder.package_exists(&stale.identity));
    }

    #[test]
    fn test_missing_root() {
        let folder = PackagesFolder::new("/nonexistent/nupm/packages");
        assert!(folder.manifests().is_empty());
        assert_eq!(folder.cleanup_marked(&[]).unwrap(), 0);
    }
}
