// src/folder/path.rs

use crate::packaging::PackageIdentity;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const PACKAGE_EXTENSION: &str = "nupkg";
pub const HASH_EXTENSION: &str = "nupkg.sha512";
pub const DELETE_MARKER_EXTENSION: &str = "deleteme";
pub const README_FILE_NAME: &str = "readme.txt";

/// Maps identities to paths in the packages-folder layout
#[derive(Debug, Clone)]
pub struct PackagePathResolver {
    root: PathBuf,
}

impl PackagePathResolver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<Id>.<Version>`
    pub fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(identity.file_stem())
    }

    pub fn package_file_name(&self, identity: &PackageIdentity) -> String {
        format!("{}.{}", identity.file_stem(), PACKAGE_EXTENSION)
    }

    pub fn package_file(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(identity).join(self.package_file_name(identity))
    }

    pub fn manifest_file(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(identity).join(MANIFEST_FILE_NAME)
    }

    pub fn hash_file(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(identity)
            .join(format!("{}.{}", identity.file_stem(), HASH_EXTENSION))
    }

    pub fn readme_file(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(identity).join(README_FILE_NAME)
    }

    /// `<root>/<Id>.<Version>.deleteme`, left when a directory could not be removed
    pub fn delete_marker(&self, identity: &PackageIdentity) -> PathBuf {
        self.root
            .join(format!("{}.{}", identity.file_stem(), DELETE_MARKER_EXTENSION))
    }

    pub fn lock_file(&self, identity: &PackageIdentity) -> PathBuf {
        self.root
            .join(".locks")
            .join(format!("{}.lock", identity.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let resolver = PackagePathResolver::new("/pkgs");
        let id = PackageIdentity::parse("A.B", "1.0").unwrap();
        assert_eq!(resolver.package_dir(&id), PathBuf::from("/pkgs/A.B.1.0.0"));
        assert_eq!(
            resolver.package_file(&id),
            PathBuf::from("/pkgs/A.B.1.0.0/A.B.1.0.0.nupkg")
        );
        assert_eq!(
            resolver.hash_file(&id),
            PathBuf::from("/pkgs/A.B.1.0.0/A.B.1.0.0.nupkg.sha512")
        );
        assert_eq!(
            resolver.delete_marker(&id),
            PathBuf::from("/pkgs/A.B.1.0.0.deleteme")
        );
    }
}
