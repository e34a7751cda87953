// src/project/build_integrated.rs

//! Projects restored from a package spec and a lock file

use super::context::{MessageLevel, ProjectContext};
use super::Project;
use crate::error::Result;
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageReference};
use crate::protocol::DownloadedPackage;
use crate::restore::{LOCK_FILE_NAME, LockFile, PackageSpec, SPEC_FILE_NAME, SpecDependency};
use crate::version::VersionRange;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct BuildIntegratedProject {
    name: String,
    spec_path: PathBuf,
    lock_path: PathBuf,
    spec: RwLock<PackageSpec>,
}

impl BuildIntegratedProject {
    /// Project for `spec` whose files live in `dir`; nothing is written yet
    pub fn new(spec: PackageSpec, dir: &Path) -> Self {
        Self {
            name: spec.name.clone(),
            spec_path: dir.join(SPEC_FILE_NAME),
            lock_path: dir.join(LOCK_FILE_NAME),
            spec: RwLock::new(spec),
        }
    }

    /// Load the package spec stored in `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let spec = PackageSpec::read(&dir.join(SPEC_FILE_NAME))?;
        debug!("Loaded package spec for {} from {}", spec.name, dir.display());
        Ok(Self::new(spec, dir))
    }

    pub fn spec(&self) -> PackageSpec {
        self.spec.read().clone()
    }

    pub fn spec_path(&self) -> &Path {
        &self.spec_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn read_lock_file(&self) -> Result<Option<LockFile>> {
        LockFile::read(&self.lock_path)
    }

    /// Persist a restored spec and its lock file
    ///
    /// Files whose content would not change are left alone. Returns whether
    /// anything was written.
    pub fn save(&self, spec: &PackageSpec, lock_file: &LockFile) -> Result<bool> {
        let spec_written = spec.write(&self.spec_path)?;
        let lock_written = lock_file.write(&self.lock_path)?;
        *self.spec.write() = spec.clone();
        Ok(spec_written || lock_written)
    }

    fn update_spec(&self, change: impl FnOnce(&mut PackageSpec) -> bool) -> Result<bool> {
        let mut spec = self.spec.write();
        if !change(&mut spec) {
            return Ok(false);
        }
        spec.write(&self.spec_path)?;
        Ok(true)
    }
}

#[async_trait]
impl Project for BuildIntegratedProject {
    fn name(&self) -> &str {
        &self.name
    }

    fn target_frameworks(&self) -> Vec<TargetFramework> {
        self.spec.read().restore_frameworks()
    }

    /// Direct dependencies, at their locked version when a lock file exists
    async fn installed_packages(&self) -> Result<Vec<PackageReference>> {
        let lock_file = self.read_lock_file()?;
        let spec = self.spec();
        let framework = self.target_framework();

        Ok(spec
            .dependencies
            .iter()
            .filter_map(|dependency| {
                let version = lock_file
                    .as_ref()
                    .and_then(|lock| lock.resolved_version(&dependency.id))
                    .or(dependency.range.min.as_ref())?
                    .clone();
                Some(
                    PackageReference::new(
                        PackageIdentity::new(dependency.id.clone(), version),
                        framework.clone(),
                    )
                    .with_user_installed(!dependency.auto_referenced),
                )
            })
            .collect())
    }

    async fn install_package(
        &self,
        package: &DownloadedPackage,
        context: &dyn ProjectContext,
    ) -> Result<bool> {
        let identity = package.identity().clone();
        let range = VersionRange::at_least(identity.version.clone());

        let changed = self.update_spec(|spec| {
            if spec.dependency(&identity.id).is_some_and(|d| d.range == range) {
                return false;
            }
            spec.add_or_update_dependency(SpecDependency::new(identity.id.clone(), range));
            true
        })?;

        if changed {
            context.log(
                MessageLevel::Info,
                &format!("Added package '{}' to project '{}'", identity, self.name),
            );
        }
        Ok(changed)
    }

    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
    ) -> Result<bool> {
        let removed = self.update_spec(|spec| spec.remove_dependency(&identity.id))?;
        if removed {
            context.log(
                MessageLevel::Info,
                &format!("Removed package '{}' from project '{}'", identity, self.name),
            );
        }
        Ok(removed)
    }

    async fn run_init(
        &self,
        identity: &PackageIdentity,
        install_dir: &Path,
        context: &dyn ProjectContext,
    ) -> Result<()> {
        context.log(
            MessageLevel::Debug,
            &format!(
                "Initialized '{}' for project '{}' from {}",
                identity,
                self.name,
                install_dir.display()
            ),
        );
        Ok(())
    }

    fn as_build_integrated(&self) -> Option<&BuildIntegratedProject> {
        Some(self)
    }
}
