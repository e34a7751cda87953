// src/project/mod.rs

//! Projects that packages are installed into
//!
//! Two kinds exist:
//! - `PackagesConfigProject` keeps an XML reference list and extracts
//!   packages into a solution packages folder
//! - `BuildIntegratedProject` keeps a JSON package spec and a lock file and
//!   takes its packages from the global folder through restore
//!
//! Callers tell them apart with `as_build_integrated()`.

pub mod build_integrated;
pub mod context;
pub mod packages_config;

pub use build_integrated::BuildIntegratedProject;
pub use context::{
    FileConflictAction, LoggingProjectContext, MessageLevel, ProjectContext,
    RecordingProjectContext,
};
pub use packages_config::{PACKAGES_CONFIG_FILE, PackagesConfigProject};

use crate::error::Result;
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageReference};
use crate::protocol::DownloadedPackage;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

#[async_trait]
pub trait Project: Send + Sync {
    fn name(&self) -> &str;

    fn target_frameworks(&self) -> Vec<TargetFramework>;

    /// Framework used for gathers and resolution
    fn target_framework(&self) -> TargetFramework {
        self.target_frameworks()
            .into_iter()
            .next()
            .unwrap_or_else(TargetFramework::any)
    }

    async fn installed_packages(&self) -> Result<Vec<PackageReference>>;

    /// Add a package; returns `false` when the project already had it
    async fn install_package(
        &self,
        package: &DownloadedPackage,
        context: &dyn ProjectContext,
    ) -> Result<bool>;

    /// Remove a package reference; returns `false` when it was not there
    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
    ) -> Result<bool>;

    /// Runs before the first action of a batch
    async fn pre_process(&self, _context: &dyn ProjectContext) -> Result<()> {
        Ok(())
    }

    /// Runs after the last action of a batch, also after a rollback
    async fn post_process(&self, _context: &dyn ProjectContext) -> Result<()> {
        Ok(())
    }

    /// Runs once per package newly added by a build-integrated commit,
    /// dependencies first
    async fn run_init(
        &self,
        _identity: &PackageIdentity,
        _install_dir: &Path,
        _context: &dyn ProjectContext,
    ) -> Result<()> {
        Ok(())
    }

    fn as_build_integrated(&self) -> Option<&BuildIntegratedProject> {
        None
    }

    fn is_build_integrated(&self) -> bool {
        self.as_build_integrated().is_some()
    }

    async fn installed_identities(&self) -> Result<Vec<PackageIdentity>> {
        Ok(self
            .installed_packages()
            .await?
            .into_iter()
            .map(|r| r.identity)
            .collect())
    }

    async fn is_installed(&self, identity: &PackageIdentity) -> Result<bool> {
        Ok(self
            .installed_packages()
            .await?
            .iter()
            .any(|r| &r.identity == identity))
    }
}

pub type SharedProject = Arc<dyn Project>;
