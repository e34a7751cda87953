// src/lib.rs

//! nupm package management engine
//!
//! Client-side engine that installs, updates, uninstalls and restores
//! packages from one or more sources into the projects of a solution.
//!
//! # Architecture
//!
//! - Gather: collect dependency info for the targets from every source
//! - Resolve: pick one version per id so that every range is satisfied
//! - Plan: diff the resolution against the project into ordered actions
//! - Execute: apply actions in order, rolling everything back on failure
//! - Packages folder: shared on-disk cache, deletion only when unreferenced
//! - Build-integrated projects: package spec edits plus an in-memory restore,
//!   committed as spec and lock file together

pub mod compat;
pub mod config;
pub mod download;
mod error;
pub mod folder;
pub mod framework;
pub mod gather;
pub mod hash;
pub mod manager;
pub mod packaging;
pub mod project;
pub mod protocol;
pub mod resolver;
pub mod restore;
pub mod solution;
pub mod version;

pub use compat::{CompatibilityChecker, DefaultCompatibilityChecker};
pub use config::Config;
pub use error::{Error, Result};
pub use folder::PackagesFolder;
pub use framework::TargetFramework;
pub use manager::{
    ManagerSettings, NuGetProjectAction, OperationContext, PackageManager, PlannedActions,
    ResolutionContext, SourceSelection, UninstallationContext, UpdateRequest,
};
pub use packaging::{PackageIdentity, PackageManifest, PackageReference};
pub use project::{BuildIntegratedProject, PackagesConfigProject, Project, ProjectContext};
pub use protocol::{
    HttpSourceRepository, LocalFolderRepository, MemorySourceRepository, SharedSource,
    SourceRepository,
};
pub use resolver::{DependencyBehavior, PackageResolver};
pub use solution::SolutionManager;
pub use version::{NuGetVersion, VersionConstraints, VersionRange};
