// src/packaging/mod.rs

//! Package value types
//!
//! Identities, dependencies, per-project references and the manifest record
//! stored beside package content.

mod dependency;
mod identity;
mod manifest;
mod reference;

pub use dependency::{PackageDependency, SourcePackageDependencyInfo};
pub use identity::{PackageIdentity, id_key};
pub use manifest::{CLIENT_VERSION, DependencyGroup, PackageManifest, PackageType};
pub use reference::PackageReference;
