// src/error.rs

//! Error types for the package management engine
//!
//! Every fallible operation in the crate returns [`Result`]. Variants are
//! grouped the way failures surface to users: input errors (nothing was
//! touched), resolution errors (raised before any project mutation), source
//! errors, and execution errors (raised after rollback).

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by gather, resolve, plan and execute operations
#[derive(Error, Debug)]
pub enum Error {
    /// The exact identity is already present in the project
    #[error("Package '{package}' already exists in project '{project}'")]
    AlreadyInstalled { package: String, project: String },

    /// Installing would silently downgrade an installed package
    #[error(
        "A newer version of '{package}' ({installed}) is already referenced; refusing to install {requested}"
    )]
    NewerVersionAlreadyReferenced {
        package: String,
        installed: String,
        requested: String,
    },

    /// No source hosts the requested package
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// The package to uninstall is not referenced by the project
    #[error("Package '{package}' to be uninstalled could not be found in project '{project}'")]
    PackageNotInstalled { package: String, project: String },

    /// Other installed packages still depend on the package being removed
    #[error("Unable to uninstall '{package}' because {dependants} depend(s) on it")]
    PackageHasDependants { package: String, dependants: String },

    /// The requested version is excluded by an allowed-versions constraint
    #[error("Version {version} of '{package}' is not allowed by the constraint {allowed}")]
    VersionDisallowed {
        package: String,
        version: String,
        allowed: String,
    },

    /// No source returned any dependency information
    #[error("Unable to gather dependency information: {0}")]
    UnableToGather(String),

    /// The dependency graph could not be satisfied
    #[error("Unable to resolve dependencies: {0}")]
    ResolutionError(String),

    /// Commit-time restore of a build-integrated project failed
    #[error("Package restore failed for project '{0}'. Rolling back package changes")]
    RestoreFailed(String),

    /// A single source failed to deliver a package
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Every candidate source failed to deliver a package
    #[error("Failed to download '{package}' from all sources:\n{}", failures.join("\n"))]
    AggregateDownload {
        package: String,
        failures: Vec<String>,
    },

    /// A source could not be queried
    #[error("Source '{source_name}' failed: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    /// Manifest metadata rules the package out for this client
    #[error("Package '{package}' is not compatible: {reason}")]
    IncompatiblePackage { package: String, reason: String },

    /// The package content hash did not match
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The operation was cancelled through its token
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid argument to a public operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A version, range, framework or file could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Filesystem failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for errors caused by user input, raised before any mutation
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyInstalled { .. }
                | Error::NewerVersionAlreadyReferenced { .. }
                | Error::PackageNotFound(_)
                | Error::PackageNotInstalled { .. }
                | Error::PackageHasDependants { .. }
                | Error::VersionDisallowed { .. }
                | Error::InvalidArgument(_)
        )
    }
}
