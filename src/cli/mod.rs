// src/cli/mod.rs
//! CLI definitions for nupm
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Every command works on the solution described by the configuration file:
//! - `install` - Install a package into one or all projects
//! - `uninstall` - Remove a package from a project
//! - `update` - Update one package or everything a project references
//! - `restore` - Bring package folders and lock files back in line
//! - `list` - List installed packages

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nupm")]
#[command(version)]
#[command(about = "Package manager for solutions of packages.config and package-spec projects", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (default: ./nupm.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project to operate on (default: every project of the solution)
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a package
    Install {
        /// Package id
        package: String,

        /// Exact version to install (default: latest)
        #[arg(short, long)]
        version: Option<String>,

        /// Allow prerelease versions
        #[arg(long)]
        prerelease: bool,

        /// Dependency version selection: ignore, lowest, highestpatch, highestminor, highest
        #[arg(long)]
        dependency_behavior: Option<String>,

        /// Only use the named source(s) as primary sources
        #[arg(short, long)]
        source: Vec<String>,

        /// Show the planned actions without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Uninstall a package
    Uninstall {
        /// Package id
        package: String,

        /// Also remove dependencies nothing else needs
        #[arg(long)]
        remove_dependencies: bool,

        /// Remove even when other packages depend on it
        #[arg(short, long)]
        force: bool,

        /// Show the planned actions without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Update packages
    Update {
        /// Package id (default: every user-installed package)
        package: Option<String>,

        /// Exact version to update to
        #[arg(short, long, requires = "package")]
        version: Option<String>,

        /// Allow prerelease versions
        #[arg(long)]
        prerelease: bool,

        /// Stay on the installed major version
        #[arg(long)]
        safe: bool,

        /// Reinstall the installed versions
        #[arg(long, conflicts_with_all = ["version", "safe"])]
        reinstall: bool,

        /// Only use the named source(s) as primary sources
        #[arg(short, long)]
        source: Vec<String>,

        /// Show the planned actions without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore packages and lock files
    Restore {
        /// Only restore projects marked by earlier operations
        #[arg(long)]
        pending: bool,

        /// Remove package directories left behind by failed deletions
        #[arg(long)]
        cleanup: bool,
    },

    /// List installed packages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
