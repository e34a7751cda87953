// src/manager/actions.rs

//! Planned project actions
//!
//! The planner produces these and the executor consumes them in order. They
//! are never mutated after planning.

use crate::framework::TargetFramework;
use crate::packaging::PackageIdentity;
use crate::protocol::SharedSource;
use crate::restore::{LockFile, PackageSpec, RestoreResult};
use crate::version::NuGetVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ActionType {
    Install,
    Uninstall,
    /// Replace whatever version of the id is installed
    Update,
}

/// One step against one project
#[derive(Clone)]
pub struct NuGetProjectAction {
    pub action_type: ActionType,
    pub identity: PackageIdentity,
    /// Source that supplied the package, unset for uninstalls
    pub source: Option<SharedSource>,
    pub project: String,
}

impl NuGetProjectAction {
    pub fn install(
        identity: PackageIdentity,
        source: Option<SharedSource>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            action_type: ActionType::Install,
            identity,
            source,
            project: project.into(),
        }
    }

    pub fn uninstall(identity: PackageIdentity, project: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Uninstall,
            identity,
            source: None,
            project: project.into(),
        }
    }

    pub fn update(
        identity: PackageIdentity,
        source: Option<SharedSource>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            action_type: ActionType::Update,
            identity,
            source,
            project: project.into(),
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name())
    }

    pub fn is_install(&self) -> bool {
        self.action_type == ActionType::Install
    }

    pub fn is_uninstall(&self) -> bool {
        self.action_type == ActionType::Uninstall
    }
}

impl fmt::Debug for NuGetProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NuGetProjectAction")
            .field("action_type", &self.action_type)
            .field("identity", &self.identity)
            .field("source", &self.source_name())
            .field("project", &self.project)
            .finish()
    }
}

impl fmt::Display for NuGetProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action_type, self.identity)?;
        if let Some(source) = self.source_name() {
            write!(f, " from {source}")?;
        }
        Ok(())
    }
}

/// Result of a "latest version across sources" query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub latest_version: Option<NuGetVersion>,
    pub exists: bool,
}

/// Per-framework outcome of a build-integrated install preview
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIntegratedInstallationContext {
    pub successful_frameworks: Vec<TargetFramework>,
    pub unsuccessful_frameworks: Vec<TargetFramework>,
    /// Frameworks the dependency was restricted to after a partial failure
    pub restricted_to: Option<Vec<TargetFramework>>,
}

/// Everything needed to commit a change to a build-integrated project
#[derive(Clone)]
pub struct BuildIntegratedProjectAction {
    /// Identity and type of the first underlying action
    pub identity: PackageIdentity,
    pub action_type: ActionType,
    pub original_lock_file: Option<LockFile>,
    pub updated_spec: PackageSpec,
    pub restore_result: RestoreResult,
    pub sources: Vec<SharedSource>,
    pub actions: Vec<NuGetProjectAction>,
    pub installation_context: BuildIntegratedInstallationContext,
}

impl BuildIntegratedProjectAction {
    /// Whether every underlying action removes a package
    pub fn is_uninstall_only(&self) -> bool {
        self.action_type == ActionType::Uninstall && self.actions.iter().all(|a| a.is_uninstall())
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for BuildIntegratedProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildIntegratedProjectAction")
            .field("identity", &self.identity)
            .field("action_type", &self.action_type)
            .field("project", &self.updated_spec.name)
            .field("success", &self.restore_result.success)
            .field("sources", &self.source_names())
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

/// What the planner hands to the executor for one project
#[derive(Debug, Clone)]
pub enum PlannedActions {
    Project(Vec<NuGetProjectAction>),
    BuildIntegrated(Box<BuildIntegratedProjectAction>),
}

impl PlannedActions {
    pub fn empty() -> Self {
        PlannedActions::Project(Vec::new())
    }

    pub fn actions(&self) -> &[NuGetProjectAction] {
        match self {
            PlannedActions::Project(actions) => actions,
            PlannedActions::BuildIntegrated(action) => &action.actions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions().is_empty()
    }

    pub fn as_build_integrated(&self) -> Option<&BuildIntegratedProjectAction> {
        match self {
            PlannedActions::BuildIntegrated(action) => Some(action),
            PlannedActions::Project(_) => None,
        }
    }
}
