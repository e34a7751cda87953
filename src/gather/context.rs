// src/gather/context.rs

use crate::framework::TargetFramework;
use crate::packaging::PackageIdentity;
use crate::protocol::SharedSource;
use crate::resolver::DependencyBehavior;
use std::time::Duration;

pub const DEFAULT_MAX_DEGREE_OF_PARALLELISM: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Inputs for one gather
#[derive(Clone)]
pub struct GatherContext {
    pub target_framework: TargetFramework,
    /// Exact identities being installed or updated
    pub primary_targets: Vec<PackageIdentity>,
    /// Ids being updated to an unknown version
    pub primary_target_ids: Vec<String>,
    pub installed_packages: Vec<PackageIdentity>,
    /// Sources allowed to answer for primary targets
    pub primary_sources: Vec<SharedSource>,
    /// Secondary sources consulted for the dependency closure
    pub all_sources: Vec<SharedSource>,
    pub packages_folder_source: SharedSource,
    pub dependency_behavior: DependencyBehavior,
    pub allow_downgrades: bool,
    pub is_update_all: bool,
    pub max_degree_of_parallelism: usize,
    pub request_timeout: Duration,
}

impl GatherContext {
    pub fn new(
        target_framework: TargetFramework,
        primary_sources: Vec<SharedSource>,
        all_sources: Vec<SharedSource>,
        packages_folder_source: SharedSource,
    ) -> Self {
        Self {
            target_framework,
            primary_targets: Vec::new(),
            primary_target_ids: Vec::new(),
            installed_packages: Vec::new(),
            primary_sources,
            all_sources,
            packages_folder_source,
            dependency_behavior: DependencyBehavior::default(),
            allow_downgrades: false,
            is_update_all: false,
            max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
