// src/resolver/context.rs

use crate::packaging::{PackageIdentity, PackageReference, SourcePackageDependencyInfo};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How versions are picked for packages that have no preference
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum DependencyBehavior {
    /// Dependencies are not considered at all
    Ignore,
    /// Lowest version that satisfies every constraint
    #[default]
    Lowest,
    /// Lowest major.minor, highest patch
    HighestPatch,
    /// Lowest major, highest minor
    HighestMinor,
    /// Highest version available
    Highest,
}

/// Inputs for one resolution
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    pub dependency_behavior: DependencyBehavior,
    /// Ids being installed or updated
    pub target_ids: Vec<String>,
    /// Ids that must be in the solution: targets plus installed packages
    pub required_package_ids: Vec<String>,
    /// References already in the project, for diagnostics
    pub packages_config: Vec<PackageReference>,
    /// Versions to try first, normally the installed ones
    pub preferred_versions: Vec<PackageIdentity>,
    /// Candidates after pruning
    pub available_packages: Vec<SourcePackageDependencyInfo>,
    /// Source names, for diagnostics
    pub package_sources: Vec<String>,
}

impl ResolverContext {
    pub fn new(dependency_behavior: DependencyBehavior) -> Self {
        Self {
            dependency_behavior,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_behavior_parse() {
        assert_eq!(
            "highestminor".parse::<DependencyBehavior>().unwrap(),
            DependencyBehavior::HighestMinor
        );
        assert_eq!(DependencyBehavior::default(), DependencyBehavior::Lowest);
        assert_eq!(DependencyBehavior::HighestPatch.to_string(), "HighestPatch");
        assert!("sideways".parse::<DependencyBehavior>().is_err());
    }
}
