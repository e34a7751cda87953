// src/compat.rs

//! Install-time compatibility gate

use crate::error::{Error, Result};
use crate::packaging::{CLIENT_VERSION, PackageManifest, PackageType};
use crate::version::NuGetVersion;

/// Decides whether a downloaded package may be installed by this client
pub trait CompatibilityChecker: Send + Sync {
    fn validate(&self, manifest: &PackageManifest) -> Result<()>;
}

/// Checks the minimum client version and the declared package types
#[derive(Debug, Clone)]
pub struct DefaultCompatibilityChecker {
    client_version: NuGetVersion,
}

impl DefaultCompatibilityChecker {
    pub fn new(client_version: NuGetVersion) -> Self {
        Self { client_version }
    }
}

impl Default for DefaultCompatibilityChecker {
    fn default() -> Self {
        let client_version =
            NuGetVersion::parse(CLIENT_VERSION).unwrap_or_else(|_| NuGetVersion::new(0, 0, 0));
        Self::new(client_version)
    }
}

impl CompatibilityChecker for DefaultCompatibilityChecker {
    fn validate(&self, manifest: &PackageManifest) -> Result<()> {
        if let Some(required) = &manifest.min_client_version
            && required > &self.client_version
        {
            return Err(Error::IncompatiblePackage {
                package: manifest.identity.to_string(),
                reason: format!(
                    "requires client version {} or newer, this client is {}",
                    required, self.client_version
                ),
            });
        }

        if let Some(kind) = manifest
            .package_types
            .iter()
            .find(|t| !matches!(t, PackageType::Default | PackageType::Dependency))
        {
            return Err(Error::IncompatiblePackage {
                package: manifest.identity.to_string(),
                reason: format!("package type '{kind}' cannot be installed into a project"),
            });
        }

        Ok(())
    }
}
