// src/manager/latest.rs

//! Latest-version lookups across sources

use super::{OperationContext, PackageManager, ResolutionContext, ResolvedPackage};
use crate::error::{Error, Result};
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, SourcePackageDependencyInfo};
use crate::protocol::SharedSource;
use futures::future::join_all;
use tracing::{debug, warn};

impl PackageManager {
    /// Highest version of `id` any of `sources` offers
    ///
    /// Sources are asked concurrently. Unlisted versions count only when the
    /// resolution context includes them, prereleases only when it allows
    /// prereleases. Every answer is stored in the operation's gather cache,
    /// so the gather that usually follows does not ask again.
    pub async fn get_latest_version(
        &self,
        id: &str,
        framework: &TargetFramework,
        resolution: &ResolutionContext,
        sources: &[SharedSource],
        operation: &OperationContext,
    ) -> Result<ResolvedPackage> {
        let cached: Vec<Option<Vec<SourcePackageDependencyInfo>>> = {
            let cache = operation.gather_cache.lock().await;
            sources
                .iter()
                .map(|s| cache.get_packages(s.name(), id, framework))
                .collect()
        };

        let lookups = sources.iter().zip(cached).map(|(source, cached)| async move {
            match cached {
                Some(packages) => Ok(packages),
                None => source.resolve_packages(id, framework).await,
            }
        });
        let answers = tokio::select! {
            answers = join_all(lookups) => answers,
            _ = operation.token().cancelled() => return Err(Error::Cancelled),
        };

        let mut resolved = ResolvedPackage::default();
        let mut first_error = None;
        let mut answered = 0;
        let mut cache = operation.gather_cache.lock().await;

        for (source, answer) in sources.iter().zip(answers) {
            let packages = match answer {
                Ok(packages) => packages,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Latest version lookup of {} on {} failed: {}", id, source.name(), e);
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            answered += 1;

            resolved.exists |= !packages.is_empty();
            let latest = packages
                .iter()
                .filter(|p| p.listed || resolution.include_unlisted)
                .filter(|p| resolution.include_prerelease || !p.identity.version.is_prerelease())
                .map(|p| &p.identity.version)
                .max();
            if let Some(latest) = latest
                && resolved.latest_version.as_ref().is_none_or(|v| latest > v)
            {
                resolved.latest_version = Some(latest.clone());
            }

            cache.add_all_packages_for_id(source.name(), id, framework, packages);
        }

        if answered == 0
            && let Some(error) = first_error
        {
            return Err(error);
        }

        debug!(
            "Latest version of {}: {}",
            id,
            resolved
                .latest_version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(resolved)
    }

    /// First source, in the given order, that hosts `identity`
    ///
    /// All sources are asked at once; an earlier source wins over a faster
    /// later one.
    pub(crate) async fn find_source_hosting(
        &self,
        identity: &PackageIdentity,
        sources: &[SharedSource],
        operation: &OperationContext,
    ) -> Result<SharedSource> {
        let checks = sources.iter().map(|s| s.exists(identity));
        let answers = tokio::select! {
            answers = join_all(checks) => answers,
            _ = operation.token().cancelled() => return Err(Error::Cancelled),
        };

        for (source, answer) in sources.iter().zip(answers) {
            match answer {
                Ok(true) => return Ok(source.clone()),
                Ok(false) => {}
                Err(e) => warn!("Could not check {} on {}: {}", identity, source.name(), e),
            }
        }

        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        Err(Error::PackageNotFound(format!(
            "Package '{}' is not found on source(s) '{}'",
            identity,
            names.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::PackagesFolder;
    use crate::protocol::MemorySourceRepository;
    use crate::solution::SolutionManager;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manager(temp: &TempDir, sources: Vec<SharedSource>) -> PackageManager {
        PackageManager::new(
            Arc::new(SolutionManager::new()),
            PackagesFolder::new(temp.path().join("packages")),
            PackagesFolder::new(temp.path().join("global")),
            sources,
        )
    }

    #[tokio::test]
    async fn test_latest_across_sources() {
        let temp = TempDir::new().unwrap();
        let one = Arc::new(MemorySourceRepository::new("one"));
        one.add("Json", "1.0.0", &[]).unwrap();
        one.add("Json", "3.0.0-beta", &[]).unwrap();
        let two = Arc::new(MemorySourceRepository::new("two"));
        two.add("Json", "2.0.0", &[]).unwrap();
        two.add("Json", "2.5.0", &[]).unwrap();
        two.unlist(&PackageIdentity::parse("Json", "2.5.0").unwrap());

        let sources: Vec<SharedSource> = vec![one, two];
        let manager = manager(&temp, sources.clone());
        let operation = OperationContext::new();
        let fw = TargetFramework::any();

        let mut resolution = ResolutionContext::default();
        resolution.include_unlisted = false;
        let latest = manager
            .get_latest_version("json", &fw, &resolution, &sources, &operation)
            .await
            .unwrap();
        assert!(latest.exists);
        assert_eq!(latest.latest_version.unwrap().to_string(), "2.0.0");

        let resolution = ResolutionContext::default().with_prerelease(true);
        let latest = manager
            .get_latest_version("json", &fw, &resolution, &sources, &operation)
            .await
            .unwrap();
        assert_eq!(latest.latest_version.unwrap().to_string(), "3.0.0-beta");

        assert_eq!(operation.gather_cache.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_package() {
        let temp = TempDir::new().unwrap();
        let sources: Vec<SharedSource> = vec![Arc::new(MemorySourceRepository::new("one"))];
        let manager = manager(&temp, sources.clone());
        let latest = manager
            .get_latest_version(
                "Nope",
                &TargetFramework::any(),
                &ResolutionContext::default(),
                &sources,
                &OperationContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(latest, ResolvedPackage::default());
    }

    #[tokio::test]
    async fn test_find_source_prefers_order() {
        let temp = TempDir::new().unwrap();
        let slow = Arc::new(MemorySourceRepository::new("slow"));
        slow.add("Log", "1.0.0", &[]).unwrap();
        let fast = Arc::new(MemorySourceRepository::new("fast"));
        fast.add("Log", "1.0.0", &[]).unwrap();
        let empty = Arc::new(MemorySourceRepository::new("empty"));

        let sources: Vec<SharedSource> = vec![empty, slow, fast];
        let manager = manager(&temp, sources.clone());
        let identity = PackageIdentity::parse("Log", "1.0.0").unwrap();
        let found = manager
            .find_source_hosting(&identity, &sources, &OperationContext::new())
            .await
            .unwrap();
        assert_eq!(found.name(), "slow");

        let missing = PackageIdentity::parse("Log", "9.0.0").unwrap();
        let result = manager
            .find_source_hosting(&missing, &sources, &OperationContext::new())
            .await;
        assert!(matches!(result, Err(Error::PackageNotFound(_))));
    }
}
