// src/download/mod.rs

//! Package downloads
//!
//! A download asks local sources one after another first. When none of them
//! has the package, every remote source is raced: the first success wins and
//! the others are cancelled. Concurrent downloads of one identity inside an
//! operation are coalesced into a single request.

mod coalesce;
mod prefetch;

pub use coalesce::RequestCoalescer;
pub use prefetch::PackagePrefetcher;

use crate::error::{Error, Result};
use crate::packaging::PackageIdentity;
use crate::protocol::{DownloadedPackage, SharedSource};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct PackageDownloader {
    coalescer: Arc<RequestCoalescer>,
}

impl PackageDownloader {
    pub fn new(coalescer: Arc<RequestCoalescer>) -> Self {
        Self { coalescer }
    }

    pub fn coalescer(&self) -> &Arc<RequestCoalescer> {
        &self.coalescer
    }

    /// Download `identity` from the first source that can deliver it
    pub async fn download(
        &self,
        identity: &PackageIdentity,
        sources: &[SharedSource],
        token: &CancellationToken,
    ) -> Result<DownloadedPackage> {
        let sources = sources.to_vec();
        let token = token.clone();
        let target = identity.clone();

        self.coalescer
            .coalesce(identity, || async move { race(&target, &sources, &token).await })
            .await
    }
}

async fn race(
    identity: &PackageIdentity,
    sources: &[SharedSource],
    token: &CancellationToken,
) -> Result<DownloadedPackage> {
    if sources.is_empty() {
        return Err(Error::PackageNotFound(format!(
            "{identity}: no package sources available"
        )));
    }

    let mut failures = Vec::new();

    for source in sources.iter().filter(|s| s.is_local()) {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match source.download(identity, token).await {
            Ok(package) => {
                debug!("{} served by local source {}", identity, source.name());
                return Ok(package);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => failures.push(format!("{}: {}", source.name(), e)),
        }
    }

    let race_token = token.child_token();
    let mut pending: FuturesUnordered<_> = sources
        .iter()
        .filter(|s| !s.is_local())
        .map(|source| {
            let source = source.clone();
            let token = race_token.clone();
            let identity = identity.clone();
            async move {
                let outcome = source.download(&identity, &token).await;
                (source.name().to_string(), outcome)
            }
        })
        .collect();

    while let Some((name, outcome)) = pending.next().await {
        match outcome {
            Ok(package) => {
                race_token.cancel();
                info!("Downloaded {} from {}", identity, name);
                return Ok(package);
            }
            Err(_) if token.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => {
                debug!("Download of {} from {} failed: {}", identity, name, e);
                failures.push(format!("{name}: {e}"));
            }
        }
    }

    Err(Error::AggregateDownload {
        package: identity.to_string(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MemorySourceRepository;
    use std::time::Duration;

    fn identity() -> PackageIdentity {
        PackageIdentity::parse("A", "1.0").unwrap()
    }

    fn feed(name: &str, local: bool) -> Arc<MemorySourceRepository> {
        let feed = if local {
            MemorySourceRepository::local(name)
        } else {
            MemorySourceRepository::new(name)
        };
        feed.add("A", "1.0", &[]).unwrap();
        Arc::new(feed)
    }

    #[tokio::test]
    async fn test_local_source_short_circuits() {
        let local = feed("local", true);
        let remote = feed("remote", false);
        let sources: Vec<SharedSource> = vec![remote.clone(), local.clone()];

        let package = PackageDownloader::default()
            .download(&identity(), &sources, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(package.source, "local");
        assert_eq!(remote.download_count(), 0);
    }

    #[tokio::test]
    async fn test_fastest_remote_wins() {
        let slow = feed("slow", false);
        slow.set_download_delay(Duration::from_secs(30));
        let fast = feed("fast", false);
        let sources: Vec<SharedSource> = vec![slow.clone(), fast];

        let package = PackageDownloader::default()
            .download(&identity(), &sources, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(package.source, "fast");
        assert_eq!(slow.download_count(), 0);
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated() {
        let one = feed("one", false);
        one.fail_download(identity());
        let two = Arc::new(MemorySourceRepository::new("two"));
        let sources: Vec<SharedSource> = vec![one, two];

        let err = PackageDownloader::default()
            .download(&identity(), &sources, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::AggregateDownload { package, failures } => {
                assert_eq!(package, "A 1.0.0");
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.starts_with("one: ")));
                assert!(failures.iter().any(|f| f.starts_with("two: ")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_sources() {
        let err = PackageDownloader::default()
            .download(&identity(), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }
}
