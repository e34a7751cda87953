// src/download/prefetch.rs

use super::PackageDownloader;
use crate::error::{Error, Result};
use crate::folder::PackagesFolder;
use crate::packaging::PackageIdentity;
use crate::protocol::{DownloadedPackage, SharedSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum Prefetched {
    /// Already on disk with valid content
    Local(DownloadedPackage),
    Pending(JoinHandle<Result<DownloadedPackage>>),
}

/// Background downloads for the install targets of an action list
///
/// Downloads start immediately, bounded by a semaphore. The executor awaits
/// each package only when it reaches the install that needs it, so a failed
/// download surfaces at that point and the earlier actions can be rolled back.
pub struct PackagePrefetcher {
    entries: HashMap<PackageIdentity, Prefetched>,
}

impl PackagePrefetcher {
    pub fn start(
        downloader: &PackageDownloader,
        folder: &PackagesFolder,
        targets: Vec<(PackageIdentity, Vec<SharedSource>)>,
        max_degree_of_parallelism: usize,
        token: &CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(max_degree_of_parallelism.max(1)));
        let mut entries = HashMap::new();

        for (identity, sources) in targets {
            if entries.contains_key(&identity) {
                continue;
            }

            if folder.has_valid_content(&identity)
                && let Some(package) = folder.get_package(&identity)
            {
                debug!("{} found in packages folder, skipping download", identity);
                entries.insert(identity, Prefetched::Local(package));
                continue;
            }

            let downloader = downloader.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = token.child_token();
            let target = identity.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::DownloadError(format!("Prefetch throttle closed: {e}")))?;
                downloader.download(&target, &sources, &token).await
            });
            entries.insert(identity, Prefetched::Pending(handle));
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for the package; `None` when it was never prefetched
    pub async fn take(&mut self, identity: &PackageIdentity) -> Option<Result<DownloadedPackage>> {
        match self.entries.remove(identity)? {
            Prefetched::Local(package) => Some(Ok(package)),
            Prefetched::Pending(handle) => Some(handle.await.unwrap_or_else(|e| {
                Err(Error::DownloadError(format!(
                    "Download task for {identity} failed: {e}"
                )))
            })),
        }
    }
}

impl Drop for PackagePrefetcher {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            if let Prefetched::Pending(handle) = entry {
                handle.abort();
            }
        }
    }
}
