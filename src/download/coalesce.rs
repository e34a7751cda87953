// src/download/coalesce.rs
//! Download coalescing (singleflight)
//!
//! When several tasks of one operation ask for the same package at the same
//! time, only the first one downloads it. The others subscribe to its result.

use crate::error::{Error, Result};
use crate::packaging::PackageIdentity;
use crate::protocol::DownloadedPackage;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Clone)]
enum CachedResult {
    Success(DownloadedPackage),
    Failure(String),
}

enum Role {
    Leader(broadcast::Sender<CachedResult>),
    Follower(broadcast::Receiver<CachedResult>),
}

/// Removes the in-flight entry even if the leader is dropped mid-download
struct InflightGuard<'a> {
    inflight: &'a DashMap<PackageIdentity, broadcast::Sender<CachedResult>>,
    identity: PackageIdentity,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(&self.identity);
    }
}

pub struct RequestCoalescer {
    inflight: DashMap<PackageIdentity, broadcast::Sender<CachedResult>>,
    coalesced_count: AtomicU64,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
            coalesced_count: AtomicU64::new(0),
        }
    }

    /// Run `fetch` unless a download of `identity` is already in flight, in
    /// which case wait for that one instead
    pub async fn coalesce<F, Fut>(
        &self,
        identity: &PackageIdentity,
        fetch: F,
    ) -> Result<DownloadedPackage>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DownloadedPackage>>,
    {
        let role = match self.inflight.entry(identity.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel::<CachedResult>(1);
                entry.insert(tx.clone());
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                debug!("Coalescing download of {}", identity);
                self.coalesced_count.fetch_add(1, Ordering::Relaxed);

                match rx.recv().await {
                    Ok(CachedResult::Success(package)) => Ok(package),
                    Ok(CachedResult::Failure(message)) => Err(Error::DownloadError(message)),
                    Err(_) => {
                        // Leader went away without an answer
                        debug!("Coalesced download of {} lost its leader, retrying", identity);
                        fetch().await
                    }
                }
            }
            Role::Leader(tx) => {
                let _guard = InflightGuard {
                    inflight: &self.inflight,
                    identity: identity.clone(),
                };

                let result = fetch().await;
                let cached = match &result {
                    Ok(package) => CachedResult::Success(package.clone()),
                    Err(e) => CachedResult::Failure(e.to_string()),
                };
                let _ = tx.send(cached);
                result
            }
        }
    }

    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_count.load(Ordering::Relaxed)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

impl Default for RequestCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::PackageManifest;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    fn package(identity: &PackageIdentity) -> DownloadedPackage {
        DownloadedPackage {
            manifest: PackageManifest::new(identity.clone()),
            content: vec![42],
            source: "feed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_download() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let identity = PackageIdentity::parse("A", "1.0").unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            let identity = identity.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .coalesce(&identity, || {
                        let calls = Arc::clone(&calls);
                        let identity = identity.clone();
                        async move {
                            sleep(Duration::from_millis(100)).await;
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(package(&identity))
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().content, vec![42]);
        }

        assert!(calls.load(Ordering::SeqCst) < 3);
        assert!(coalescer.coalesced_count() > 0);
        assert_eq!(coalescer.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_returned_and_cleared() {
        let coalescer = RequestCoalescer::new();
        let identity = PackageIdentity::parse("A", "1.0").unwrap();

        let result = coalescer
            .coalesce(&identity, || async {
                Err(Error::DownloadError("feed offline".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::DownloadError(_))));
        assert_eq!(coalescer.inflight_count(), 0);

        let retry = coalescer
            .coalesce(&identity, || async { Ok(package(&identity)) })
            .await;
        assert!(retry.is_ok());
    }
}
