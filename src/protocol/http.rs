// src/protocol/http.rs

//! HTTP package feed
//!
//! Layout, with ids and versions lowercased:
//! - `{base}/{id}/index.json` lists every version as a manifest record
//! - `{base}/{id}/{version}/{id}.{version}.nupkg` is the package content
//!
//! A 404 on the index means the feed does not know the id.

use super::{DownloadedPackage, SourceRepository};
use crate::error::{Error, Result};
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageManifest, SourcePackageDependencyInfo};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Per-id index document
#[derive(Debug, Deserialize)]
struct PackageIndex {
    #[serde(default)]
    items: Vec<PackageManifest>,
}

pub struct HttpSourceRepository {
    name: String,
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSourceRepository {
    pub fn new(name: impl Into<String>, base_url: &str) -> Result<Self> {
        Self::with_timeout(name, base_url, Duration::from_secs(100))
    }

    pub fn with_timeout(name: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::ConfigError(format!("Invalid feed URL '{}': {e}", base_url)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            base_url,
        })
    }

    pub fn index_url(&self, id: &str) -> Result<Url> {
        let id = id.to_ascii_lowercase();
        self.base_url
            .join(&format!("{}/index.json", id))
            .map_err(|e| Error::InvalidArgument(format!("Invalid package id '{}': {e}", id)))
    }

    pub fn package_url(&self, identity: &PackageIdentity) -> Result<Url> {
        let id = identity.id.to_ascii_lowercase();
        let version = identity.version.to_string().to_ascii_lowercase();
        self.base_url
            .join(&format!("{id}/{version}/{id}.{version}.nupkg"))
            .map_err(|e| Error::InvalidArgument(format!("Invalid package identity '{}': {e}", identity)))
    }

    async fn fetch_index(&self, id: &str) -> Result<Vec<PackageManifest>> {
        let url = self.index_url(id)?;
        debug!("Fetching index {}", url);

        let response = self.client.get(url.clone()).send().await.map_err(|e| Error::SourceError {
            source_name: self.name.clone(),
            message: format!("Failed to fetch {}: {e}", url),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Error::SourceError {
                source_name: self.name.clone(),
                message: format!("{} returned HTTP {}", url, response.status()),
            });
        }

        let index: PackageIndex = response.json().await.map_err(|e| Error::SourceError {
            source_name: self.name.clone(),
            message: format!("Invalid index at {}: {e}", url),
        })?;
        Ok(index.items)
    }
}

#[async_trait]
impl SourceRepository for HttpSourceRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &TargetFramework,
    ) -> Result<Vec<SourcePackageDependencyInfo>> {
        let mut infos: Vec<SourcePackageDependencyInfo> = self
            .fetch_index(id)
            .await?
            .into_iter()
            .filter(|m| m.identity.has_id(id))
            .map(|m| {
                let deps = m.dependencies_for(framework);
                SourcePackageDependencyInfo::new(m.identity, deps, m.listed, self.name.clone())
            })
            .collect();
        infos.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));
        Ok(infos)
    }

    async fn exists(&self, identity: &PackageIdentity) -> Result<bool> {
        Ok(self
            .fetch_index(&identity.id)
            .await?
            .iter()
            .any(|m| &m.identity == identity))
    }

    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<DownloadedPackage> {
        let manifest = self
            .fetch_index(&identity.id)
            .await?
            .into_iter()
            .find(|m| &m.identity == identity)
            .ok_or_else(|| {
                Error::PackageNotFound(format!("{} not found in {}", identity, self.name))
            })?;

        let url = self.package_url(identity)?;
        info!("Downloading {} from {}", identity, url);

        let request = async {
            let response = self.client.get(url.clone()).send().await.map_err(|e| {
                Error::DownloadError(format!("Failed to fetch {}: {e}", url))
            })?;
            if !response.status().is_success() {
                return Err(Error::DownloadError(format!(
                    "{} returned HTTP {}",
                    url,
                    response.status()
                )));
            }
            response
                .bytes()
                .await
                .map_err(|e| Error::DownloadError(format!("Failed to read {}: {e}", url)))
        };

        let content = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            bytes = request => bytes?,
        };

        Ok(DownloadedPackage {
            manifest,
            content: content.to_vec(),
            source: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_lowercased() {
        let feed = HttpSourceRepository::new("remote", "https://feed.example.com/v3").unwrap();
        assert_eq!(
            feed.index_url("Contoso.Core").unwrap().as_str(),
            "https://feed.example.com/v3/contoso.core/index.json"
        );

        let id = PackageIdentity::parse("Contoso.Core", "1.0.0-Beta").unwrap();
        assert_eq!(
            feed.package_url(&id).unwrap().as_str(),
            "https://feed.example.com/v3/contoso.core/1.0.0-beta/contoso.core.1.0.0-beta.nupkg"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpSourceRepository::new("bad", "not a url").is_err());
    }

    #[test]
    fn test_index_parsing() {
        let json = r#"{"items":[{"identity":{"id":"A","version":"1.0.0"},"listed":false}]}"#;
        let index: PackageIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.items.len(), 1);
        assert!(!index.items[0].listed);
    }
}
