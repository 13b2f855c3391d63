//! Release manifest resolution.
//!
//! Fetches `<base>/<channel>.json` from the manifest store and decodes it.

use platconf_core::config::UpdateConfig;
use platconf_core::error::ManifestError;
use platconf_core::manifest::ReleaseManifest;
use reqwest::StatusCode;

const USER_AGENT: &str = concat!("platconf/", env!("CARGO_PKG_VERSION"));

/// Fetches release manifests for channels.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    client: reqwest::Client,
    base_url: String,
}

impl ManifestResolver {
    /// Create a resolver for manifests published under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a resolver from the update configuration.
    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(&config.manifest_base_url)
    }

    /// Manifest URL for a channel.
    pub fn url(&self, channel: &str) -> String {
        format!("{}/{}.json", self.base_url.trim_end_matches('/'), channel)
    }

    /// Fetch the raw manifest body for a channel.
    pub async fn fetch(&self, channel: &str) -> Result<Vec<u8>, ManifestError> {
        let url = self.url(channel);
        tracing::debug!(channel = %channel, url = %url, "Fetching release manifest");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ManifestError::Http(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(ManifestError::NotFound {
                    channel: channel.to_string(),
                })
            }
            status => {
                return Err(ManifestError::Transport {
                    url,
                    status: status.as_u16(),
                })
            }
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ManifestError::Http(e.to_string()))?;
        Ok(data.to_vec())
    }

    /// Fetch and decode the manifest for a channel.
    pub async fn resolve(&self, channel: &str) -> Result<ReleaseManifest, ManifestError> {
        let data = self.fetch(channel).await?;
        let manifest = ReleaseManifest::from_json(&data)?;

        tracing::info!(
            channel = %channel,
            build = manifest.build,
            codename = %manifest.codename,
            images = manifest.images.len(),
            "Resolved release manifest"
        );

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const MANIFEST: &str = r#"{
  "build": 12345,
  "codename": "Kaufman",
  "url": "https://www.example.com/",
  "published_at": "1990-12-31T23:59:60Z",
  "images": [
    {"name": "quay.io/experimentalplatform/geilerserver", "tag": "v1.2.3.4", "pre_download": true},
    {"name": "quay.io/protonet/rickroll", "tag": "latest", "pre_download": false}
  ]
}"#;

    #[test]
    fn test_url() {
        let resolver = ManifestResolver::new("https://example.com/manifest-v2/");
        assert_eq!(
            resolver.url("soul3"),
            "https://example.com/manifest-v2/soul3.json"
        );
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/soul3.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MANIFEST)
            .create_async()
            .await;

        let resolver = ManifestResolver::new(server.url());
        let manifest = resolver.resolve("soul3").await.unwrap();

        assert_eq!(manifest.build, 12345);
        assert_eq!(manifest.codename, "Kaufman");
        assert_eq!(manifest.images.len(), 2);
        assert!(manifest.images[0].pre_download);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/WhateverTheF.json")
            .with_status(200)
            .with_body("foobarteststring")
            .create_async()
            .await;

        let resolver = ManifestResolver::new(server.url());
        let data = resolver.fetch("WhateverTheF").await.unwrap();
        assert_eq!(data, b"foobarteststring");
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/noSuchChannel.json")
            .with_status(404)
            .create_async()
            .await;

        let resolver = ManifestResolver::new(server.url());
        let err = resolver.resolve("noSuchChannel").await.unwrap_err();
        match err {
            ManifestError::NotFound { channel } => assert_eq!(channel, "noSuchChannel"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_other_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/GoAwayChannel.json")
            .with_status(403)
            .with_body("Access denied.")
            .create_async()
            .await;

        let resolver = ManifestResolver::new(server.url());
        let err = resolver.resolve("GoAwayChannel").await.unwrap_err();
        assert!(matches!(err, ManifestError::Transport { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_resolve_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/SomeOtherChan.json")
            .with_status(200)
            .with_body("213ewqsd")
            .create_async()
            .await;

        let resolver = ManifestResolver::new(server.url());
        let err = resolver.resolve("SomeOtherChan").await.unwrap_err();
        assert!(matches!(err, ManifestError::Decode(_)));
    }

    #[tokio::test]
    async fn test_resolve_unreachable() {
        // Nothing listens on port 9 of the loopback interface.
        let resolver = ManifestResolver::new("http://127.0.0.1:9");
        let err = resolver.resolve("soul3").await.unwrap_err();
        assert!(matches!(err, ManifestError::Http(_)));
    }
}
