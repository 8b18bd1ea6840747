//! Release feed - Lists published game builds for the version picker

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::download::DownloadJob;

/// Asset name of the build for this platform
#[cfg(windows)]
pub const PLATFORM_ASSET: &str = "Skakavi-krompir-Windows.exe";
#[cfg(not(windows))]
pub const PLATFORM_ASSET: &str = "Skakavi-Krompir-Linux";

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to fetch releases: {0}")]
    Http(#[from] reqwest::Error),

    #[error("releases endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no release tagged {0}")]
    UnknownTag(String),

    #[error("release {tag} has no asset named {asset}")]
    UnknownAsset { tag: String, asset: String },

    #[error("release {0} has no assets")]
    NoAssets(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// The asset for this platform, or the first one if none matches
    pub fn preferred_asset(&self) -> Option<&ReleaseAsset> {
        self.asset(PLATFORM_ASSET).or_else(|| self.assets.first())
    }

    /// Build the download job for one of this release's assets
    ///
    /// `asset` picks by name; `None` uses [`Release::preferred_asset`].
    pub fn download_job(&self, asset: Option<&str>) -> Result<DownloadJob, ReleaseError> {
        let chosen = match asset {
            Some(name) => self.asset(name).ok_or_else(|| ReleaseError::UnknownAsset {
                tag: self.tag_name.clone(),
                asset: name.to_string(),
            })?,
            None => self
                .preferred_asset()
                .ok_or_else(|| ReleaseError::NoAssets(self.tag_name.clone()))?,
        };
        Ok(DownloadJob::new(
            chosen.browser_download_url.clone(),
            chosen.name.clone(),
            self.tag_name.clone(),
        ))
    }
}

/// Read-only client for the releases endpoint
#[derive(Clone)]
pub struct ReleaseFeed {
    client: reqwest::Client,
    url: String,
}

impl ReleaseFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch all releases, newest first as the endpoint returns them
    pub async fn fetch(&self) -> Result<Vec<Release>, ReleaseError> {
        debug!("Fetching releases from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::Status(status));
        }

        let releases: Vec<Release> = response.json().await?;
        info!("Fetched {} release(s)", releases.len());
        Ok(releases)
    }

    /// Fetch and pick the release with the given tag
    pub async fn find(&self, tag: &str) -> Result<Release, ReleaseError> {
        self.fetch()
            .await?
            .into_iter()
            .find(|release| release.tag_name == tag)
            .ok_or_else(|| ReleaseError::UnknownTag(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{local_client, serve_once};
    use tokio::io::AsyncWriteExt;

    const FEED: &str = r#"[
        {
            "tag_name": "v1.1",
            "assets": [
                { "name": "Skakavi-krompir-Windows.exe", "browser_download_url": "https://example.invalid/win", "size": 10 },
                { "name": "Skakavi-Krompir-Linux", "browser_download_url": "https://example.invalid/linux", "size": 10 }
            ]
        },
        { "tag_name": "v1.0", "assets": [] }
    ]"#;

    async fn serve_json(status: &'static str, body: &'static str) -> String {
        serve_once(move |mut socket| async move {
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        })
        .await
    }

    #[tokio::test]
    async fn fetches_and_parses_release_list() {
        let url = serve_json("200 OK", FEED).await;
        let feed = ReleaseFeed::new(local_client(), url);

        let releases = feed.fetch().await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].tag_name, "v1.1");
        assert_eq!(releases[0].assets.len(), 2);
        assert!(releases[1].assets.is_empty());
    }

    #[tokio::test]
    async fn find_reports_unknown_tag() {
        let url = serve_json("200 OK", FEED).await;
        let feed = ReleaseFeed::new(local_client(), url);

        let err = feed.find("v9").await.unwrap_err();
        assert!(matches!(err, ReleaseError::UnknownTag(tag) if tag == "v9"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let url = serve_json("403 Forbidden", "{}").await;
        let feed = ReleaseFeed::new(local_client(), url);

        let err = feed.fetch().await.unwrap_err();
        assert!(matches!(err, ReleaseError::Status(s) if s.as_u16() == 403));
    }

    #[test]
    fn preferred_asset_matches_platform() {
        let releases: Vec<Release> = serde_json::from_str(FEED).unwrap();
        let asset = releases[0].preferred_asset().unwrap();
        assert_eq!(asset.name, PLATFORM_ASSET);

        let job = releases[0].download_job(None).unwrap();
        assert_eq!(job.file_name, PLATFORM_ASSET);
        assert_eq!(job.label, "v1.1");
    }

    #[test]
    fn explicit_asset_and_empty_release() {
        let releases: Vec<Release> = serde_json::from_str(FEED).unwrap();

        let job = releases[0]
            .download_job(Some("Skakavi-krompir-Windows.exe"))
            .unwrap();
        assert_eq!(job.url, "https://example.invalid/win");

        assert!(matches!(
            releases[0].download_job(Some("nope")),
            Err(ReleaseError::UnknownAsset { .. })
        ));
        assert!(matches!(
            releases[1].download_job(None),
            Err(ReleaseError::NoAssets(_))
        ));
    }
}
