//! Upstream snapshot sources.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// Where fresh snapshots are fetched from.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch the complete raw snapshot.
    async fn fetch(&self) -> RepoResult<Bytes>;

    /// Human-readable locator for logs.
    fn locator(&self) -> &str;
}

/// Fetches snapshots with an HTTP GET.
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> RepoResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn fetch(&self) -> RepoResult<Bytes> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        debug!(url = %self.url, bytes = body.len(), "fetched snapshot");
        Ok(body)
    }

    fn locator(&self) -> &str {
        &self.url
    }
}

/// Reads snapshots from a local file.
pub struct FileSource {
    path: PathBuf,
    locator: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let locator = path.display().to_string();
        Self { path, locator }
    }
}

#[async_trait]
impl Source for FileSource {
    async fn fetch(&self) -> RepoResult<Bytes> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| RepoError::Transport(format!("{}: {e}", self.locator)))?;
        Ok(Bytes::from(data))
    }

    fn locator(&self) -> &str {
        &self.locator
    }
}

/// Pick a source implementation for a locator string.
pub fn source_for(locator: &str, timeout: Duration) -> RepoResult<Arc<dyn Source>> {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return Ok(Arc::new(HttpSource::new(locator, timeout)?));
    }
    if let Some(path) = locator.strip_prefix("file://") {
        return Ok(Arc::new(FileSource::new(path)));
    }
    if locator.is_empty() || locator.contains("://") {
        return Err(RepoError::Validation(format!(
            "unsupported snapshot source {locator:?}"
        )));
    }
    Ok(Arc::new(FileSource::new(locator)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_source_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.json");
        std::fs::write(&path, b"{}").unwrap();

        let source = source_for(&format!("file://{}", path.display()), Duration::from_secs(1)).unwrap();
        assert_eq!(&source.fetch().await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn missing_file_is_transport_error() {
        let source = FileSource::new("/definitely/not/here.json");
        assert!(matches!(source.fetch().await, Err(RepoError::Transport(_))));
    }

    #[test]
    fn locator_dispatch() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            source_for("http://cms/export", timeout).unwrap().locator(),
            "http://cms/export"
        );
        assert_eq!(source_for("/tmp/repo.json", timeout).unwrap().locator(), "/tmp/repo.json");
        assert!(matches!(
            source_for("ftp://cms/export", timeout),
            Err(RepoError::Validation(_))
        ));
        assert!(source_for("", timeout).is_err());
    }
}
