//! Snapshot acquisition. Reads dump1090's JSON documents from a local
//! directory (`/run/dump1090-fa/`) or an HTTP base URL
//! (`http://piaware.local:8080/data/`).
//!
//! A document that does not exist yet is `Ok(None)`, not an error: dump1090
//! only writes `stats.json` after its first stats period.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use dump1090_core::types::{ExporterError, Result, SnapshotKind};

/// Timeout for a single HTTP fetch.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where snapshot documents come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the raw body of one document.
    async fn fetch(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

/// Pick a source for `path`: http(s) URLs go over the network, anything
/// else is a directory.
pub fn open_source(path: &str) -> Result<Box<dyn SnapshotSource>> {
    if path.starts_with("http://") || path.starts_with("https://") {
        Ok(Box::new(HttpSource::new(path)?))
    } else {
        Ok(Box::new(FileSource::new(path)))
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileSource { dir: dir.into() }
    }

    fn path_for(&self, kind: SnapshotKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    async fn fetch(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(kind)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ExporterError::Io(e)),
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpSource {
    base: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ExporterError::Fetch(e.to_string()))?;

        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(HttpSource { base, client })
    }

    pub fn url_for(&self, kind: SnapshotKind) -> String {
        format!("{}{}", self.base, kind.file_name())
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>> {
        let url = self.url_for(kind);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExporterError::Fetch(format!("GET {url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ExporterError::Fetch(format!("GET {url}: {}", resp.status())));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ExporterError::Fetch(format!("GET {url}: {e}")))?;
        Ok(Some(body.to_vec()))
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aircraft.json"), br#"{"aircraft":[]}"#).unwrap();

        let source = FileSource::new(dir.path());
        let body = source.fetch(SnapshotKind::Aircraft).await.unwrap();
        assert_eq!(body.as_deref(), Some(&br#"{"aircraft":[]}"#[..]));
        assert!(source.fetch(SnapshotKind::Stats).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_source_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("stats.json")).unwrap();
        let source = FileSource::new(dir.path());
        assert!(source.fetch(SnapshotKind::Stats).await.is_err());
    }

    #[test]
    fn test_http_url_join() {
        let source = HttpSource::new("http://piaware.local:8080/data").unwrap();
        assert_eq!(
            source.url_for(SnapshotKind::Stats),
            "http://piaware.local:8080/data/stats.json"
        );
        let source = HttpSource::new("http://piaware.local/skyaware/data/").unwrap();
        assert_eq!(
            source.url_for(SnapshotKind::Receiver),
            "http://piaware.local/skyaware/data/receiver.json"
        );
    }

    #[test]
    fn test_open_source_picks_backend() {
        assert!(open_source("https://example.com/data/")
            .unwrap()
            .describe()
            .starts_with("https://"));
        assert_eq!(
            open_source("/run/dump1090-fa/").unwrap().describe(),
            "/run/dump1090-fa/"
        );
    }
}
