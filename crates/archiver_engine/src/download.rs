use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archiver_core::{AssetCategory, DownloadCounters, ExportLayout};
use archiver_logging::{archiver_debug, archiver_warn};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::types::{DownloadError, DownloadFailure};

pub const UNKNOWN_EXTENSION: &str = ".unknown";
const MAX_EXTENSION_LEN: usize = 5;
const STAGED_FILE: &str = "payload";

#[cfg(unix)]
const CROSS_DEVICE_CODE: Option<i32> = Some(18); // EXDEV
#[cfg(windows)]
const CROSS_DEVICE_CODE: Option<i32> = Some(17); // ERROR_NOT_SAME_DEVICE
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE_CODE: Option<i32> = None;

/// Resolves a remote URL to a local path relative to the export root.
///
/// The rewriter only depends on this seam; [`AssetDownloader`] is the real
/// implementation.
#[async_trait::async_trait]
pub trait AssetResolver: Send {
    async fn resolve(
        &mut self,
        url: &str,
        category: AssetCategory,
        forced_extension: Option<&str>,
    ) -> Result<String, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub request_timeout: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// How a finished download was placed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Stored,
    DuplicateContent,
}

/// Content-addressed downloader owning one job's URL cache.
///
/// Files land in `downloaded_files/<category>/<sha256><ext>` under the export
/// root. A URL is fetched over the network at most once per downloader, and
/// byte-identical content from different URLs shares one file.
pub struct AssetDownloader {
    http: reqwest::Client,
    export_root: PathBuf,
    settings: DownloadSettings,
    cache: HashMap<String, String>,
    failed: HashMap<String, DownloadError>,
    counters: DownloadCounters,
}

impl AssetDownloader {
    pub fn new(http: reqwest::Client, export_root: PathBuf, settings: DownloadSettings) -> Self {
        Self {
            http,
            export_root,
            settings,
            cache: HashMap::new(),
            failed: HashMap::new(),
            counters: DownloadCounters::default(),
        }
    }

    pub fn export_root(&self) -> &Path {
        &self.export_root
    }

    /// URL → relative path entries recorded so far.
    pub fn cache(&self) -> &HashMap<String, String> {
        &self.cache
    }

    pub fn counters(&self) -> DownloadCounters {
        self.counters
    }

    /// Download `url` into `category` unless it is already known.
    ///
    /// Returns the stored file's path relative to the export root, always
    /// with `/` separators.
    pub async fn fetch_and_store(
        &mut self,
        url: &str,
        category: AssetCategory,
        forced_extension: Option<&str>,
    ) -> Result<String, DownloadError> {
        if let Some(path) = self.cache.get(url) {
            self.counters.cache_hits += 1;
            return Ok(path.clone());
        }
        // A URL that already failed in this job is not retried.
        if let Some(err) = self.failed.get(url) {
            return Err(err.clone());
        }

        let extension = resolve_extension(url, forced_extension);
        match self.download(url, category, &extension).await {
            Ok((relative, placement)) => {
                self.counters.downloaded += 1;
                if placement == Placement::DuplicateContent {
                    self.counters.content_duplicates += 1;
                }
                self.cache.insert(url.to_string(), relative.clone());
                Ok(relative)
            }
            Err(err) => {
                self.counters.failures += 1;
                archiver_warn!("Download failed url={} cause={}", url, err.cause);
                self.failed.insert(url.to_string(), err.clone());
                Err(err)
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        category: AssetCategory,
        extension: &str,
    ) -> Result<(String, Placement), DownloadError> {
        let response = self
            .http
            .get(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(|err| DownloadError::new(url, map_failure(err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::new(
                url,
                DownloadFailure::HttpStatus(status.as_u16()),
            ));
        }

        // Removed on drop, whichever way this function returns.
        let staging = tempfile::Builder::new()
            .prefix("archiver-dl-")
            .tempdir()
            .map_err(|err| DownloadError::io(url, err))?;
        let staged_path = staging.path().join(STAGED_FILE);

        let mut file = tokio::fs::File::create(&staged_path)
            .await
            .map_err(|err| DownloadError::io(url, err))?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| DownloadError::new(url, map_failure(err)))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|err| DownloadError::io(url, err))?;
        }
        file.flush().await.map_err(|err| DownloadError::io(url, err))?;
        drop(file);

        let file_name = format!("{}{extension}", to_hex(&hasher.finalize()));
        let target_dir = ExportLayout::new(&self.export_root).category_dir(category);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|err| DownloadError::io(url, err))?;
        let target = target_dir.join(&file_name);

        let placement = if tokio::fs::try_exists(&target)
            .await
            .map_err(|err| DownloadError::io(url, err))?
        {
            archiver_debug!("Duplicate content url={} file={}", url, file_name);
            Placement::DuplicateContent
        } else {
            promote(&staged_path, &target)
                .await
                .map_err(|err| DownloadError::io(url, err))?;
            Placement::Stored
        };

        if let Err(err) = staging.close() {
            archiver_warn!("Could not remove staging dir for {}: {}", url, err);
        }

        Ok((format!("{}/{file_name}", category.relative_dir()), placement))
    }
}

#[async_trait::async_trait]
impl AssetResolver for AssetDownloader {
    async fn resolve(
        &mut self,
        url: &str,
        category: AssetCategory,
        forced_extension: Option<&str>,
    ) -> Result<String, DownloadError> {
        self.fetch_and_store(url, category, forced_extension).await
    }
}

/// Move `from` to `to`, copying when the two live on different filesystems.
async fn promote(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            // Copy next to the target first so the final rename stays atomic.
            let partial = to.with_extension("partial");
            tokio::fs::copy(from, &partial).await?;
            tokio::fs::rename(&partial, to).await?;
            tokio::fs::remove_file(from).await
        }
        Err(err) => Err(err),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    CROSS_DEVICE_CODE.is_some() && err.raw_os_error() == CROSS_DEVICE_CODE
}

fn map_failure(err: reqwest::Error) -> DownloadFailure {
    if err.is_timeout() {
        DownloadFailure::Timeout
    } else {
        DownloadFailure::Network(err.to_string())
    }
}

/// Extension with a leading dot: the forced hint, else the URL path's, else
/// [`UNKNOWN_EXTENSION`]. Only short alphanumeric extensions are accepted.
pub fn resolve_extension(url: &str, forced: Option<&str>) -> String {
    if let Some(ext) = forced.and_then(clean_extension) {
        return ext;
    }
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            let last = parsed.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            clean_extension(ext)
        })
        .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string())
}

fn clean_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.');
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| format!(".{}", ext.to_ascii_lowercase()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_forced_hint() {
        assert_eq!(resolve_extension("https://x/a.png", Some("gif")), ".gif");
        assert_eq!(resolve_extension("https://x/a.png", Some(".WEBP")), ".webp");
    }

    #[test]
    fn extension_comes_from_url_path_not_query() {
        assert_eq!(
            resolve_extension("https://cdn.example/att/1/Photo.JPG?ex=abc&is=def", None),
            ".jpg"
        );
    }

    #[test]
    fn missing_or_odd_extension_is_unknown() {
        assert_eq!(resolve_extension("https://x/download", None), UNKNOWN_EXTENSION);
        assert_eq!(resolve_extension("https://x/a.tar-gz!", None), UNKNOWN_EXTENSION);
        assert_eq!(resolve_extension("not a url", None), UNKNOWN_EXTENSION);
        assert_eq!(resolve_extension("https://x/a", Some("../..")), UNKNOWN_EXTENSION);
    }

    #[test]
    fn hex_encoding_is_lowercase() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
    }
}
