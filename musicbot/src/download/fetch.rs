//! Download seams: length lookup and the fetch tool
//!
//! The length gate reads the public watch page and extracts the
//! approximate duration; the fetcher shells out to a yt-dlp compatible
//! tool and locates the produced `<title>-<id>.mp3`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use musicbot_common::track::DownloadSite;
use musicbot_common::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Answers "how long is this track" before any download starts.
#[async_trait]
pub trait LengthGate: Send + Sync {
    /// Duration in seconds; `None` when it cannot be determined.
    async fn duration_secs(&self, site: DownloadSite, track_id: &str) -> Result<Option<i64>>;
}

/// Fetches one track into `dest` and returns the resulting file path.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, site: DownloadSite, track_id: &str, dest: &Path) -> Result<PathBuf>;
}

pub fn watch_url(site: DownloadSite, track_id: &str) -> String {
    match site {
        DownloadSite::Youtube => format!("https://www.youtube.com/watch?v={}", track_id),
    }
}

/// Length gate backed by a plain HTTP fetch of the watch page.
pub struct HttpLengthGate {
    client: reqwest::Client,
}

impl HttpLengthGate {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LengthGate for HttpLengthGate {
    async fn duration_secs(&self, site: DownloadSite, track_id: &str) -> Result<Option<i64>> {
        let url = watch_url(site, track_id);
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Subprocess(format!("length lookup: {}", e)))?
            .text()
            .await
            .map_err(|e| Error::Subprocess(format!("length lookup body: {}", e)))?;
        Ok(extract_duration_ms(&body).map(|ms| ms / 1000))
    }
}

/// Pull the millisecond duration out of the watch page's player JSON.
/// Only 4 to 10 digit runs count, matching real player payloads.
pub fn extract_duration_ms(body: &str) -> Option<i64> {
    let marker = "approxDurationMs\":\"";
    let start = body.find(marker)? + marker.len();
    let digits: &str = {
        let rest = &body[start..];
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if !(4..=10).contains(&digits.len()) {
        return None;
    }
    digits.parse().ok()
}

/// yt-dlp compatible fetcher producing `<title>-<id>.mp3` files.
pub struct YtDlp {
    bin: String,
}

impl YtDlp {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn fetch(&self, site: DownloadSite, track_id: &str, dest: &Path) -> Result<PathBuf> {
        let template = dest.join("%(title)s-%(id)s.%(ext)s");
        let template = template
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("non-UTF-8 path: {:?}", dest)))?;
        let url = watch_url(site, track_id);
        debug!(bin = %self.bin, url = %url, "starting download");

        let output = Command::new(&self.bin)
            .args([
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "--add-metadata",
                "--metadata-from-title",
                "%(artist)s - %(title)s",
                "-o",
                template,
                &url,
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Subprocess(format!("{}: {}", self.bin, e)))?;
        if !output.status.success() {
            return Err(Error::Subprocess(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        find_downloaded(dest, track_id).await?.ok_or_else(|| {
            Error::NotFound(format!("no mp3 for {} after download", track_id))
        })
    }
}

/// Locate the `*-<id>.mp3` the fetch tool produced.
pub async fn find_downloaded(dir: &Path, track_id: &str) -> Result<Option<PathBuf>> {
    let suffix = format!("-{}.mp3", track_id);
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(&suffix) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_duration_ms() {
        let body = r#"{"videoDetails":{"approxDurationMs":"271000","author":"x"}}"#;
        assert_eq!(extract_duration_ms(body), Some(271_000));
    }

    #[test]
    fn test_extract_rejects_short_and_long_runs() {
        assert_eq!(extract_duration_ms(r#""approxDurationMs":"999""#), None);
        assert_eq!(
            extract_duration_ms(r#""approxDurationMs":"99999999999""#),
            None
        );
        assert_eq!(extract_duration_ms("no marker at all"), None);
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(
            watch_url(DownloadSite::Youtube, "5tZlu4wP4pw"),
            "https://www.youtube.com/watch?v=5tZlu4wP4pw"
        );
    }

    #[tokio::test]
    async fn test_find_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Some Song-5tZlu4wP4pw.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("other.txt"), b"x").unwrap();
        let found = find_downloaded(dir.path(), "5tZlu4wP4pw").await.unwrap();
        assert!(found.is_some());
        assert!(find_downloaded(dir.path(), "aaaaaaaaaaa").await.unwrap().is_none());
    }
}
