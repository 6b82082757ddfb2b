//! ID3 tag access through an external id3v2-compatible tool
//!
//! The track rating lives in the track-number frame (TRCK) and the
//! submitter in a comment frame (COMM); artist and title use their
//! standard frames.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use musicbot_common::track::RATING_UNKNOWN;
use musicbot_common::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Tags read back from a library file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// −1 when the TRCK frame is absent or unparseable
    pub rating: i32,
    pub submitter: Option<String>,
}

/// Tag read/write seam; the production implementation shells out, tests
/// substitute a mock.
#[async_trait]
pub trait TagEditor: Send + Sync {
    async fn read(&self, path: &Path) -> Result<TrackTags>;
    async fn set_rating(&self, path: &Path, rating: i32) -> Result<()>;
    async fn set_submitter(&self, path: &Path, submitter: &str) -> Result<()>;
}

/// Adapter over the `id3v2` command-line tool.
pub struct Id3Tool {
    bin: String,
}

impl Id3Tool {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(bin = %self.bin, ?args, "running tag tool");
        let output = Command::new(&self.bin)
            .args(args)
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
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TagEditor for Id3Tool {
    async fn read(&self, path: &Path) -> Result<TrackTags> {
        let path = path_str(path)?;
        let stdout = self.run(&["-l", path]).await?;
        Ok(parse_list_output(&stdout))
    }

    async fn set_rating(&self, path: &Path, rating: i32) -> Result<()> {
        let path = path_str(path)?;
        self.run(&["-T", &rating.to_string(), path]).await?;
        Ok(())
    }

    async fn set_submitter(&self, path: &Path, submitter: &str) -> Result<()> {
        let path = path_str(path)?;
        self.run(&["-c", submitter, path]).await?;
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidInput(format!("non-UTF-8 path: {:?}", path)))
}

/// Parse `id3v2 -l` output into tags. ID3v1 fallback lines are skipped;
/// only v2 frames are authoritative.
fn parse_list_output(stdout: &str) -> TrackTags {
    let mut tags = TrackTags {
        rating: RATING_UNKNOWN,
        ..TrackTags::default()
    };
    for line in stdout.lines() {
        if line.contains("ID3v1") {
            continue;
        }
        let Some(value) = frame_value(line) else {
            continue;
        };
        match &line[..4] {
            "TPE1" => tags.artist = Some(value.to_string()),
            "TIT2" => tags.title = Some(value.to_string()),
            "TRCK" => {
                // Rating may be stored as "5" or "5/10".
                let digits = value.split('/').next().unwrap_or(value).trim();
                if let Ok(rating) = digits.parse::<i32>() {
                    tags.rating = rating;
                }
            }
            "COMM" => {
                // COMM (Comments): (Description)[lang]: text
                let text = value.rsplit("]: ").next().unwrap_or(value);
                if !text.is_empty() {
                    tags.submitter = Some(text.to_string());
                }
            }
            _ => {}
        }
    }
    tags
}

/// Extract the value after the frame description, e.g.
/// `TIT2 (Title/songname/content description): My Song` → `My Song`.
fn frame_value(line: &str) -> Option<&str> {
    // Frame ids are four bytes of uppercase ASCII or digits (TIT2, TPE1).
    let id_ok = line.len() >= 4
        && line.as_bytes()[..4]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if !id_ok {
        return None;
    }
    line.find("): ").map(|i| line[i + 3..].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id3v2 tag info for Zero 7 - In The Waiting Line-5tZlu4wP4pw.mp3:
TIT2 (Title/songname/content description): In The Waiting Line
TPE1 (Lead performer(s)/Soloist(s)): Zero 7
TRCK (Track number/Position in set): 7
COMM (Comments): (Submitter)[eng]: alice
Zero 7 - In The Waiting Line-5tZlu4wP4pw.mp3: No ID3v1 tag
";

    #[test]
    fn test_parse_list_output() {
        let tags = parse_list_output(SAMPLE);
        assert_eq!(tags.title.as_deref(), Some("In The Waiting Line"));
        assert_eq!(tags.artist.as_deref(), Some("Zero 7"));
        assert_eq!(tags.rating, 7);
        assert_eq!(tags.submitter.as_deref(), Some("alice"));
    }

    #[test]
    fn test_parse_skips_id3v1_comment_lines() {
        let stdout = "COMM (ID3v1 Comment)[XXX]: ignored\nTRCK (Track number/Position in set): 3\n";
        let tags = parse_list_output(stdout);
        assert_eq!(tags.rating, 3);
        assert_eq!(tags.submitter, None);
    }

    #[test]
    fn test_parse_rating_with_total() {
        let tags = parse_list_output("TRCK (Track number/Position in set): 5/10\n");
        assert_eq!(tags.rating, 5);
    }

    #[test]
    fn test_frame_value_requires_frame_id_prefix() {
        assert_eq!(
            frame_value("TPE1 (Lead performer(s)/Soloist(s)): Zero 7"),
            Some("Zero 7")
        );
        assert_eq!(frame_value("id3v2 tag info for x.mp3 (note): y"), None);
    }

    #[test]
    fn test_missing_frames_yield_unknown_rating() {
        let tags = parse_list_output("id3v2 tag info for x.mp3:\n");
        assert_eq!(tags.rating, RATING_UNKNOWN);
        assert_eq!(tags.artist, None);
    }
}
