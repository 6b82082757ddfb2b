//! Canonical track types shared across actors
//!
//! A `PlaylistEntry` is a fresh snapshot derived from the player's live
//! playlist each poll cycle; consumers must not cache one across polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rating is stored in the track-number tag frame.
pub const RATING_UNKNOWN: i32 = -1;
pub const RATING_MIN: i32 = 0;
pub const RATING_MAX: i32 = 10;
pub const RATING_DEFAULT: i32 = 5;

/// External track ids are exactly 11 characters of `[A-Za-z0-9_-]`.
pub const TRACK_ID_LEN: usize = 11;

/// The canonical per-track record combining filesystem, player and
/// index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Library filename, `<title>-<id>.mp3`
    pub filename: String,
    pub artist: String,
    pub title: String,
    /// Last-modified timestamp of the library file, when known
    pub last_modified: Option<DateTime<Utc>>,
    /// −1 = unknown, 0–10 otherwise
    pub rating: i32,
    pub duration_secs: i64,
    /// Player-native playlist position, −1 when unknown
    pub pos: i64,
    /// Player-native id, −1 when unknown
    pub id: i64,
    /// Queue priority rank, −1 = not queued
    pub prio: i64,
    /// User who submitted the track for download, when recorded
    pub submitter: Option<String>,
}

impl PlaylistEntry {
    /// Display title: the filename with the `-<id>.mp3` suffix stripped.
    pub fn display_title(&self) -> &str {
        strip_id_suffix(&self.filename)
    }
}

/// Download site for a track request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadSite {
    Youtube,
}

/// A download command from the front end, consumed exactly once by the
/// download pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub site: DownloadSite,
    pub track_id: String,
    pub submitter: String,
}

/// Whether `value` is a well-formed external track id.
pub fn is_track_id(value: &str) -> bool {
    value.len() == TRACK_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the external track id from a `<title>-<id>.mp3` filename.
pub fn track_id_from_filename(fname: &str) -> Option<&str> {
    let stem = fname.strip_suffix(".mp3")?;
    if stem.len() <= TRACK_ID_LEN {
        return None;
    }
    let (head, id) = stem.split_at(stem.len() - TRACK_ID_LEN);
    if !head.ends_with('-') || !is_track_id(id) {
        return None;
    }
    Some(id)
}

/// Strip the 16-character `-<id>.mp3` suffix for display; filenames
/// without the pattern pass through unchanged.
pub fn strip_id_suffix(fname: &str) -> &str {
    match track_id_from_filename(fname) {
        Some(_) => &fname[..fname.len() - TRACK_ID_LEN - 5],
        None => fname,
    }
}
