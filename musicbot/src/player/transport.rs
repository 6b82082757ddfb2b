//! Player control connection
//!
//! [`PlayerTransport`] is the seam between the player actor and the
//! external daemon; [`MpdTransport`] speaks the MPD line protocol over
//! TCP. Responses are `key: value` lines terminated by `OK`, errors are
//! a single `ACK` line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use musicbot_common::track::{PlaylistEntry, RATING_UNKNOWN};
use musicbot_common::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Highest native priority; rank 0 maps here.
pub const MAX_NATIVE_PRIORITY: u8 = 9;

/// Control-connection operations the player actor needs.
#[async_trait]
pub trait PlayerTransport: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;

    /// Full current playlist in player order.
    async fn playlist(&mut self) -> Result<Vec<PlaylistEntry>>;
    /// The track playing right now, if any.
    async fn current_song(&mut self) -> Result<Option<PlaylistEntry>>;

    async fn play(&mut self) -> Result<()>;
    async fn next(&mut self) -> Result<()>;
    async fn shuffle(&mut self) -> Result<()>;
    async fn set_random(&mut self, enabled: bool) -> Result<()>;
    /// Assign a native priority to a playlist id.
    async fn set_priority(&mut self, id: i64, priority: u8) -> Result<()>;
    /// Rescan the library database, optionally restricted to one path.
    async fn rescan(&mut self, uri: Option<&str>) -> Result<()>;
}

/// MPD protocol client over a TCP control connection.
pub struct MpdTransport {
    host: String,
    port: u16,
    password: Option<String>,
    stream: Option<BufReader<TcpStream>>,
}

impl MpdTransport {
    pub fn new(host: &str, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            port,
            password,
            stream: None,
        }
    }

    /// Send one command and collect response lines up to the `OK`
    /// terminator. Any transport failure drops the connection so the
    /// next call starts from `connect`.
    async fn command(&mut self, cmd: &str) -> Result<Vec<String>> {
        let result = self.command_inner(cmd).await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    async fn command_inner(&mut self, cmd: &str) -> Result<Vec<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Player("not connected".to_string()))?;
        debug!(command = cmd, "player command");
        stream
            .get_mut()
            .write_all(format!("{}\n", cmd).as_bytes())
            .await?;

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = stream.read_line(&mut line).await?;
            if n == 0 {
                return Err(Error::Player("connection closed".to_string()));
            }
            let line = line.trim_end();
            if line == "OK" {
                return Ok(lines);
            }
            if line.starts_with("ACK") {
                return Err(Error::Player(line.to_string()));
            }
            lines.push(line.to_string());
        }
    }
}

#[async_trait]
impl PlayerTransport for MpdTransport {
    async fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let mut reader = BufReader::new(stream);
        let mut banner = String::new();
        reader.read_line(&mut banner).await?;
        if !banner.starts_with("OK MPD") {
            return Err(Error::Player(format!(
                "unexpected banner: {}",
                banner.trim_end()
            )));
        }
        info!(host = %self.host, port = self.port, banner = banner.trim_end(), "player connected");
        self.stream = Some(reader);
        if let Some(password) = self.password.clone() {
            self.command(&format!("password {}", quote(&password))).await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn playlist(&mut self) -> Result<Vec<PlaylistEntry>> {
        let lines = self.command("playlistinfo").await?;
        Ok(parse_entries(&lines))
    }

    async fn current_song(&mut self) -> Result<Option<PlaylistEntry>> {
        let lines = self.command("currentsong").await?;
        Ok(parse_entries(&lines).into_iter().next())
    }

    async fn play(&mut self) -> Result<()> {
        self.command("play").await?;
        Ok(())
    }

    async fn next(&mut self) -> Result<()> {
        self.command("next").await?;
        Ok(())
    }

    async fn shuffle(&mut self) -> Result<()> {
        self.command("shuffle").await?;
        Ok(())
    }

    async fn set_random(&mut self, enabled: bool) -> Result<()> {
        self.command(if enabled { "random 1" } else { "random 0" })
            .await?;
        Ok(())
    }

    async fn set_priority(&mut self, id: i64, priority: u8) -> Result<()> {
        self.command(&format!("prioid {} {}", priority, id)).await?;
        Ok(())
    }

    async fn rescan(&mut self, uri: Option<&str>) -> Result<()> {
        let cmd = match uri {
            Some(uri) => format!("update {}", quote(uri)),
            None => "update".to_string(),
        };
        self.command(&cmd).await?;
        Ok(())
    }
}

/// Quote an argument for the wire, escaping backslash and double quote.
fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Parse `key: value` response lines into entries; each `file:` line
/// starts a new one. Ratings are not on the wire and start unknown.
pub fn parse_entries(lines: &[String]) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PlaylistEntry> = None;
    for line in lines {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        if key == "file" {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(blank_entry(value));
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        match key {
            "Artist" => entry.artist = value.to_string(),
            "Title" => entry.title = value.to_string(),
            "Last-Modified" => {
                entry.last_modified = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            "Time" => entry.duration_secs = value.parse().unwrap_or(0),
            "Pos" => entry.pos = value.parse().unwrap_or(-1),
            "Id" => entry.id = value.parse().unwrap_or(-1),
            "Prio" => entry.prio = value.parse().unwrap_or(-1),
            _ => {}
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

fn blank_entry(filename: &str) -> PlaylistEntry {
    PlaylistEntry {
        filename: filename.to_string(),
        artist: String::new(),
        title: String::new(),
        last_modified: None,
        rating: RATING_UNKNOWN,
        duration_secs: 0,
        pos: -1,
        id: -1,
        prio: -1,
        submitter: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &str) -> Vec<String> {
        raw.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_playlist_response() {
        let response = lines(
            "file: Zero 7 - In The Waiting Line-5tZlu4wP4pw.mp3\n\
             Last-Modified: 2026-01-12T08:30:00Z\n\
             Artist: Zero 7\n\
             Title: In The Waiting Line\n\
             Time: 271\n\
             Pos: 0\n\
             Id: 17\n\
             file: Other-aaaaaaaaaaa.mp3\n\
             Time: 190\n\
             Pos: 1\n\
             Id: 18\n\
             Prio: 9",
        );
        let entries = parse_entries(&response);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].artist, "Zero 7");
        assert_eq!(entries[0].duration_secs, 271);
        assert_eq!(entries[0].id, 17);
        assert_eq!(entries[0].prio, -1);
        assert_eq!(entries[0].rating, RATING_UNKNOWN);
        assert!(entries[0].last_modified.is_some());
        assert_eq!(entries[1].prio, 9);
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_entries(&[]).is_empty());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a \"b\" c"), "\"a \\\"b\\\" c\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }
}
