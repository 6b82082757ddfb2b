//! Player controller actor
//!
//! Owns the control connection to the music player daemon, the queued
//! request ranks, and the latest playlist snapshot. Playback effects
//! happen here; metadata questions are forwarded to the search index
//! via `FindByFilename`.

pub mod queue;
pub mod transport;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use musicbot_common::bus::{BusSender, Envelope, Message};
use musicbot_common::config::PlayerConfig;
use musicbot_common::track::PlaylistEntry;
use tracing::{debug, error, info, warn};

use crate::actor::Actor;
use queue::{PlayQueue, MAX_QUEUE_SIZE};
use transport::{PlayerTransport, MAX_NATIVE_PRIORITY};

pub struct PlayerActor<T: PlayerTransport> {
    transport: T,
    bus: BusSender,
    queue: PlayQueue,
    /// Latest playlist snapshot, refreshed each poll
    entries: Vec<PlaylistEntry>,
    /// Native id of the track playing at the last poll, −1 when none
    current_id: i64,
    poll_interval: Duration,
    reconnect_interval: Duration,
    last_connect_attempt: Option<Instant>,
}

impl<T: PlayerTransport> PlayerActor<T> {
    pub fn new(transport: T, bus: BusSender, config: &PlayerConfig) -> Self {
        Self {
            transport,
            bus,
            queue: PlayQueue::new(),
            entries: Vec::new(),
            current_id: -1,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            reconnect_interval: Duration::from_secs(config.reconnect_interval_secs.max(1)),
            last_connect_attempt: None,
        }
    }

    async fn emit(&self, message: Message) {
        if self.bus.send(message).await.is_err() {
            warn!("bus closed, dropping outbound message");
        }
    }

    fn entry_by_id(&self, id: i64) -> Option<&PlaylistEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_by_filename(&self, filename: &str) -> Option<&PlaylistEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    /// Refresh the playlist snapshot; emits `UpdatePlaylist` when the
    /// set of files changed.
    async fn poll(&mut self) {
        let playlist = match self.transport.playlist().await {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(error = %e, "playlist poll failed");
                return;
            }
        };
        let current = match self.transport.current_song().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "currentsong poll failed");
                return;
            }
        };

        let changed = playlist.len() != self.entries.len()
            || playlist
                .iter()
                .zip(self.entries.iter())
                .any(|(a, b)| a.filename != b.filename);
        self.entries = playlist;

        let current_id = current.as_ref().map(|e| e.id).unwrap_or(-1);
        let song_changed = current_id != self.current_id;
        if song_changed {
            debug!(id = current_id, "current track changed");
            self.current_id = current_id;
            if self.queue.remove(current_id) {
                self.reapply_priorities().await;
            }
        }
        if self.queue.prune(|id| self.entries.iter().any(|e| e.id == id)) {
            self.reapply_priorities().await;
        }

        if changed {
            self.emit(Message::UpdatePlaylist {
                entries: self.entries.clone(),
            })
            .await;
        }
        // Song changes are announced bus-wide with no submitter; the rating
        // actor keys votes off the latest announcement.
        if song_changed {
            if let Some(entry) = current {
                self.emit(Message::NowPlaying {
                    entry,
                    submitter: String::new(),
                })
                .await;
            }
        }
    }

    /// Re-sync native priorities after ranks shifted.
    async fn reapply_priorities(&mut self) {
        let assignments: Vec<(usize, i64)> = self.queue.iter().collect();
        for (rank, id) in assignments {
            let native = MAX_NATIVE_PRIORITY - rank as u8;
            if let Err(e) = self.transport.set_priority(id, native).await {
                warn!(id, error = %e, "priority re-sync failed");
                return;
            }
        }
    }

    async fn handle_queue_track(&mut self, id: i64, filename: String, submitter: String) {
        // Resolve a stale id through the filename before giving up.
        let id = match self.entry_by_id(id) {
            Some(entry) => entry.id,
            None => match self.entry_by_filename(&filename) {
                Some(entry) => entry.id,
                None => {
                    self.emit(Message::QueueError {
                        reason: format!("{} is not in the playlist", filename),
                        submitter,
                    })
                    .await;
                    return;
                }
            },
        };

        let rank = match self.queue.insert(id) {
            Ok(rank) => rank,
            Err(e) => {
                self.emit(Message::QueueError {
                    reason: e.to_string(),
                    submitter,
                })
                .await;
                return;
            }
        };

        // Native priority only exists at this call site; everything else
        // reasons in ranks.
        let native = MAX_NATIVE_PRIORITY - rank as u8;
        if let Err(e) = self.transport.set_priority(id, native).await {
            error!(id, error = %e, "set_priority failed, rolling back rank");
            self.queue.remove(id);
            self.emit(Message::QueueError {
                reason: "player unavailable".to_string(),
                submitter,
            })
            .await;
            return;
        }

        let entry = match self.entry_by_id(id) {
            Some(entry) => entry.clone(),
            None => return,
        };
        info!(filename = %entry.filename, rank, native, "track queued");
        self.emit(Message::QueueResult {
            position: MAX_QUEUE_SIZE - rank,
            entry,
            submitter,
        })
        .await;
    }

    async fn handle_get_now_playing(&mut self, submitter: String) {
        match self.transport.current_song().await {
            Ok(Some(current)) => {
                self.current_id = current.id;
                self.emit(Message::FindByFilename {
                    filename: current.filename,
                    submitter,
                })
                .await;
            }
            Ok(None) => {
                self.emit(Message::SearchError {
                    reason: "nothing is playing".to_string(),
                    submitter,
                })
                .await;
            }
            Err(e) => {
                warn!(error = %e, "currentsong failed");
                self.emit(Message::SearchError {
                    reason: "player unavailable".to_string(),
                    submitter,
                })
                .await;
            }
        }
    }

    async fn handle_add_to_db(&mut self, filename: String) {
        let uri = (!filename.is_empty()).then_some(filename.as_str());
        if let Err(e) = self.transport.rescan(uri).await {
            warn!(filename = %filename, error = %e, "library rescan failed");
            return;
        }
        if filename.is_empty() {
            self.poll().await;
            return;
        }
        // The scan is asynchronous on the player side; wait for the file
        // to surface before publishing a snapshot.
        for _ in 0..10 {
            self.poll().await;
            if self.entry_by_filename(&filename).is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        warn!(filename = %filename, "file did not appear in the playlist after rescan");
    }
}

#[async_trait]
impl<T: PlayerTransport + 'static> Actor for PlayerActor<T> {
    fn name(&self) -> &'static str {
        "player"
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.poll_interval)
    }

    async fn tick(&mut self) {
        if !self.transport.is_connected() {
            let due = self
                .last_connect_attempt
                .map(|t| t.elapsed() >= self.reconnect_interval)
                .unwrap_or(true);
            if !due {
                return;
            }
            self.last_connect_attempt = Some(Instant::now());
            if let Err(e) = self.transport.connect().await {
                warn!(error = %e, "player connect failed, will retry");
                return;
            }
        }
        self.poll().await;
    }

    async fn handle(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::Play { .. } => {
                if let Err(e) = self.transport.shuffle().await {
                    warn!(error = %e, "shuffle failed");
                }
                if let Err(e) = self.transport.play().await {
                    warn!(error = %e, "play failed");
                }
            }
            Message::Next { .. } => {
                if let Err(e) = self.transport.next().await {
                    warn!(error = %e, "next failed");
                }
            }
            Message::SetRandom { enabled, .. } => {
                if let Err(e) = self.transport.set_random(enabled).await {
                    warn!(error = %e, "set_random failed");
                }
            }
            Message::GetNowPlaying { submitter } => {
                self.handle_get_now_playing(submitter).await;
            }
            Message::GetQueue { submitter } => {
                let entries: Vec<PlaylistEntry> = self
                    .queue
                    .iter()
                    .filter_map(|(_, id)| self.entry_by_id(id).cloned())
                    .collect();
                self.emit(Message::QueueContents { entries, submitter }).await;
            }
            Message::QueueTrack {
                id,
                filename,
                submitter,
            } => {
                self.handle_queue_track(id, filename, submitter).await;
            }
            Message::AddToDb { filename, .. } => {
                self.handle_add_to_db(filename).await;
            }
            _ => {}
        }
    }
}
