//! Rating actor
//!
//! Tracks the current track from `NowPlaying` announcements and applies
//! rating votes to the file's tags, clamped to the 0..=10 scale. Every
//! applied vote refreshes the search index before anyone is told about
//! the new value.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use musicbot_common::bus::{BusSender, Envelope, Message};
use musicbot_common::track::{PlaylistEntry, RATING_DEFAULT, RATING_MAX, RATING_MIN, RATING_UNKNOWN};
use tracing::{info, warn};

use crate::actor::Actor;
use crate::tags::TagEditor;

pub struct RatingActor {
    bus: BusSender,
    tags: Arc<dyn TagEditor>,
    music_dir: PathBuf,
    /// Most recent track announced on the bus
    current: Option<PlaylistEntry>,
}

impl RatingActor {
    pub fn new(bus: BusSender, tags: Arc<dyn TagEditor>, music_dir: PathBuf) -> Self {
        Self {
            bus,
            tags,
            music_dir,
            current: None,
        }
    }

    async fn emit(&self, message: Message) {
        if self.bus.send(message).await.is_err() {
            warn!("bus closed, dropping outbound message");
        }
    }

    async fn adjust(&mut self, delta: i32, submitter: String) {
        let Some(entry) = self.current.clone() else {
            self.emit(Message::RatingError {
                reason: "no track is playing".to_string(),
                submitter,
            })
            .await;
            return;
        };

        let path = self.music_dir.join(&entry.filename);
        let base = if entry.rating != RATING_UNKNOWN {
            entry.rating
        } else {
            match self.tags.read(&path).await {
                Ok(tags) if tags.rating != RATING_UNKNOWN => tags.rating,
                Ok(_) => RATING_DEFAULT,
                Err(e) => {
                    warn!(filename = %entry.filename, error = %e, "tag read failed");
                    RATING_DEFAULT
                }
            }
        };
        let rating = (base + delta).clamp(RATING_MIN, RATING_MAX);

        if let Err(e) = self.tags.set_rating(&path, rating).await {
            warn!(filename = %entry.filename, error = %e, "tag write failed");
            self.emit(Message::RatingError {
                reason: format!("could not update rating for {}", entry.display_title()),
                submitter,
            })
            .await;
            return;
        }

        info!(filename = %entry.filename, from = base, to = rating, "rating updated");
        if let Some(current) = self.current.as_mut() {
            current.rating = rating;
        }
        // Index first, announcement second; a reader reacting to the
        // announcement sees the new value.
        self.emit(Message::UpdateIndex {
            filename: entry.filename.clone(),
            pos: entry.pos,
            rating: Some(rating),
        })
        .await;
        self.emit(Message::RatingChanged {
            filename: entry.filename,
            rating,
            submitter,
        })
        .await;
    }
}

#[async_trait]
impl Actor for RatingActor {
    fn name(&self) -> &'static str {
        "rating"
    }

    async fn handle(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::NowPlaying { entry, .. } => {
                self.current = Some(entry);
            }
            Message::IncreaseRating { submitter } => {
                self.adjust(1, submitter).await;
            }
            Message::DecreaseRating { submitter } => {
                self.adjust(-1, submitter).await;
            }
            _ => {}
        }
    }
}
