//! Search actor
//!
//! Keeps the library index current from playlist snapshots and answers
//! free-text requests and exact-filename lookups. A `Request` resolves
//! straight into a `QueueTrack` for the player; only a miss talks back
//! to the submitter.

pub mod index;

use async_trait::async_trait;
use musicbot_common::bus::{BusSender, Envelope, Message};
use tracing::{debug, info, warn};

use crate::actor::Actor;
use index::SearchIndex;

pub struct SearchActor {
    bus: BusSender,
    index: SearchIndex,
}

impl SearchActor {
    pub fn new(bus: BusSender) -> Self {
        Self {
            bus,
            index: SearchIndex::new(),
        }
    }

    async fn emit(&self, message: Message) {
        if self.bus.send(message).await.is_err() {
            warn!("bus closed, dropping outbound message");
        }
    }

    async fn handle_request(&mut self, query: String, submitter: String) {
        match self.index.top_match(&query) {
            Some(doc) => {
                debug!(query = %query, filename = %doc.filename, "search hit");
                let (id, filename) = (doc.id, doc.filename.clone());
                self.emit(Message::QueueTrack {
                    id,
                    filename,
                    submitter,
                })
                .await;
            }
            None => {
                debug!(query = %query, "search miss");
                self.emit(Message::SearchError {
                    reason: "no results found".to_string(),
                    submitter,
                })
                .await;
            }
        }
    }

    async fn handle_find(&mut self, filename: String, submitter: String) {
        match self.index.find(&filename) {
            Some(doc) => {
                let entry = doc.clone();
                self.emit(Message::NowPlaying { entry, submitter }).await;
            }
            None => {
                self.emit(Message::SearchError {
                    reason: "no results found".to_string(),
                    submitter,
                })
                .await;
            }
        }
    }
}

#[async_trait]
impl Actor for SearchActor {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn handle(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::UpdatePlaylist { entries } => {
                self.index.reindex(entries);
                info!(documents = self.index.len(), "index rebuilt");
            }
            Message::UpdateIndex {
                filename,
                pos,
                rating,
            } => {
                if !self.index.update(&filename, pos, rating) {
                    debug!(filename = %filename, "update for unindexed file");
                }
            }
            Message::Request { query, submitter } => {
                self.handle_request(query, submitter).await;
            }
            Message::FindByFilename {
                filename,
                submitter,
            } => {
                self.handle_find(filename, submitter).await;
            }
            _ => {}
        }
    }
}
