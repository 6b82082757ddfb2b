//! In-process publish/subscribe message bus
//!
//! A single dispatcher task drains one FIFO transport queue and copies each
//! envelope into every currently registered mailbox. Per-sender ordering is
//! preserved at every receiver because all senders share the one transport
//! queue and there is exactly one dispatcher; no ordering is guaranteed
//! across different senders. An actor that registers after an envelope was
//! dispatched will not see it.
//!
//! Backpressure is an explicit per-mailbox [`OverflowPolicy`] chosen at
//! registration time; only a `Block` mailbox can stall the dispatcher.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::track::{DownloadRequest, PlaylistEntry};

/// Closed catalog of bus messages.
///
/// Payload access is an exhaustive `match`; adding a kind is a compile-time
/// event for every handler. Request/reply pairs are correlated by the
/// `submitter` field carried in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // ---- requests ----
    /// Start playback (shuffle + play)
    Play { submitter: String },
    /// Skip to the next track (queued rank 0 first)
    Next { submitter: String },
    /// Ask for the current track announcement
    GetNowPlaying { submitter: String },
    /// Ask for the current queue contents
    GetQueue { submitter: String },
    /// Free-text search; the top match is enqueued
    Request { query: String, submitter: String },
    /// Enqueue a resolved track on the playback queue
    QueueTrack {
        id: i64,
        filename: String,
        submitter: String,
    },
    /// Fetch a new track from an external site
    Download(DownloadRequest),
    IncreaseRating { submitter: String },
    DecreaseRating { submitter: String },
    /// Rescan the library for one file (or everything when empty)
    AddToDb { filename: String, submitter: String },
    /// Exact-filename lookup against the search index
    FindByFilename { filename: String, submitter: String },
    /// Toggle the player's random mode
    SetRandom { enabled: bool, submitter: String },

    // ---- results ----
    NowPlaying {
        entry: PlaylistEntry,
        submitter: String,
    },
    QueueResult {
        position: usize,
        entry: PlaylistEntry,
        submitter: String,
    },
    QueueError { reason: String, submitter: String },
    QueueContents {
        entries: Vec<PlaylistEntry>,
        submitter: String,
    },
    SearchError { reason: String, submitter: String },
    SongTooLong {
        id: String,
        duration_secs: i64,
        submitter: String,
    },
    DownloadCompleted {
        id: String,
        filename: String,
        submitter: String,
    },
    /// Full playlist snapshot after a rescan; bulk-indexed by the search actor
    UpdatePlaylist { entries: Vec<PlaylistEntry> },
    /// Refresh a single indexed document's position/rating
    UpdateIndex {
        filename: String,
        pos: i64,
        rating: Option<i32>,
    },
    RatingChanged {
        filename: String,
        rating: i32,
        submitter: String,
    },
    RatingError { reason: String, submitter: String },
}

impl Message {
    /// Get message kind as string for logging and filtering
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Play { .. } => "Play",
            Message::Next { .. } => "Next",
            Message::GetNowPlaying { .. } => "GetNowPlaying",
            Message::GetQueue { .. } => "GetQueue",
            Message::Request { .. } => "Request",
            Message::QueueTrack { .. } => "QueueTrack",
            Message::Download(_) => "Download",
            Message::IncreaseRating { .. } => "IncreaseRating",
            Message::DecreaseRating { .. } => "DecreaseRating",
            Message::AddToDb { .. } => "AddToDb",
            Message::FindByFilename { .. } => "FindByFilename",
            Message::SetRandom { .. } => "SetRandom",
            Message::NowPlaying { .. } => "NowPlaying",
            Message::QueueResult { .. } => "QueueResult",
            Message::QueueError { .. } => "QueueError",
            Message::QueueContents { .. } => "QueueContents",
            Message::SearchError { .. } => "SearchError",
            Message::SongTooLong { .. } => "SongTooLong",
            Message::DownloadCompleted { .. } => "DownloadCompleted",
            Message::UpdatePlaylist { .. } => "UpdatePlaylist",
            Message::UpdateIndex { .. } => "UpdateIndex",
            Message::RatingChanged { .. } => "RatingChanged",
            Message::RatingError { .. } => "RatingError",
        }
    }
}

/// A tagged message value passed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message: Message,
    /// Name of the registered sender
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

/// What the dispatcher does when a mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Await space; can stall the dispatcher for everyone
    Block,
    /// Drop the incoming envelope and log
    DropNewest,
    /// Drop the incoming envelope, log and count
    RejectNew,
}

/// Registration failed synchronously; a configuration-time error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("bus subscriber capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },
}

/// The transport queue is gone; the dispatcher has shut down.
#[derive(Error, Debug)]
#[error("message bus is closed")]
pub struct BusClosed;

/// Bus sizing knobs, from the `[bus]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Maximum live registrations; a deliberate ceiling
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    /// Bounded depth of each actor mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Bounded depth of the dispatcher transport queue
    #[serde(default = "default_transport_capacity")]
    pub transport_capacity: usize,
}

fn default_max_subscribers() -> usize {
    16
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_transport_capacity() -> usize {
    256
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_subscribers: default_max_subscribers(),
            mailbox_capacity: default_mailbox_capacity(),
            transport_capacity: default_transport_capacity(),
        }
    }
}

/// Stable handle into the subscriber slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(usize);

struct Subscriber {
    name: String,
    policy: OverflowPolicy,
    tx: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Option<Subscriber>>,
    live: usize,
    rejected: u64,
}

impl Registry {
    fn insert(&mut self, sub: Subscriber) -> SubscriberId {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(sub);
                self.live += 1;
                return SubscriberId(i);
            }
        }
        self.slots.push(Some(sub));
        self.live += 1;
        SubscriberId(self.slots.len() - 1)
    }

    fn remove(&mut self, id: SubscriberId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            if slot.take().is_some() {
                self.live -= 1;
            }
        }
    }
}

/// Outbound handle: stamps sender identity + timestamp and appends to the
/// dispatcher's transport queue.
#[derive(Debug, Clone)]
pub struct BusSender {
    name: String,
    tx: mpsc::Sender<Envelope>,
}

impl BusSender {
    /// Sender name as registered on the bus
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send(&self, message: Message) -> Result<(), BusClosed> {
        let envelope = Envelope {
            message,
            sender: self.name.clone(),
            timestamp: Utc::now(),
        };
        self.tx.send(envelope).await.map_err(|_| BusClosed)
    }
}

/// Inbound mailbox: a bounded FIFO of envelopes owned by exactly one actor.
#[derive(Debug)]
pub struct Mailbox {
    id: SubscriberId,
    rx: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next envelope; `None` once the bus shuts down.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Registry of senders and receivers plus the broadcast dispatcher.
pub struct MessageBus {
    config: BusConfig,
    transport_tx: mpsc::Sender<Envelope>,
    transport_rx: Option<mpsc::Receiver<Envelope>>,
    registry: Arc<Mutex<Registry>>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(config.transport_capacity);
        Self {
            config,
            transport_tx,
            transport_rx: Some(transport_rx),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register a participant, returning its outbound sender and inbound
    /// mailbox. Fails with `CapacityExceeded` past the configured ceiling.
    pub fn register(
        &self,
        name: &str,
        policy: OverflowPolicy,
    ) -> Result<(BusSender, Mailbox), RegisterError> {
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
        let id = {
            let mut registry = self.registry.lock().expect("bus registry poisoned");
            if registry.live >= self.config.max_subscribers {
                return Err(RegisterError::CapacityExceeded {
                    limit: self.config.max_subscribers,
                });
            }
            registry.insert(Subscriber {
                name: name.to_string(),
                policy,
                tx,
            })
        };
        debug!(subscriber = name, ?policy, "registered on bus");
        Ok((
            BusSender {
                name: name.to_string(),
                tx: self.transport_tx.clone(),
            },
            Mailbox { id, rx },
        ))
    }

    /// Remove a subscriber; its mailbox stops receiving new envelopes.
    pub fn deregister(&self, id: SubscriberId) {
        self.registry.lock().expect("bus registry poisoned").remove(id);
    }

    /// Number of live subscribers, for monitoring
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().expect("bus registry poisoned").live
    }

    /// Spawn the single dispatcher task. Call once; subsequent calls panic.
    pub fn spawn_dispatcher(&mut self) -> tokio::task::JoinHandle<()> {
        let rx = self
            .transport_rx
            .take()
            .expect("dispatcher already spawned");
        let registry = Arc::clone(&self.registry);
        tokio::spawn(dispatch_loop(rx, registry))
    }
}

async fn dispatch_loop(mut rx: mpsc::Receiver<Envelope>, registry: Arc<Mutex<Registry>>) {
    while let Some(envelope) = rx.recv().await {
        // Snapshot receivers registered at the moment of dispatch; a later
        // registration does not see this envelope.
        let targets: Vec<(SubscriberId, String, OverflowPolicy, mpsc::Sender<Envelope>)> = {
            let registry = registry.lock().expect("bus registry poisoned");
            registry
                .slots
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| {
                    slot.as_ref().map(|s| {
                        (SubscriberId(i), s.name.clone(), s.policy, s.tx.clone())
                    })
                })
                .collect()
        };

        for (id, name, policy, tx) in targets {
            let delivered = match policy {
                OverflowPolicy::Block => tx.send(envelope.clone()).await.is_ok(),
                OverflowPolicy::DropNewest => match tx.try_send(envelope.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            subscriber = %name,
                            kind = envelope.message.kind(),
                            "mailbox full, dropping envelope"
                        );
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
                OverflowPolicy::RejectNew => match tx.try_send(envelope.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        let mut registry = registry.lock().expect("bus registry poisoned");
                        registry.rejected += 1;
                        warn!(
                            subscriber = %name,
                            kind = envelope.message.kind(),
                            rejected_total = registry.rejected,
                            "mailbox full, rejecting envelope"
                        );
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
            };
            if !delivered {
                // Receiver dropped its mailbox; clear the slot.
                registry.lock().expect("bus registry poisoned").remove(id);
            }
        }
    }
}
