//! Download supervisor actor
//!
//! Accepts download requests, silently drops tracks the library already
//! has, and hands the rest to a bounded pool of worker jobs. A worker
//! gates on track length, fetches into a scratch directory, tags the
//! file, moves it into the library, and only then announces it:
//! `AddToDb` first, `DownloadCompleted` second.

pub mod fetch;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use musicbot_common::bus::{BusSender, Envelope, Message};
use musicbot_common::config::DownloadConfig;
use musicbot_common::track::{is_track_id, track_id_from_filename, DownloadRequest, RATING_DEFAULT};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::Actor;
use crate::tags::TagEditor;
use fetch::{Downloader, LengthGate};

pub struct DownloadActor {
    bus: BusSender,
    gate: Arc<dyn LengthGate>,
    downloader: Arc<dyn Downloader>,
    tags: Arc<dyn TagEditor>,
    config: DownloadConfig,
    /// Ids present in the library or in flight
    seen: Arc<Mutex<HashSet<String>>>,
    workers: Arc<Semaphore>,
}

impl DownloadActor {
    pub fn new(
        bus: BusSender,
        gate: Arc<dyn LengthGate>,
        downloader: Arc<dyn Downloader>,
        tags: Arc<dyn TagEditor>,
        config: DownloadConfig,
    ) -> Self {
        let seen = scan_library(&config.music_dir);
        info!(known = seen.len(), dir = %config.music_dir.display(), "library scanned");
        let workers = Arc::new(Semaphore::new(config.workers));
        Self {
            bus,
            gate,
            downloader,
            tags,
            config,
            seen: Arc::new(Mutex::new(seen)),
            workers,
        }
    }

    fn start_job(&self, request: DownloadRequest) {
        let bus = self.bus.clone();
        let gate = Arc::clone(&self.gate);
        let downloader = Arc::clone(&self.downloader);
        let tags = Arc::clone(&self.tags);
        let config = self.config.clone();
        let seen = Arc::clone(&self.seen);
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            if !run_job(&bus, &*gate, &*downloader, &*tags, &config, &request).await {
                // Failed jobs may be retried by the submitter.
                seen.lock().unwrap().remove(&request.track_id);
            }
        });
    }
}

#[async_trait]
impl Actor for DownloadActor {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Message::Download(request) = envelope.message else {
            return;
        };
        if !is_track_id(&request.track_id) {
            warn!(id = %request.track_id, "malformed track id, dropping request");
            return;
        }
        {
            let mut seen = self.seen.lock().unwrap();
            if !seen.insert(request.track_id.clone()) {
                // Already in the library or in flight; nothing to say.
                debug!(id = %request.track_id, "duplicate download request ignored");
                return;
            }
        }
        info!(id = %request.track_id, submitter = %request.submitter, "download accepted");
        self.start_job(request);
    }
}

/// One download job start to finish. Returns whether the track made it
/// into the library.
async fn run_job(
    bus: &BusSender,
    gate: &dyn LengthGate,
    downloader: &dyn Downloader,
    tags: &dyn TagEditor,
    config: &DownloadConfig,
    request: &DownloadRequest,
) -> bool {
    let max_secs = config.max_song_minutes * 60;
    // Unknown length refuses the download rather than risking a movie.
    let duration_secs = match gate.duration_secs(request.site, &request.track_id).await {
        Ok(Some(secs)) => secs,
        Ok(None) => {
            warn!(id = %request.track_id, "track length undeterminable, refusing");
            send(bus, Message::SongTooLong {
                id: request.track_id.clone(),
                duration_secs: -1,
                submitter: request.submitter.clone(),
            })
            .await;
            return false;
        }
        Err(e) => {
            warn!(id = %request.track_id, error = %e, "length lookup failed, refusing");
            send(bus, Message::SongTooLong {
                id: request.track_id.clone(),
                duration_secs: -1,
                submitter: request.submitter.clone(),
            })
            .await;
            return false;
        }
    };
    if duration_secs > max_secs {
        info!(id = %request.track_id, duration_secs, max_secs, "track too long");
        send(bus, Message::SongTooLong {
            id: request.track_id.clone(),
            duration_secs,
            submitter: request.submitter.clone(),
        })
        .await;
        return false;
    }

    let job_dir = config.tmp_dir.join(Uuid::new_v4().to_string());
    if let Err(e) = tokio::fs::create_dir_all(&job_dir).await {
        warn!(error = %e, "cannot create scratch directory");
        return false;
    }

    let fetched = match downloader.fetch(request.site, &request.track_id, &job_dir).await {
        Ok(path) => path,
        Err(e) => {
            warn!(id = %request.track_id, error = %e, "download failed");
            cleanup(&job_dir).await;
            return false;
        }
    };

    if let Err(e) = tags.set_rating(&fetched, RATING_DEFAULT).await {
        warn!(id = %request.track_id, error = %e, "tagging failed, abandoning download");
        cleanup(&job_dir).await;
        return false;
    }
    if let Err(e) = tags.set_submitter(&fetched, &request.submitter).await {
        warn!(id = %request.track_id, error = %e, "tagging failed, abandoning download");
        cleanup(&job_dir).await;
        return false;
    }

    let Some(file_name) = fetched.file_name().map(|n| n.to_string_lossy().into_owned())
    else {
        cleanup(&job_dir).await;
        return false;
    };
    let dest = config.music_dir.join(&file_name);
    if let Err(e) = tokio::fs::copy(&fetched, &dest).await {
        warn!(id = %request.track_id, error = %e, "copy into library failed");
        cleanup(&job_dir).await;
        return false;
    }
    cleanup(&job_dir).await;

    info!(id = %request.track_id, filename = %file_name, "download complete");
    // Library effect is announced before completion, in this order.
    send(bus, Message::AddToDb {
        filename: file_name.clone(),
        submitter: request.submitter.clone(),
    })
    .await;
    send(bus, Message::DownloadCompleted {
        id: request.track_id.clone(),
        filename: file_name,
        submitter: request.submitter.clone(),
    })
    .await;
    true
}

async fn send(bus: &BusSender, message: Message) {
    if bus.send(message).await.is_err() {
        warn!("bus closed, dropping outbound message");
    }
}

async fn cleanup(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "scratch cleanup failed");
    }
}

/// Collect the track ids already present in the library directory.
fn scan_library(dir: &Path) -> HashSet<String> {
    let mut seen = HashSet::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "library scan failed");
            return seen;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if let Some(id) = track_id_from_filename(&name.to_string_lossy()) {
            seen.insert(id.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use musicbot_common::bus::{BusConfig, Mailbox, MessageBus, OverflowPolicy};
    use musicbot_common::track::DownloadSite;
    use musicbot_common::{Error, Result};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGate {
        secs: Option<i64>,
        fail: bool,
    }

    #[async_trait]
    impl LengthGate for FixedGate {
        async fn duration_secs(&self, _site: DownloadSite, _id: &str) -> Result<Option<i64>> {
            if self.fail {
                return Err(Error::Subprocess("lookup failed".to_string()));
            }
            Ok(self.secs)
        }
    }

    struct CountingDownloader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Downloader for CountingDownloader {
        async fn fetch(&self, _site: DownloadSite, id: &str, dest: &Path) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = dest.join(format!("Fetched Song-{}.mp3", id));
            std::fs::write(&path, b"mp3")?;
            Ok(path)
        }
    }

    struct NoopTags;

    #[async_trait]
    impl TagEditor for NoopTags {
        async fn read(&self, _path: &Path) -> Result<crate::tags::TrackTags> {
            Ok(crate::tags::TrackTags::default())
        }
        async fn set_rating(&self, _path: &Path, _rating: i32) -> Result<()> {
            Ok(())
        }
        async fn set_submitter(&self, _path: &Path, _submitter: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        actor: DownloadActor,
        observer: Mailbox,
        downloader: Arc<CountingDownloader>,
        _music: tempfile::TempDir,
        _tmp: tempfile::TempDir,
    }

    fn harness(gate: FixedGate, max_song_minutes: i64) -> Harness {
        let music = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let config = DownloadConfig {
            music_dir: music.path().to_path_buf(),
            tmp_dir: tmp.path().to_path_buf(),
            max_song_minutes,
            ..DownloadConfig::default()
        };
        let mut bus = MessageBus::new(BusConfig::default());
        bus.spawn_dispatcher();
        let (tx, _own) = bus.register("download", OverflowPolicy::RejectNew).unwrap();
        let (_otx, observer) = bus.register("observer", OverflowPolicy::Block).unwrap();
        let downloader = Arc::new(CountingDownloader {
            calls: AtomicUsize::new(0),
        });
        let actor = DownloadActor::new(
            tx,
            Arc::new(gate),
            downloader.clone(),
            Arc::new(NoopTags),
            config,
        );
        Harness {
            actor,
            observer,
            downloader,
            _music: music,
            _tmp: tmp,
        }
    }

    fn download(id: &str) -> Envelope {
        Envelope {
            message: Message::Download(DownloadRequest {
                site: DownloadSite::Youtube,
                track_id: id.to_string(),
                submitter: "alice".to_string(),
            }),
            sender: "frontend".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_successful_download_announces_add_then_completed() {
        let mut h = harness(
            FixedGate {
                secs: Some(200),
                fail: false,
            },
            10,
        );
        h.actor.handle(download("5tZlu4wP4pw")).await;

        let first = h.observer.recv().await.unwrap();
        match first.message {
            Message::AddToDb { filename, .. } => {
                assert_eq!(filename, "Fetched Song-5tZlu4wP4pw.mp3");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        let second = h.observer.recv().await.unwrap();
        match second.message {
            Message::DownloadCompleted { id, filename, .. } => {
                assert_eq!(id, "5tZlu4wP4pw");
                assert_eq!(filename, "Fetched Song-5tZlu4wP4pw.mp3");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(h._music.path().join("Fetched Song-5tZlu4wP4pw.mp3").exists());
    }

    #[tokio::test]
    async fn test_duplicate_request_skips_fetch_silently() {
        let mut h = harness(
            FixedGate {
                secs: Some(200),
                fail: false,
            },
            10,
        );
        h.actor.handle(download("5tZlu4wP4pw")).await;
        // Wait for the first job to finish before duplicating.
        h.observer.recv().await.unwrap();
        h.observer.recv().await.unwrap();
        assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);

        h.actor.handle(download("5tZlu4wP4pw")).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), h.observer.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_too_long_track_refused_before_fetch() {
        let mut h = harness(
            FixedGate {
                secs: Some(11 * 60),
                fail: false,
            },
            10,
        );
        h.actor.handle(download("5tZlu4wP4pw")).await;
        match h.observer.recv().await.unwrap().message {
            Message::SongTooLong {
                id, duration_secs, ..
            } => {
                assert_eq!(id, "5tZlu4wP4pw");
                assert_eq!(duration_secs, 660);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_length_fails_closed() {
        let mut h = harness(
            FixedGate {
                secs: None,
                fail: false,
            },
            10,
        );
        h.actor.handle(download("5tZlu4wP4pw")).await;
        match h.observer.recv().await.unwrap().message {
            Message::SongTooLong { duration_secs, .. } => assert_eq!(duration_secs, -1),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_job_allows_retry() {
        let mut h = harness(
            FixedGate {
                secs: None,
                fail: true,
            },
            10,
        );
        h.actor.handle(download("5tZlu4wP4pw")).await;
        h.observer.recv().await.unwrap(); // SongTooLong
        // The id was released, so a retry is dispatched again.
        h.actor.handle(download("5tZlu4wP4pw")).await;
        assert_eq!(
            h.observer.recv().await.unwrap().message.kind(),
            "SongTooLong"
        );
    }

    #[tokio::test]
    async fn test_malformed_id_dropped() {
        let mut h = harness(
            FixedGate {
                secs: Some(200),
                fail: false,
            },
            10,
        );
        h.actor.handle(download("not an id")).await;
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), h.observer.recv())
                .await
                .is_err()
        );
    }

    #[test]
    fn test_scan_library_collects_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A Song-5tZlu4wP4pw.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("notrack.mp3"), b"x").unwrap();
        let seen = scan_library(dir.path());
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("5tZlu4wP4pw"));
    }
}
