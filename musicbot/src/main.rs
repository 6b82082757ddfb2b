//! musicbot - chat-driven jukebox daemon
//!
//! Wires the actors to the bus, bridges stdin/stdout as a console chat
//! connector, and runs until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicbot::actor::spawn_actor;
use musicbot::download::fetch::{HttpLengthGate, YtDlp};
use musicbot::download::DownloadActor;
use musicbot::frontend::{ChatLine, FrontEnd, Reply};
use musicbot::player::transport::MpdTransport;
use musicbot::player::PlayerActor;
use musicbot::rating::RatingActor;
use musicbot::search::SearchActor;
use musicbot::tags::{Id3Tool, TagEditor};
use musicbot_common::bus::{MessageBus, OverflowPolicy};
use musicbot_common::config::MusicBotConfig;

/// Command-line arguments for musicbot
#[derive(Parser, Debug)]
#[command(name = "musicbot")]
#[command(about = "Chat-driven jukebox daemon")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "MUSICBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = MusicBotConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.bot.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        channel = %config.irc.channel,
        music_dir = %config.downloads.music_dir.display(),
        "starting musicbot"
    );

    let mut bus = MessageBus::new(config.bus.clone());
    // A slow chat connector may drop announcements; playback control and
    // downloads must not lose requests.
    let (frontend_tx, frontend_mb) = bus.register("frontend", OverflowPolicy::DropNewest)?;
    let (player_tx, player_mb) = bus.register("player", OverflowPolicy::Block)?;
    let (search_tx, search_mb) = bus.register("search", OverflowPolicy::Block)?;
    let (rating_tx, rating_mb) = bus.register("rating", OverflowPolicy::Block)?;
    let (download_tx, download_mb) = bus.register("download", OverflowPolicy::RejectNew)?;
    let _dispatcher = bus.spawn_dispatcher();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let transport = MpdTransport::new(
        &config.player.host,
        config.player.port,
        config.player.password.clone(),
    );
    let player = PlayerActor::new(transport, player_tx, &config.player);

    let search = SearchActor::new(search_tx);

    let tags: Arc<dyn TagEditor> = Arc::new(Id3Tool::new(&config.downloads.id3_bin));
    let rating = RatingActor::new(
        rating_tx,
        Arc::clone(&tags),
        config.downloads.music_dir.clone(),
    );

    let gate = Arc::new(HttpLengthGate::new().context("Failed to build HTTP client")?);
    let downloader = Arc::new(YtDlp::new(&config.downloads.downloader_bin));
    let download = DownloadActor::new(
        download_tx,
        gate,
        downloader,
        Arc::clone(&tags),
        config.downloads.clone(),
    );

    let (chat_tx, chat_rx) = mpsc::channel(64);
    let (reply_tx, reply_rx) = mpsc::channel(64);
    let frontend = FrontEnd::new(
        frontend_tx,
        chat_rx,
        reply_tx,
        config.irc.clone(),
        config.bot.clone(),
    );

    let handles = vec![
        spawn_actor(player, player_mb, shutdown_rx.clone()),
        spawn_actor(search, search_mb, shutdown_rx.clone()),
        spawn_actor(rating, rating_mb, shutdown_rx.clone()),
        spawn_actor(download, download_mb, shutdown_rx.clone()),
        frontend.spawn(frontend_mb, shutdown_rx.clone()),
        spawn_console(chat_tx, reply_rx, shutdown_rx),
    ];

    shutdown_signal().await;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}

/// Bridge stdin lines and replies to the terminal as a chat connector.
fn spawn_console(
    chat_tx: mpsc::Sender<ChatLine>,
    mut reply_rx: mpsc::Receiver<Reply>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                maybe = reply_rx.recv() => match maybe {
                    Some(reply) => println!("[{}] {}", reply.target, reply.text),
                    None => break,
                },
                line = lines.next_line() => match line {
                    Ok(Some(text)) => {
                        let line = ChatLine {
                            nick: "console".to_string(),
                            text,
                        };
                        if chat_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                },
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
