//! Chat front end
//!
//! Sits between a chat connector and the bus: inbound lines become
//! request messages, result messages become replies. The connector is
//! just a pair of channels, so the same front end drives an IRC bridge
//! or a console session.

use musicbot_common::bus::{BusSender, Envelope, Mailbox, Message};
use musicbot_common::config::{BotConfig, IrcConfig};
use musicbot_common::track::{is_track_id, strip_id_suffix, DownloadRequest, DownloadSite, TRACK_ID_LEN};
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One line of chat from a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub nick: String,
    pub text: String,
}

/// One line for the connector to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub target: String,
    pub text: String,
}

const HELP_TEXT: &str = "commands: dj+ <id|url>, request <query>, queue, np, \
                         tune, ch00n, boo, start, next, radio, help";

const RATING_UP_LINES: &[&str] = &["Party on!!!!", "Ch00n!!", "Nice one!"];
const RATING_DOWN_LINES: &[&str] = &["Awww!", "Fair enough", "Tough crowd"];

pub struct FrontEnd {
    bus: BusSender,
    chat_rx: mpsc::Receiver<ChatLine>,
    reply_tx: mpsc::Sender<Reply>,
    irc: IrcConfig,
    bot: BotConfig,
}

impl FrontEnd {
    pub fn new(
        bus: BusSender,
        chat_rx: mpsc::Receiver<ChatLine>,
        reply_tx: mpsc::Sender<Reply>,
        irc: IrcConfig,
        bot: BotConfig,
    ) -> Self {
        Self {
            bus,
            chat_rx,
            reply_tx,
            irc,
            bot,
        }
    }

    /// Run until shutdown, draining both the chat connector and the bus
    /// mailbox.
    pub fn spawn(
        mut self,
        mut mailbox: Mailbox,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    maybe = mailbox.recv() => match maybe {
                        Some(envelope) => self.handle_envelope(envelope).await,
                        None => break,
                    },
                    maybe = self.chat_rx.recv() => match maybe {
                        Some(line) => self.handle_chat(line).await,
                        None => break,
                    },
                }
            }
            info!("front end stopped");
        })
    }

    async fn send(&self, message: Message) {
        if self.bus.send(message).await.is_err() {
            warn!("bus closed, dropping outbound message");
        }
    }

    async fn reply(&self, text: String) {
        let reply = Reply {
            target: self.irc.channel.clone(),
            text,
        };
        if self.reply_tx.send(reply).await.is_err() {
            warn!("chat connector gone, dropping reply");
        }
    }

    async fn reply_to(&self, nick: &str, text: &str) {
        if nick.is_empty() {
            self.reply(text.to_string()).await;
        } else {
            self.reply(format!("{}: {}", nick, text)).await;
        }
    }

    async fn handle_chat(&self, line: ChatLine) {
        let Some(rest) = line.text.strip_prefix(&self.irc.command_char) else {
            return;
        };
        let (command, arg) = match rest.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (rest.trim(), ""),
        };
        debug!(nick = %line.nick, command, "chat command");
        let submitter = line.nick.clone();

        match command {
            "dj+" => match parse_track_id(arg) {
                Some(track_id) => {
                    self.send(Message::Download(DownloadRequest {
                        site: DownloadSite::Youtube,
                        track_id: track_id.to_string(),
                        submitter,
                    }))
                    .await;
                }
                None => {
                    self.reply_to(&line.nick, "that does not look like a track id or url")
                        .await;
                }
            },
            "start" => self.send(Message::Play { submitter }).await,
            "next" => self.send(Message::Next { submitter }).await,
            "np" => self.send(Message::GetNowPlaying { submitter }).await,
            "queue" => self.send(Message::GetQueue { submitter }).await,
            "request" => {
                if arg.is_empty() {
                    self.reply_to(&line.nick, "usage: request <query>").await;
                } else {
                    self.send(Message::Request {
                        query: arg.to_string(),
                        submitter,
                    })
                    .await;
                }
            }
            "tune" | "ch00n" => self.send(Message::IncreaseRating { submitter }).await,
            "boo" => self.send(Message::DecreaseRating { submitter }).await,
            "radio" => {
                if self.bot.stream_url.is_empty() {
                    self.reply_to(&line.nick, "no stream configured").await;
                } else {
                    let text = format!("tune in at {}", self.bot.stream_url);
                    self.reply_to(&line.nick, &text).await;
                }
            }
            "help" => self.reply_to(&line.nick, HELP_TEXT).await,
            _ => {}
        }
    }

    async fn handle_envelope(&self, envelope: Envelope) {
        match envelope.message {
            Message::NowPlaying { entry, submitter } => {
                // Poll announcements carry no submitter and stay off chat.
                if submitter.is_empty() {
                    return;
                }
                let mut text = format!("Now playing: {}", entry.display_title());
                if entry.duration_secs > 0 {
                    text.push_str(&format!(
                        " [{}m{:02}s]",
                        entry.duration_secs / 60,
                        entry.duration_secs % 60
                    ));
                }
                if entry.rating >= 0 {
                    text.push_str(&format!(" ({}/10)", entry.rating));
                }
                self.reply_to(&submitter, &text).await;
            }
            Message::QueueResult {
                position,
                entry,
                submitter,
            } => {
                let text = format!(
                    "queued {} at position {}",
                    entry.display_title(),
                    position
                );
                self.reply_to(&submitter, &text).await;
            }
            Message::QueueError { reason, submitter } => {
                self.reply_to(&submitter, &reason).await;
            }
            Message::QueueContents { entries, submitter } => {
                if entries.is_empty() {
                    self.reply_to(&submitter, "the queue is empty").await;
                } else {
                    let listing = entries
                        .iter()
                        .enumerate()
                        .map(|(i, e)| format!("{}. {}", i + 1, e.display_title()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.reply_to(&submitter, &format!("up next: {}", listing))
                        .await;
                }
            }
            Message::SearchError { reason, submitter } => {
                self.reply_to(&submitter, &reason).await;
            }
            Message::SongTooLong {
                id,
                duration_secs,
                submitter,
            } => {
                let text = if duration_secs < 0 {
                    format!("could not determine the length of {}, not downloading", id)
                } else {
                    format!(
                        "{} is too long ({}m{:02}s), not downloading",
                        id,
                        duration_secs / 60,
                        duration_secs % 60
                    )
                };
                self.reply_to(&submitter, &text).await;
            }
            Message::DownloadCompleted {
                filename,
                submitter,
                ..
            } => {
                // Channel-wide announcement, not a direct reply.
                self.reply(format!(
                    "{} added {}",
                    submitter,
                    strip_id_suffix(&filename)
                ))
                .await;
            }
            Message::RatingChanged {
                filename,
                rating,
                submitter,
            } => {
                let lines = if rating >= 5 {
                    RATING_UP_LINES
                } else {
                    RATING_DOWN_LINES
                };
                let flourish = lines
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .unwrap_or("");
                let text = format!(
                    "Rating for {} is {}/10 .. {}",
                    strip_id_suffix(&filename),
                    rating,
                    flourish
                );
                self.reply_to(&submitter, &text).await;
            }
            Message::RatingError { reason, submitter } => {
                self.reply_to(&submitter, &reason).await;
            }
            _ => {}
        }
    }
}

/// Accept a bare track id or a watch/short url and extract the id.
pub fn parse_track_id(arg: &str) -> Option<&str> {
    if is_track_id(arg) {
        return Some(arg);
    }
    for marker in ["v=", "youtu.be/"] {
        if let Some(i) = arg.find(marker) {
            let start = i + marker.len();
            if let Some(candidate) = arg.get(start..start + TRACK_ID_LEN) {
                if is_track_id(candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}
