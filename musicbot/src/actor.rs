//! Actor runtime: one task per actor, fed by its bus mailbox
//!
//! Every module in the daemon is an actor owning its state exclusively;
//! the only way in is an envelope, the only way out is a bus send. The
//! runtime loop also drives an optional periodic tick for actors that
//! poll an external resource.

use std::time::Duration;

use async_trait::async_trait;
use musicbot_common::bus::{Envelope, Mailbox};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// A bus participant with exclusive ownership of its state.
#[async_trait]
pub trait Actor: Send {
    /// Stable name used in logs and as the bus sender identity
    fn name(&self) -> &'static str;

    /// Handle one envelope. Runs to completion before the next one.
    async fn handle(&mut self, envelope: Envelope);

    /// Period for [`Actor::tick`]; `None` disables ticking.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    /// Periodic work between envelopes (polling, reconnects).
    async fn tick(&mut self) {}
}

/// Drive an actor until shutdown is signalled or the bus closes.
pub fn spawn_actor<A>(
    mut actor: A,
    mut mailbox: Mailbox,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    A: Actor + 'static,
{
    tokio::spawn(async move {
        let mut ticker = actor.tick_interval().map(tokio::time::interval);
        loop {
            if let Some(interval) = ticker.as_mut() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    maybe = mailbox.recv() => match maybe {
                        Some(envelope) => actor.handle(envelope).await,
                        None => break,
                    },
                    _ = interval.tick() => actor.tick().await,
                }
            } else {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    maybe = mailbox.recv() => match maybe {
                        Some(envelope) => actor.handle(envelope).await,
                        None => break,
                    },
                }
            }
        }
        info!(actor = actor.name(), "actor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbot_common::bus::{BusConfig, Message, MessageBus, OverflowPolicy};

    struct Recorder {
        seen: tokio::sync::mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Actor for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&mut self, envelope: Envelope) {
            let _ = self.seen.send(envelope.message.kind().to_string());
        }
    }

    #[tokio::test]
    async fn test_actor_processes_envelopes_in_order() {
        let mut bus = MessageBus::new(BusConfig::default());
        bus.spawn_dispatcher();
        let (tx, mailbox) = bus.register("frontend", OverflowPolicy::Block).unwrap();
        let (_atx, actor_mailbox) = bus.register("recorder", OverflowPolicy::Block).unwrap();

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_actor(Recorder { seen: seen_tx }, actor_mailbox, shutdown_rx);

        tx.send(Message::Play {
            submitter: "alice".to_string(),
        })
        .await
        .unwrap();
        tx.send(Message::Next {
            submitter: "alice".to_string(),
        })
        .await
        .unwrap();
        drop(mailbox);

        assert_eq!(seen_rx.recv().await.unwrap(), "Play");
        assert_eq!(seen_rx.recv().await.unwrap(), "Next");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
