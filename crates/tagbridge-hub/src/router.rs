//! Routes device observations to observers and observer commands to the
//! alias store.
//!
//! ```text
//! adapters ──events──► Router ──card-read──────► Hub ──► observers
//!                        │
//! observers ─commands──► │ ──► AliasStore ──on_change──► Hub (aliases-update)
//!                        └──save-success / error──► originating observer
//! ```
//!
//! Events and commands are served by two loops running side by side, so a
//! slow disk write never holds back a card read. Commands themselves run
//! one at a time in arrival order.

use crate::hub::{Hub, ObserverId};
use crate::protocol::{ObserverCommand, ServerMessage};
use std::sync::{Arc, Weak};
use tagbridge_core::ObservedEvent;
use tagbridge_storage::{AliasStore, StorageResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Command together with the observer that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub observer: ObserverId,
    pub command: ObserverCommand,
}

impl CommandEnvelope {
    pub fn new(observer: ObserverId, command: ObserverCommand) -> Self {
        Self { observer, command }
    }
}

/// Event router.
pub struct Router {
    hub: Arc<Hub>,
    store: Arc<AliasStore>,
}

impl Router {
    /// Create the router and subscribe the hub to table changes.
    ///
    /// From here on every successful store mutation is broadcast to all
    /// observers as `aliases-update`.
    pub fn new(hub: Arc<Hub>, store: Arc<AliasStore>) -> Self {
        let listener: Weak<Hub> = Arc::downgrade(&hub);
        store.on_change(move |table| {
            if let Some(hub) = listener.upgrade() {
                hub.broadcast(&ServerMessage::aliases_update(table.clone()));
            }
        });

        Self { hub, store }
    }

    /// Serve until `shutdown` is cancelled or both inputs are closed.
    pub async fn run(
        self,
        events: mpsc::Receiver<ObservedEvent>,
        commands: mpsc::Receiver<CommandEnvelope>,
        shutdown: CancellationToken,
    ) {
        info!("Router started");
        tokio::join!(
            self.event_loop(events, &shutdown),
            self.command_loop(commands, &shutdown),
        );
        info!("Router stopped");
    }

    async fn event_loop(
        &self,
        mut events: mpsc::Receiver<ObservedEvent>,
        shutdown: &CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("Event stream closed");
                break;
            };

            let delivered = self.hub.broadcast(&ServerMessage::from(event));
            debug!(delivered, "Observation broadcast");
        }
    }

    async fn command_loop(
        &self,
        mut commands: mpsc::Receiver<CommandEnvelope>,
        shutdown: &CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = commands.recv() => envelope,
            };
            let Some(envelope) = envelope else {
                debug!("Command stream closed");
                break;
            };

            self.execute(envelope).await;
        }
    }

    /// Apply one command and acknowledge it to its sender.
    ///
    /// The table broadcast happens inside the store's change listener, so
    /// every observer has the new table queued before the ack.
    pub async fn execute(&self, envelope: CommandEnvelope) {
        let CommandEnvelope { observer, command } = envelope;
        let kind = command.kind();
        debug!(observer = %observer, kind, "Executing command");

        let reply = match self.apply(command).await {
            Ok(()) => ServerMessage::SaveSuccess,
            Err(e) => {
                warn!(observer = %observer, kind, error = %e, "Command failed");
                ServerMessage::error(e.to_string())
            }
        };

        if !self.hub.send_to(observer, &reply) {
            debug!(observer = %observer, kind, "Acknowledgement not delivered");
        }
    }

    async fn apply(&self, command: ObserverCommand) -> StorageResult<()> {
        match command {
            ObserverCommand::AssignAlias { identifier, name } => {
                self.store.assign(identifier, name).await
            }
            ObserverCommand::AssignAliasBatch { identifiers, name } => {
                self.store.assign_batch(identifiers, name).await
            }
            ObserverCommand::RemoveAlias { identifier } => {
                let changed = self.store.remove(&identifier).await?;
                if !changed {
                    debug!(identifier = %identifier, "Alias not present");
                }
                Ok(())
            }
            ObserverCommand::RemoveAliasBatch { identifiers } => {
                let changed = self.store.remove_batch(identifiers).await?;
                if !changed {
                    debug!("No alias in batch was present");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use tagbridge_core::{AliasTable, Identifier, Source};
    use tagbridge_storage::StoreConfig;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<AliasStore>,
        hub: Arc<Hub>,
        router: Router,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            AliasStore::open(StoreConfig::new(dir.path().join("data").join("aliases.json")))
                .unwrap(),
        );
        let hub = Arc::new(Hub::new(store.clone(), 16));
        let router = Router::new(hub.clone(), store.clone());
        Fixture {
            dir,
            store,
            hub,
            router,
        }
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn decode(frame: Frame) -> ServerMessage {
        serde_json::from_str(&frame).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            messages.push(decode(frame));
        }
        messages
    }

    fn table(entries: &[(&str, &str)]) -> AliasTable {
        entries
            .iter()
            .map(|(k, v)| (id(k), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_save_broadcasts_then_acks_originator_only() {
        let f = fixture();
        let mut a = f.hub.register().unwrap();
        let mut b = f.hub.register().unwrap();
        drain(&mut a.outbound);
        drain(&mut b.outbound);

        f.router
            .execute(CommandEnvelope::new(
                a.id,
                ObserverCommand::AssignAlias {
                    identifier: id("X1"),
                    name: "Widget".to_string(),
                },
            ))
            .await;

        let update = ServerMessage::aliases_update(table(&[("X1", "Widget")]));
        assert_eq!(drain(&mut a.outbound), vec![update.clone(), ServerMessage::SaveSuccess]);
        assert_eq!(drain(&mut b.outbound), vec![update]);
    }

    #[tokio::test]
    async fn test_batch_is_one_broadcast() {
        let f = fixture();
        let mut a = f.hub.register().unwrap();
        drain(&mut a.outbound);

        f.router
            .execute(CommandEnvelope::new(
                a.id,
                ObserverCommand::AssignAliasBatch {
                    identifiers: vec![id("A"), id("B"), id("C")],
                    name: "Shelf".to_string(),
                },
            ))
            .await;

        let messages = drain(&mut a.outbound);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            ServerMessage::aliases_update(table(&[("A", "Shelf"), ("B", "Shelf"), ("C", "Shelf")]))
        );
    }

    #[tokio::test]
    async fn test_noop_remove_acked_without_broadcast() {
        let f = fixture();
        let mut a = f.hub.register().unwrap();
        let mut b = f.hub.register().unwrap();
        drain(&mut a.outbound);
        drain(&mut b.outbound);

        f.router
            .execute(CommandEnvelope::new(
                a.id,
                ObserverCommand::RemoveAlias {
                    identifier: id("missing"),
                },
            ))
            .await;

        assert_eq!(drain(&mut a.outbound), vec![ServerMessage::SaveSuccess]);
        assert!(drain(&mut b.outbound).is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_acks_error_and_keeps_table() {
        let f = fixture();
        f.store.assign(id("X1"), "Widget").await.unwrap();
        let mut a = f.hub.register().unwrap();
        drain(&mut a.outbound);

        std::fs::remove_dir_all(f.dir.path().join("data")).unwrap();
        f.router
            .execute(CommandEnvelope::new(
                a.id,
                ObserverCommand::AssignAliasBatch {
                    identifiers: vec![id("X1"), id("Y2")],
                    name: "Gadget".to_string(),
                },
            ))
            .await;

        let messages = drain(&mut a.outbound);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], ServerMessage::Error { message } if !message.is_empty()));
        assert_eq!(f.store.snapshot(), table(&[("X1", "Widget")]));
    }

    #[tokio::test]
    async fn test_events_broadcast_to_all() {
        let f = fixture();
        let mut a = f.hub.register().unwrap();
        let mut b = f.hub.register().unwrap();
        drain(&mut a.outbound);
        drain(&mut b.outbound);

        let (event_tx, event_rx) = mpsc::channel(4);
        let (_command_tx, command_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(f.router.run(event_rx, command_rx, shutdown.clone()));

        event_tx
            .send(ObservedEvent::new(id("X1"), Source::Scanner, None))
            .await
            .unwrap();
        let frame = a.outbound.recv().await.unwrap();
        assert_eq!(
            decode(frame),
            ServerMessage::CardRead {
                uid: id("X1"),
                source: Source::Scanner,
                known_name: None
            }
        );
        assert_eq!(decode(b.outbound.recv().await.unwrap()).kind(), "card-read");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_ends_when_inputs_close() {
        let f = fixture();
        let (event_tx, event_rx) = mpsc::channel::<ObservedEvent>(4);
        let (command_tx, command_rx) = mpsc::channel::<CommandEnvelope>(4);
        let task = tokio::spawn(f.router.run(event_rx, command_rx, CancellationToken::new()));

        drop(event_tx);
        drop(command_tx);

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_hub_stops_broadcasts() {
        let f = fixture();
        let store = f.store.clone();
        drop(f.router);
        drop(f.hub);

        store.assign(id("X1"), "Widget").await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
