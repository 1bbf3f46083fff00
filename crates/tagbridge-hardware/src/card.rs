//! Contactless card reader adapter.
//!
//! Consumes [`CardServiceEvent`]s and turns every presented card into an
//! [`ObservedEvent`] keyed by the uppercase hex rendering of its UID. Reader
//! and service errors are logged; they never stop the adapter.

use crate::Result;
use crate::traits::{CardService, CardServiceEvent};
use std::collections::BTreeSet;
use std::sync::Arc;
use tagbridge_core::{AliasLookup, Identifier, ObservedEvent, Source};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Card reader adapter.
pub struct CardAdapter<S: CardService> {
    service: S,
    lookup: Arc<dyn AliasLookup>,
    events: mpsc::Sender<ObservedEvent>,
    readers: BTreeSet<String>,
}

impl<S: CardService> CardAdapter<S> {
    pub fn new(
        service: S,
        lookup: Arc<dyn AliasLookup>,
        events: mpsc::Sender<ObservedEvent>,
    ) -> Self {
        Self {
            service,
            lookup,
            events,
            readers: BTreeSet::new(),
        }
    }

    /// Readers currently attached, as last reported by the service.
    pub fn readers(&self) -> impl Iterator<Item = &str> {
        self.readers.iter().map(String::as_str)
    }

    /// Run until `shutdown` is cancelled, the service ends, or the event
    /// receiver is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Card adapter started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.service.next_event() => event,
            };

            let Some(event) = event else {
                warn!("Card service ended");
                break;
            };

            if !self.handle(event).await {
                debug!("Event receiver dropped, stopping card adapter");
                break;
            }
        }

        info!(readers = self.readers.len(), "Card adapter stopped");
        Ok(())
    }

    /// Process one service event. Returns `false` once nobody listens for
    /// observations anymore.
    async fn handle(&mut self, event: CardServiceEvent) -> bool {
        match event {
            CardServiceEvent::ReaderAttached { reader } => {
                info!(reader = %reader, "Card reader attached");
                self.readers.insert(reader);
            }
            CardServiceEvent::ReaderDetached { reader } => {
                info!(reader = %reader, "Card reader detached");
                self.readers.remove(&reader);
            }
            CardServiceEvent::CardPresented { reader, uid } => {
                let identifier = match Identifier::from_card_uid(&uid) {
                    Ok(identifier) => identifier,
                    Err(e) => {
                        warn!(reader = %reader, error = %e, "Ignoring card without UID");
                        return true;
                    }
                };

                let known_name = self.lookup.lookup(&identifier);
                info!(
                    reader = %reader,
                    identifier = %identifier,
                    known_name = known_name.as_deref().unwrap_or(""),
                    "Card read"
                );

                let event = ObservedEvent::new(identifier, Source::Card, known_name);
                return self.events.send(event).await.is_ok();
            }
            CardServiceEvent::ReaderError { reader, message } => {
                warn!(reader = %reader, error = %message, "Card reader error");
            }
            CardServiceEvent::ServiceError { message } => {
                error!(error = %message, "Card service error");
            }
        }
        true
    }
}
