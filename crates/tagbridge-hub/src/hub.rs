//! Observer registry and fan-out.
//!
//! Each observer owns a bounded queue of encoded frames drained by its
//! connection's writer. Broadcasting never waits: a full queue means the
//! observer is too slow and the frame is skipped for it, a closed queue
//! means the observer is gone and it is dropped from the registry.

use crate::error::HubResult;
use crate::protocol::{Frame, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tagbridge_storage::AliasStore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Identity of one connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Queue end handed to a newly registered observer.
#[derive(Debug)]
pub struct Registration {
    pub id: ObserverId,
    pub outbound: mpsc::Receiver<Frame>,
}

/// Registry of connected observers.
pub struct Hub {
    store: Arc<AliasStore>,
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Frame>>>,
    queue_capacity: usize,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("observers", &self.observer_count())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl Hub {
    /// Create a hub serving snapshots of `store`.
    ///
    /// `queue_capacity` is the number of frames buffered per observer.
    pub fn new(store: Arc<AliasStore>, queue_capacity: usize) -> Self {
        Self {
            store,
            observers: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add an observer.
    ///
    /// The current alias table is already queued when this returns, ahead
    /// of any broadcast the observer will receive.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be encoded.
    pub fn register(&self) -> HubResult<Registration> {
        let id = ObserverId::new();
        let (tx, outbound) = mpsc::channel(self.queue_capacity);

        let mut observers = self.lock();
        // Taken under the registry lock so no broadcast can slip in between.
        let snapshot = ServerMessage::aliases_update(self.store.snapshot()).encode()?;
        // The queue is fresh, so this only fails if capacity were zero.
        if tx.try_send(snapshot).is_err() {
            error!(observer = %id, "Failed to queue initial snapshot");
        }
        observers.insert(id, tx);
        let total = observers.len();
        drop(observers);

        info!(observer = %id, total, "Observer registered");
        Ok(Registration { id, outbound })
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unregister(&self, id: ObserverId) {
        let mut observers = self.lock();
        if observers.remove(&id).is_some() {
            info!(observer = %id, total = observers.len(), "Observer unregistered");
        }
    }

    /// Queue `message` for every observer. Returns how many accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(kind = message.kind(), error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let mut observers = self.lock();
        let mut delivered = 0;
        observers.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(observer = %id, kind = message.kind(), "Observer queue full, skipping message");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(observer = %id, "Observer gone, removing");
                false
            }
        });

        trace!(kind = message.kind(), delivered, total = observers.len(), "Broadcast");
        delivered
    }

    /// Queue `message` for one observer. Returns whether it was accepted.
    pub fn send_to(&self, id: ObserverId, message: &ServerMessage) -> bool {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(observer = %id, kind = message.kind(), error = %e, "Failed to encode message");
                return false;
            }
        };

        let mut observers = self.lock();
        let Some(tx) = observers.get(&id) else {
            debug!(observer = %id, kind = message.kind(), "Observer not connected");
            return false;
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(observer = %id, kind = message.kind(), "Observer queue full, skipping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                observers.remove(&id);
                false
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_registered(&self, id: ObserverId) -> bool {
        self.lock().contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, mpsc::Sender<Frame>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
