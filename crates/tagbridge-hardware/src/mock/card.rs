//! Mock card service for testing and development.

use crate::{
    HardwareError, Result,
    traits::{CardService, CardServiceEvent},
};
use tokio::sync::mpsc;

/// Mock card service.
///
/// Events pushed through the paired [`MockCardServiceHandle`] are delivered
/// in order by [`CardService::next_event`]. The service ends when every
/// handle has been dropped.
///
/// # Examples
///
/// ```
/// use tagbridge_hardware::mock::MockCardService;
/// use tagbridge_hardware::traits::{CardService, CardServiceEvent};
///
/// #[tokio::main]
/// async fn main() -> tagbridge_hardware::Result<()> {
///     let (mut service, handle) = MockCardService::new();
///
///     handle.attach_reader("ACR122U").await?;
///     handle.present_card("ACR122U", vec![0x04, 0xAB, 0xCD, 0xEF]).await?;
///
///     assert!(matches!(
///         service.next_event().await,
///         Some(CardServiceEvent::ReaderAttached { .. })
///     ));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCardService {
    event_rx: mpsc::Receiver<CardServiceEvent>,
}

impl MockCardService {
    /// Create a new mock card service and its control handle.
    pub fn new() -> (Self, MockCardServiceHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);
        (Self { event_rx }, MockCardServiceHandle { event_tx })
    }
}

impl CardService for MockCardService {
    async fn next_event(&mut self) -> Option<CardServiceEvent> {
        self.event_rx.recv().await
    }
}

/// Handle for driving a [`MockCardService`].
#[derive(Debug, Clone)]
pub struct MockCardServiceHandle {
    event_tx: mpsc::Sender<CardServiceEvent>,
}

impl MockCardServiceHandle {
    /// Simulate a reader being plugged in.
    pub async fn attach_reader(&self, reader: impl Into<String>) -> Result<()> {
        self.send(CardServiceEvent::ReaderAttached {
            reader: reader.into(),
        })
        .await
    }

    /// Simulate a reader being unplugged.
    pub async fn detach_reader(&self, reader: impl Into<String>) -> Result<()> {
        self.send(CardServiceEvent::ReaderDetached {
            reader: reader.into(),
        })
        .await
    }

    /// Simulate a card entering the field of `reader`.
    pub async fn present_card(&self, reader: impl Into<String>, uid: Vec<u8>) -> Result<()> {
        self.send(CardServiceEvent::CardPresented {
            reader: reader.into(),
            uid,
        })
        .await
    }

    /// Simulate a reader-level error.
    pub async fn reader_error(
        &self,
        reader: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<()> {
        self.send(CardServiceEvent::ReaderError {
            reader: reader.into(),
            message: message.into(),
        })
        .await
    }

    /// Simulate a service-level error.
    pub async fn service_error(&self, message: impl Into<String>) -> Result<()> {
        self.send(CardServiceEvent::ServiceError {
            message: message.into(),
        })
        .await
    }

    async fn send(&self, event: CardServiceEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("mock card service"))
    }
}
