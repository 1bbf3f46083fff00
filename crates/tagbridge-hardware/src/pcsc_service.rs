//! PC/SC card service.
//!
//! A dedicated thread blocks in `SCardGetStatusChange` and translates reader
//! plug/unplug and card insertion into [`CardServiceEvent`]s. Readers are
//! discovered through the PnP pseudo-reader, so any number of them may come
//! and go while the service runs. The UID is fetched with the standard
//! `FF CA 00 00 00` GET DATA APDU.

use crate::traits::{CardService, CardServiceEvent};
use crate::{HardwareError, Result};
use pcsc::{Context, MAX_BUFFER_SIZE, PNP_NOTIFICATION, Protocols, ReaderState, Scope, ShareMode, State};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tagbridge_core::constants::GET_UID_APDU;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Upper bound on a single status wait, so shutdown is noticed promptly.
const STATUS_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a resource manager failure before trying again.
const SERVICE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Card service backed by the PC/SC resource manager.
#[derive(Debug)]
pub struct PcscCardService {
    event_rx: mpsc::Receiver<CardServiceEvent>,
    stop: Arc<AtomicBool>,
}

impl PcscCardService {
    /// Connect to the resource manager and start watching readers.
    ///
    /// # Errors
    ///
    /// Returns an error if no PC/SC service is running on the host.
    pub fn start() -> Result<Self> {
        let context = Context::establish(Scope::User)
            .map_err(|e| HardwareError::initialization_failed(format!("PC/SC: {}", e)))?;

        let (event_tx, event_rx) = mpsc::channel(32);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        std::thread::Builder::new()
            .name("pcsc-monitor".to_string())
            .spawn(move || monitor(context, event_tx, thread_stop))?;

        info!("PC/SC card service started");
        Ok(Self { event_rx, stop })
    }
}

impl Drop for PcscCardService {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl CardService for PcscCardService {
    async fn next_event(&mut self) -> Option<CardServiceEvent> {
        self.event_rx.recv().await
    }
}

fn reader_name(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}

fn monitor(mut context: Context, event_tx: mpsc::Sender<CardServiceEvent>, stop: Arc<AtomicBool>) {
    let send = |event: CardServiceEvent| event_tx.blocking_send(event).is_ok();
    let mut names_buf = [0u8; 2048];
    let mut states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];

    while !stop.load(Ordering::Relaxed) {
        let mut detached = Vec::new();
        states.retain(|state| {
            let gone = state.name() != PNP_NOTIFICATION()
                && state
                    .event_state()
                    .intersects(State::UNKNOWN | State::IGNORE);
            if gone {
                detached.push(reader_name(state.name()));
            }
            !gone
        });
        for reader in detached {
            if !send(CardServiceEvent::ReaderDetached { reader }) {
                return;
            }
        }

        let names: Vec<CString> = match context.list_readers(&mut names_buf) {
            Ok(names) => names.map(CStr::to_owned).collect(),
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => {
                if !send(CardServiceEvent::ServiceError {
                    message: e.to_string(),
                }) {
                    return;
                }
                std::thread::sleep(SERVICE_RETRY_DELAY);
                if service_lost(&e) && !reestablish(&mut context, &mut states, &send) {
                    return;
                }
                continue;
            }
        };

        for name in names {
            if !states.iter().any(|state| state.name() == name.as_c_str()) {
                let reader = reader_name(&name);
                states.push(ReaderState::new(name, State::UNAWARE));
                if !send(CardServiceEvent::ReaderAttached { reader }) {
                    return;
                }
            }
        }

        for state in &mut states {
            state.sync_current_state();
        }

        match context.get_status_change(STATUS_POLL_TIMEOUT, &mut states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => continue,
            Err(e) => {
                if !send(CardServiceEvent::ServiceError {
                    message: e.to_string(),
                }) {
                    return;
                }
                std::thread::sleep(SERVICE_RETRY_DELAY);
                if service_lost(&e) && !reestablish(&mut context, &mut states, &send) {
                    return;
                }
                continue;
            }
        }

        for state in &states {
            if state.name() == PNP_NOTIFICATION() {
                continue;
            }
            let arrived = state.event_state().contains(State::PRESENT)
                && !state.current_state().contains(State::PRESENT);
            if !arrived {
                continue;
            }

            let reader = reader_name(state.name());
            let event = match read_uid(&context, state.name()) {
                Ok(uid) => CardServiceEvent::CardPresented { reader, uid },
                Err(e) => CardServiceEvent::ReaderError {
                    reader,
                    message: e.to_string(),
                },
            };
            if !send(event) {
                return;
            }
        }
    }

    debug!("PC/SC monitor stopped");
}

/// Whether `error` means the context handle is dead rather than a reader
/// misbehaving. A restarted `pcscd` invalidates every existing context.
fn service_lost(error: &pcsc::Error) -> bool {
    matches!(
        error,
        pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::InvalidHandle
    )
}

/// Swap in a fresh context after the resource manager went away.
///
/// Readers tracked through the old context are reported detached; the PnP
/// scan attaches them again. Returns `false` once the receiver is gone.
fn reestablish(
    context: &mut Context,
    states: &mut Vec<ReaderState>,
    send: &impl Fn(CardServiceEvent) -> bool,
) -> bool {
    let fresh = match Context::establish(Scope::User) {
        Ok(fresh) => fresh,
        Err(e) => {
            warn!(error = %e, "PC/SC service still unavailable");
            return true;
        }
    };
    info!("PC/SC context re-established");
    *context = fresh;

    let readers: Vec<String> = states
        .iter()
        .filter(|state| state.name() != PNP_NOTIFICATION())
        .map(|state| reader_name(state.name()))
        .collect();
    states.clear();
    states.push(ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE));

    readers
        .into_iter()
        .all(|reader| send(CardServiceEvent::ReaderDetached { reader }))
}

fn read_uid(context: &Context, reader: &CStr) -> Result<Vec<u8>> {
    let card = context
        .connect(reader, ShareMode::Shared, Protocols::ANY)
        .map_err(|e| HardwareError::communication(format!("connect failed: {}", e)))?;

    let mut response_buf = [0u8; MAX_BUFFER_SIZE];
    let response = card
        .transmit(&GET_UID_APDU, &mut response_buf)
        .map_err(|e| HardwareError::communication(format!("transmit failed: {}", e)))?;

    parse_uid_response(response)
}

/// Split a GET UID response into the UID and check the `90 00` status word.
fn parse_uid_response(response: &[u8]) -> Result<Vec<u8>> {
    match response.split_last_chunk::<2>() {
        Some((uid, [0x90, 0x00])) if !uid.is_empty() => Ok(uid.to_vec()),
        _ => Err(HardwareError::invalid_data(format!(
            "unexpected GET UID response {:02X?}",
            response
        ))),
    }
}
