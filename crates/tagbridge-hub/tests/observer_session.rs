//! WebSocket sessions against a fully wired hub.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tagbridge_core::constants::COMMAND_CHANNEL_CAPACITY;
use tagbridge_core::{AliasLookup, ObservedEvent};
use tagbridge_hardware::devices::AnyCardService;
use tagbridge_hardware::manager::{AdapterConfig, AdapterManager};
use tagbridge_hardware::mock::MockCardService;
use tagbridge_hub::{Hub, Router, ServerConfig, WsServer};
use tagbridge_storage::{AliasStore, StoreConfig};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct Bridge {
    _dir: TempDir,
    addr: SocketAddr,
    store: Arc<AliasStore>,
    hub: Arc<Hub>,
    events: mpsc::Sender<ObservedEvent>,
    shutdown: CancellationToken,
    server: JoinHandle<tagbridge_hub::HubResult<()>>,
}

async fn start_bridge(max_connections: usize) -> Bridge {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(AliasStore::open(StoreConfig::new(dir.path().join("aliases.json"))).unwrap());
    let hub = Arc::new(Hub::new(store.clone(), 64));
    let router = Router::new(hub.clone(), store.clone());

    let (events, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let shutdown = CancellationToken::new();

    let config = ServerConfig::default()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .max_connections(max_connections);
    let server = WsServer::bind(config, hub.clone(), command_tx).await.unwrap();
    let addr = server.local_addr().unwrap();

    tokio::spawn(router.run(event_rx, command_rx, shutdown.clone()));
    let server = tokio::spawn(server.run(shutdown.clone()));

    Bridge {
        _dir: dir,
        addr,
        store,
        hub,
        events,
        shutdown,
        server,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_quiet(client: &mut Client) {
    let next = tokio::time::timeout(QUIET_PERIOD, client.next()).await;
    assert!(next.is_err(), "unexpected message: {:?}", next);
}

#[tokio::test]
async fn test_initial_snapshot_sent_once() {
    let bridge = start_bridge(10).await;
    bridge
        .store
        .assign("X1".parse().unwrap(), "Widget")
        .await
        .unwrap();

    let mut client = connect(bridge.addr).await;

    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {"X1": "Widget"}})
    );
    assert_quiet(&mut client).await;
}

#[tokio::test]
async fn test_change_reaches_everyone_ack_reaches_sender() {
    let bridge = start_bridge(10).await;
    let mut a = connect(bridge.addr).await;
    let mut b = connect(bridge.addr).await;
    recv(&mut a).await;
    recv(&mut b).await;

    send(&mut a, json!({"type": "save-alias", "uid": "X1", "name": "Widget"})).await;

    let update = json!({"type": "aliases-update", "data": {"X1": "Widget"}});
    assert_eq!(recv(&mut a).await, update);
    assert_eq!(recv(&mut a).await, json!({"type": "save-success"}));
    assert_eq!(recv(&mut b).await, update);
    assert_quiet(&mut b).await;
}

#[tokio::test]
async fn test_batch_save_and_delete() {
    let bridge = start_bridge(10).await;
    let mut client = connect(bridge.addr).await;
    recv(&mut client).await;

    send(
        &mut client,
        json!({"type": "save-batch-alias", "uids": ["A", "B"], "name": "Shelf"}),
    )
    .await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {"A": "Shelf", "B": "Shelf"}})
    );
    assert_eq!(recv(&mut client).await["type"], "save-success");

    send(&mut client, json!({"type": "delete-batch-alias", "uids": ["A", "Z"]})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {"B": "Shelf"}})
    );
    assert_eq!(recv(&mut client).await["type"], "save-success");

    send(&mut client, json!({"type": "delete-alias", "uid": "B"})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {}})
    );
    assert_eq!(recv(&mut client).await["type"], "save-success");
    assert!(bridge.store.is_empty());
}

#[tokio::test]
async fn test_malformed_input_keeps_connection() {
    let bridge = start_bridge(10).await;
    let mut client = connect(bridge.addr).await;
    recv(&mut client).await;

    client
        .send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();
    send(&mut client, json!({"type": "launch-rockets"})).await;
    send(&mut client, json!({"type": "save-batch-alias", "uids": [], "name": "x"})).await;
    send(&mut client, json!({"type": "save-alias", "uid": "X1"})).await;
    assert_quiet(&mut client).await;

    send(&mut client, json!({"type": "save-alias", "uid": "X1", "name": "Widget"})).await;
    assert_eq!(recv(&mut client).await["type"], "aliases-update");
    assert_eq!(recv(&mut client).await["type"], "save-success");
}

#[tokio::test]
async fn test_observed_events_broadcast() {
    let bridge = start_bridge(10).await;
    let mut a = connect(bridge.addr).await;
    let mut b = connect(bridge.addr).await;
    recv(&mut a).await;
    recv(&mut b).await;

    bridge
        .events
        .send(ObservedEvent::new(
            "9780306406157".parse().unwrap(),
            tagbridge_core::Source::Scanner,
            None,
        ))
        .await
        .unwrap();

    let expected = json!({
        "type": "card-read",
        "uid": "9780306406157",
        "source": "scanner",
        "knownName": null
    });
    assert_eq!(recv(&mut a).await, expected);
    assert_eq!(recv(&mut b).await, expected);
}

#[tokio::test]
async fn test_saved_name_attached_to_next_card_read() {
    let bridge = start_bridge(10).await;

    let (card, card_handle) = MockCardService::new();
    let mut manager = AdapterManager::new(AdapterConfig {
        scanner_enabled: false,
        ..AdapterConfig::default()
    });
    manager.register_card_service(AnyCardService::Mock(card));
    let lookup: Arc<dyn AliasLookup> = bridge.store.clone();
    let mut adapters = manager.start(lookup);
    let mut observations = adapters.take_events().unwrap();
    let events = bridge.events.clone();
    tokio::spawn(async move {
        while let Some(event) = observations.recv().await {
            if events.send(event).await.is_err() {
                break;
            }
        }
    });

    let mut client = connect(bridge.addr).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {}})
    );

    send(&mut client, json!({"type": "save-alias", "uid": "A1B2C3", "name": "Widget"})).await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "aliases-update", "data": {"A1B2C3": "Widget"}})
    );
    assert_eq!(recv(&mut client).await["type"], "save-success");

    card_handle.attach_reader("ACR122U").await.unwrap();
    card_handle
        .present_card("ACR122U", vec![0xa1, 0xb2, 0xc3])
        .await
        .unwrap();

    assert_eq!(
        recv(&mut client).await,
        json!({"type": "card-read", "uid": "A1B2C3", "source": "card", "knownName": "Widget"})
    );

    adapters.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_unregisters_observer() {
    let bridge = start_bridge(10).await;
    let mut client = connect(bridge.addr).await;
    recv(&mut client).await;
    assert_eq!(bridge.hub.observer_count(), 1);

    client.close(None).await.unwrap();

    tokio::time::timeout(RECV_TIMEOUT, async {
        while bridge.hub.observer_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("observer still registered");
}

#[tokio::test]
async fn test_connection_limit() {
    let bridge = start_bridge(1).await;
    let mut first = connect(bridge.addr).await;
    recv(&mut first).await;

    let second = connect_async(format!("ws://{}", bridge.addr)).await;

    assert!(second.is_err());
    assert_eq!(bridge.hub.observer_count(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_server() {
    let bridge = start_bridge(10).await;
    let mut client = connect(bridge.addr).await;
    recv(&mut client).await;

    bridge.shutdown.cancel();
    bridge.server.await.unwrap().unwrap();

    let next = tokio::time::timeout(RECV_TIMEOUT, client.next()).await.unwrap();
    assert!(!matches!(next, Some(Ok(Message::Text(_)))));
}
