use common::{EventPublisher, PriceUpdate, PushEvent, SignalChanged, PRICE_UPDATE, SIGNAL_UPDATE};
use realtime::{NotifierHub, NotifierServer, RealtimeClient, PRICE_TICK};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (Arc<NotifierHub>, mpsc::Receiver<common::Envelope>, String) {
    let hub = Arc::new(NotifierHub::new(64));
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());

    let server = NotifierServer::new(hub.clone(), inbound_tx, Duration::from_secs(30));
    tokio::spawn(server.serve(listener));
    (hub, inbound_rx, url)
}

#[tokio::test]
async fn test_push_reaches_registered_handler() {
    let (hub, _inbound, url) = start_server().await;
    let client = RealtimeClient::new(url);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = client.on(PRICE_UPDATE, move |data| {
        let _ = tx.send(data.clone());
    });
    client.connect().await.unwrap();

    let id = Uuid::new_v4();
    hub.publish(PushEvent::PriceUpdate(PriceUpdate {
        id,
        current_price: dec!(24110.5),
        pnl: dec!(525),
    }));

    let data = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data["id"], json!(id));
    assert_eq!(data["currentPrice"], json!(24110.5));
    assert_eq!(data["pnl"], json!(525.0));
}

#[tokio::test]
async fn test_client_send_reaches_inbound_channel() {
    let (_hub, mut inbound, url) = start_server().await;
    let client = RealtimeClient::new(url);
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    let id = Uuid::new_v4();
    client.send(PRICE_TICK, json!({ "id": id, "price": 101.25 })).await.unwrap();

    let envelope = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.event_type, PRICE_TICK);
    assert_eq!(envelope.data["price"], json!(101.25));
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (hub, _inbound, url) = start_server().await;
    let client = RealtimeClient::new(url);

    client.connect().await.unwrap();
    client.connect().await.unwrap();

    assert_eq!(hub.receiver_count(), 1);
}

#[tokio::test]
async fn test_unsubscribed_handler_stops_receiving() {
    let (hub, _inbound, url) = start_server().await;
    let client = RealtimeClient::new(url);

    let (removed_tx, mut removed_rx) = mpsc::unbounded_channel();
    let (kept_tx, mut kept_rx) = mpsc::unbounded_channel();
    let removed = client.on(SIGNAL_UPDATE, move |_| {
        let _ = removed_tx.send(());
    });
    let _kept = client.on(SIGNAL_UPDATE, move |_| {
        let _ = kept_tx.send(());
    });
    client.connect().await.unwrap();

    assert!(removed.unsubscribe());
    hub.publish(PushEvent::SignalUpdate(SignalChanged::default()));

    timeout(WAIT, kept_rx.recv()).await.unwrap().unwrap();
    assert!(removed_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnect_then_send_fails() {
    let (_hub, _inbound, url) = start_server().await;
    let client = RealtimeClient::new(url);
    client.connect().await.unwrap();

    client.disconnect().await;
    assert!(!client.is_connected().await);
    assert!(client.send(PRICE_TICK, json!({})).await.is_err());
}
