use std::time::Duration;

use tokio::sync::mpsc;

use arunika::application::realtime::{ConnectionHandle, ConnectionId, Hub, HubError, OutboundFrame};
use arunika::domain::DeviceId;

fn start_hub() -> Hub {
    let (hub, worker) = Hub::new(8);
    tokio::spawn(worker.run());
    hub
}

fn handle(device: &str) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
    let (sender, receiver) = mpsc::channel(4);
    (
        ConnectionHandle::new(ConnectionId::new(), DeviceId::new(device), sender),
        receiver,
    )
}

async fn next_frame(receiver: &mut mpsc::Receiver<OutboundFrame>) -> Option<OutboundFrame> {
    tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn given_two_devices_when_registered_then_both_counted() {
    let hub = start_hub();
    let (first, _rx1) = handle("doll-a");
    let (second, _rx2) = handle("doll-b");

    hub.register(first).await.unwrap();
    hub.register(second).await.unwrap();

    assert_eq!(hub.connected_count().await.unwrap(), 2);
    assert!(hub.is_connected(&DeviceId::new("doll-a")).await.unwrap());
    assert!(!hub.is_connected(&DeviceId::new("doll-c")).await.unwrap());
}

#[tokio::test]
async fn given_device_reconnects_when_registered_then_previous_connection_closed() {
    let hub = start_hub();
    let (old, mut old_rx) = handle("doll-a");
    let (new, mut new_rx) = handle("doll-a");

    hub.register(old).await.unwrap();
    hub.register(new).await.unwrap();

    assert_eq!(next_frame(&mut old_rx).await, Some(OutboundFrame::Close));
    assert_eq!(hub.connected_count().await.unwrap(), 1);
    assert!(new_rx.try_recv().is_err());
}

#[tokio::test]
async fn given_superseded_connection_when_it_unregisters_then_current_one_kept() {
    let hub = start_hub();
    let (old, _old_rx) = handle("doll-a");
    let old_id = old.connection_id;
    let (new, mut new_rx) = handle("doll-a");

    hub.register(old).await.unwrap();
    hub.register(new).await.unwrap();
    hub.unregister(DeviceId::new("doll-a"), old_id).await.unwrap();

    assert!(hub.is_connected(&DeviceId::new("doll-a")).await.unwrap());
    assert!(new_rx.try_recv().is_err());
}

#[tokio::test]
async fn given_current_connection_when_unregistered_then_removed_and_closed() {
    let hub = start_hub();
    let (current, mut rx) = handle("doll-a");
    let id = current.connection_id;

    hub.register(current).await.unwrap();
    hub.unregister(DeviceId::new("doll-a"), id).await.unwrap();

    assert_eq!(hub.connected_count().await.unwrap(), 0);
    assert_eq!(next_frame(&mut rx).await, Some(OutboundFrame::Close));
}

#[tokio::test]
async fn given_stopped_worker_when_querying_then_stopped_error() {
    let (hub, worker) = Hub::new(1);
    drop(worker);

    assert!(matches!(hub.connected_count().await, Err(HubError::Stopped)));
}
