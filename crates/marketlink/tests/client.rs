//! Integration tests for the full client stack against a real WebSocket
//! server.
//!
//! The test server speaks the marketlink frame protocol just far enough
//! to accept or reject a handshake, push events, and report what the
//! client sent back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use marketlink::prelude::*;
use marketlink_protocol::{ClientFrame, ServerFrame};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// What the test server does with a handshake.
#[derive(Clone)]
enum Verdict {
    Accept,
    Reject(&'static str),
}

/// Spawns a server that handles connections one after another. Frames the
/// clients send after the handshake are forwarded on the returned channel;
/// frames pushed into the returned sender go to the current client.
async fn spawn_server(
    verdict: Verdict,
) -> (
    String,
    mpsc::UnboundedSender<ServerFrame>,
    mpsc::UnboundedReceiver<ClientFrame>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel::<ClientFrame>();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };

            // Handshake
            let Some(Ok(first)) = ws.next().await else {
                continue;
            };
            let hello: ClientFrame =
                serde_json::from_slice(&first.into_data()).unwrap();
            let _ = seen_tx.send(hello);
            let reply = match &verdict {
                Verdict::Accept => ServerFrame::HandshakeAck {
                    session_id: "s-1".into(),
                    server_time: 0,
                },
                Verdict::Reject(reason) => ServerFrame::Rejected {
                    reason: reason.to_string(),
                },
            };
            let text = serde_json::to_string(&reply).unwrap();
            if ws.send(Message::Text(text.into())).await.is_err() {
                continue;
            }
            if matches!(verdict, Verdict::Reject(_)) {
                let _ = ws.close(None).await;
                continue;
            }

            // Session
            loop {
                tokio::select! {
                    msg = ws.next() => match msg {
                        Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                            let frame: ClientFrame =
                                serde_json::from_slice(&msg.into_data()).unwrap();
                            let _ = seen_tx.send(frame);
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                    Some(frame) = push_rx.recv() => {
                        let text = serde_json::to_string(&frame).unwrap();
                        if ws.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    (endpoint, push_tx, seen_rx)
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<ClientFrame>) -> ClientFrame {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("server should see a frame")
        .expect("server task should be running")
}

fn courier() -> Credentials {
    Credentials::new("jwt-courier", "courier-7", Role::Delivery)
}

#[tokio::test]
async fn test_client_connects_and_exchanges_events() {
    let (endpoint, push, mut seen) = spawn_server(Verdict::Accept).await;
    let client = MarketlinkClient::builder().endpoint(&endpoint).build();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handlers = EventHandlers::new().on_event(move |name, data| {
        sink.lock().unwrap().push((name.to_string(), data.clone()));
    });

    let (_ticket, handle) = client.activate(courier(), handlers).await;
    tokio::time::timeout(WAIT, handle.wait_for(ConnectionStatus::Connected))
        .await
        .expect("should connect in time")
        .expect("should connect");

    match next_seen(&mut seen).await {
        ClientFrame::Handshake { user_id, role, token, .. } => {
            assert_eq!(user_id.as_str(), "courier-7");
            assert_eq!(role, Role::Delivery);
            assert_eq!(token, "jwt-courier");
        }
        other => panic!("expected handshake, got {other:?}"),
    }

    // --- Client → server ---
    handle
        .emit("location:update", &serde_json::json!({"lat": 12.9, "lng": 77.6}))
        .unwrap();
    match next_seen(&mut seen).await {
        ClientFrame::Event { name, data } => {
            assert_eq!(name, "location:update");
            assert_eq!(data["lat"], 12.9);
        }
        other => panic!("expected event, got {other:?}"),
    }

    // --- Server → client ---
    push.send(ServerFrame::Event {
        name: "order:assigned".into(),
        data: serde_json::json!({"order_id": "o-42"}),
    })
    .unwrap();
    tokio::time::timeout(WAIT, async {
        while received.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("event should arrive");

    let events = received.lock().unwrap().clone();
    assert_eq!(events[0].0, "order:assigned");
    assert_eq!(events[0].1["order_id"], "o-42");
}

#[tokio::test]
async fn test_client_teardown_sends_goodbye() {
    let (endpoint, _push, mut seen) = spawn_server(Verdict::Accept).await;
    let client = MarketlinkClient::builder()
        .endpoint(&endpoint)
        .teardown_delay(Duration::from_millis(20))
        .build();

    let (ticket, handle) = client.activate(courier(), EventHandlers::new()).await;
    tokio::time::timeout(WAIT, handle.wait_for(ConnectionStatus::Connected))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(next_seen(&mut seen).await, ClientFrame::Handshake { .. }));

    assert!(client.deactivate(ticket).await.unwrap());
    assert!(client.handle().await.is_none());

    assert!(matches!(
        next_seen(&mut seen).await,
        ClientFrame::Disconnect { .. }
    ));
}

#[tokio::test]
async fn test_client_rejected_handshake_reports_refused() {
    let (endpoint, _push, _seen) =
        spawn_server(Verdict::Reject("invalid token")).await;
    let client = MarketlinkClient::builder()
        .endpoint(&endpoint)
        .reconnection(false)
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handlers = EventHandlers::new().on_error(move |err| {
        let _ = tx.send(err.clone());
    });

    let (_ticket, handle) = client.activate(courier(), handlers).await;
    let err = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("error should be reported")
        .unwrap();

    assert_eq!(err, ConnectionError::Refused("invalid token".into()));
    tokio::time::timeout(WAIT, handle.wait_for(ConnectionStatus::Disconnected))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_client_unreachable_endpoint_reports_refused() {
    // Bind and drop so the port is (almost certainly) closed.
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let client = MarketlinkClient::builder()
        .endpoint(&endpoint)
        .reconnection(false)
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handlers = EventHandlers::new().on_error(move |err| {
        let _ = tx.send(err.clone());
    });
    client.activate(courier(), handlers).await;

    let err = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(matches!(err, ConnectionError::Refused(_)), "got {err:?}");
}
