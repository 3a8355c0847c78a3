//! Socket client integration tests
//!
//! Runs a local echo websocket server: every frame received is recorded and
//! sent back, a "kill" frame closes the connection server-side (to exercise
//! the reconnect path), and handshake count plus Authorization headers are
//! captured for assertions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

use easel::{EaselError, Frame, SocketClient, SocketConfig};

struct TestServer {
    addr: SocketAddr,
    handshakes: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<Frame>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

async fn spawn_echo_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));
    let auth_headers = Arc::new(Mutex::new(Vec::new()));
    let (tx, received) = mpsc::unbounded_channel();

    let hs = Arc::clone(&handshakes);
    let headers = Arc::clone(&auth_headers);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            hs.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            let headers = Arc::clone(&headers);
            tokio::spawn(async move {
                let captured = Arc::clone(&headers);
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    if let Some(auth) = req.headers().get("Authorization") {
                        captured
                            .lock()
                            .unwrap()
                            .push(auth.to_str().unwrap_or("").to_string());
                    }
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) => {
                            let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
                                continue;
                            };
                            if frame.event == "kill" {
                                let _ = ws.close(None).await;
                                break;
                            }
                            let _ = tx.send(frame);
                            let _ = ws.send(Message::Text(text)).await;
                        }
                        Message::Ping(data) => {
                            let _ = ws.send(Message::Pong(data)).await;
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    TestServer {
        addr,
        handshakes,
        received,
        auth_headers,
    }
}

fn fast_config(addr: SocketAddr) -> SocketConfig {
    let mut config = SocketConfig::new(format!("ws://{}", addr));
    config.connect_timeout = Duration::from_secs(5);
    config.reconnect_delay = Duration::from_millis(50);
    config.max_reconnect_delay = Duration::from_millis(200);
    config.max_reconnect_attempts = 5;
    config
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("server channel closed")
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn connect_sends_auth_both_ways() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));

    client.connect("42", "tok-abc").await.unwrap();
    assert!(client.is_connected());

    // Header on the upgrade request.
    assert_eq!(
        server.auth_headers.lock().unwrap().as_slice(),
        ["Bearer tok-abc"]
    );
    // In-band auth frame right after the handshake.
    let frame = next_frame(&mut server.received).await;
    assert_eq!(frame.event, "auth");
    assert_eq!(frame.data["token"], "Bearer tok-abc");
}

#[tokio::test]
async fn concurrent_connects_share_one_handshake() {
    let server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));

    let (a, b) = tokio::join!(client.connect("1", "tok"), client.connect("1", "tok"));
    a.unwrap();
    b.unwrap();
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);

    // Idempotent once connected, too.
    client.connect("1", "tok").await.unwrap();
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queued_operations_flush_in_order_on_connect() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));

    let echoes = Arc::new(AtomicUsize::new(0));
    let echoes_in = Arc::clone(&echoes);

    client.emit("first", json!({"n": 1}));
    client.on(
        "first",
        Arc::new(move |_| {
            echoes_in.fetch_add(1, Ordering::SeqCst);
        }),
    );
    client.emit("second", json!({"n": 2}));

    client.connect("9", "tok").await.unwrap();

    // Server sees auth, then the queued emits in FIFO order.
    assert_eq!(next_frame(&mut server.received).await.event, "auth");
    let first = next_frame(&mut server.received).await;
    assert_eq!(first.event, "first");
    assert_eq!(first.data, json!({"n": 1}));
    assert_eq!(next_frame(&mut server.received).await.event, "second");

    // The queued listener was registered before the emits went out, so the
    // echoed "first" frame reaches it.
    wait_until(|| echoes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn queued_emit_delivered_exactly_once_with_payload_intact() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));

    let payload = json!({"roomId": "r1", "isTyping": true});
    client.emit("typing", payload.clone());
    client.connect("r1", "tok").await.unwrap();

    assert_eq!(next_frame(&mut server.received).await.event, "auth");
    let frame = next_frame(&mut server.received).await;
    assert_eq!(frame.event, "typing");
    assert_eq!(frame.data, payload);

    // Nothing else arrives: the queue was flushed exactly once.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.received.try_recv().is_err());
}

#[tokio::test]
async fn duplicate_listener_fires_once() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));
    client.connect("5", "tok").await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let handler: easel::EventHandler = Arc::new(move |_| {
        calls_in.fetch_add(1, Ordering::SeqCst);
    });

    let h1 = client.on("room-update", Arc::clone(&handler));
    let h2 = client.on("room-update", Arc::clone(&handler));
    assert_eq!(h1, h2);

    client.emit("room-update", json!({"roomId": "r1"}));
    assert_eq!(next_frame(&mut server.received).await.event, "auth");
    assert_eq!(next_frame(&mut server.received).await.event, "room-update");

    wait_until(|| calls.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn off_handle_stops_dispatch() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));
    client.connect("5", "tok").await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let handle = client.on(
        "new-message",
        Arc::new(move |_| {
            calls_in.fetch_add(1, Ordering::SeqCst);
        }),
    );
    client.off_handle(handle);

    client.emit("new-message", json!({"text": "hi"}));
    assert_eq!(next_frame(&mut server.received).await.event, "auth");
    assert_eq!(next_frame(&mut server.received).await.event, "new-message");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disconnect_requires_live_connection() {
    let server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));

    assert!(matches!(
        client.disconnect().await.unwrap_err(),
        EaselError::NotConnected
    ));

    client.connect("3", "tok").await.unwrap();
    client.disconnect().await.unwrap();
    assert!(!client.is_connected());

    // No auto-reconnect after an explicit disconnect.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        client.disconnect().await.unwrap_err(),
        EaselError::NotConnected
    ));
}

#[tokio::test]
async fn transport_drop_reconnects_and_flushes_window_queue() {
    let mut server = spawn_echo_server().await;
    let client = SocketClient::new(fast_config(server.addr));
    client.connect("8", "tok").await.unwrap();
    assert_eq!(next_frame(&mut server.received).await.event, "auth");

    // Ask the server to drop the transport.
    client.emit("kill", Value::Null);
    let c = client.clone();
    wait_until(move || !c.is_connected()).await;

    // Emits during the reconnect window queue normally.
    client.emit("after-drop", json!({"n": 1}));

    let c = client.clone();
    wait_until(move || c.is_connected()).await;
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 2);

    // Re-auth on the new transport, then the queued emit.
    assert_eq!(next_frame(&mut server.received).await.event, "auth");
    assert_eq!(next_frame(&mut server.received).await.event, "after-drop");
}

#[tokio::test]
async fn cancelled_connect_call_does_not_wedge_the_client() {
    // The server answers the websocket handshake only after a delay, so the
    // first caller's timeout fires while the attempt is still outstanding.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    let client = SocketClient::new(fast_config(addr));

    // Caller gives up; the attempt keeps running in the background.
    let cancelled = timeout(Duration::from_millis(50), client.connect("1", "tok")).await;
    assert!(cancelled.is_err());

    // A later caller joins the same attempt and sees it complete.
    client.connect("1", "tok").await.unwrap();
    assert!(client.is_connected());
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn disconnect_during_reconnect_window_stops_reconnecting() {
    let mut server = spawn_echo_server().await;
    let mut config = fast_config(server.addr);
    config.reconnect_delay = Duration::from_millis(500);
    let client = SocketClient::new(config);

    client.connect("8", "tok").await.unwrap();
    assert_eq!(next_frame(&mut server.received).await.event, "auth");

    client.emit("kill", Value::Null);
    let c = client.clone();
    wait_until(move || !c.is_connected()).await;

    // Teardown lands before the first reconnect attempt fires.
    client.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(server.handshakes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        client.disconnect().await.unwrap_err(),
        EaselError::NotConnected
    ));
}

#[tokio::test]
async fn handshake_failure_rejects_all_waiters() {
    // Grab a port with no listener behind it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = fast_config(addr);
    config.connect_timeout = Duration::from_secs(2);
    let client = SocketClient::new(config);

    let (a, b) = tokio::join!(client.connect("1", "tok"), client.connect("1", "tok"));
    assert!(a.is_err());
    assert!(b.is_err());
    assert!(!client.is_connected());
}
