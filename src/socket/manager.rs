//! Socket connection manager
//!
//! One lazily-established transport per client. `connect()` de-duplicates
//! concurrent attempts through a shared in-flight handshake; `emit`/`on`/`off`
//! queue while no live connection exists and flush together on the transition
//! into Connected. After a transport drop the manager runs a bounded
//! reconnect loop with capped backoff; an explicit `disconnect()` never
//! reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{http::Request, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::frame::Frame;
use super::listeners::{EventHandler, ListenerHandle, ListenerRegistry};
use super::queue::{PendingOps, Removal};
use crate::config::SocketConfig;
use crate::types::{EaselError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state machine: Disconnected -> Connecting -> Connected.
enum ConnState {
    Disconnected,
    /// An attempt is outstanding; late callers await its shared outcome.
    Connecting(watch::Receiver<AttemptPhase>),
    Connected(Link),
}

#[derive(Debug, Clone)]
enum AttemptPhase {
    Pending,
    Connected,
    Failed(String),
}

/// Live connection bookkeeping.
struct Link {
    id: u64,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// State consulted synchronously by every public operation.
///
/// Guarded by a std mutex and never held across an await, so an operation
/// either lands in the queues captured for a flush or goes straight to the
/// live transport; it can never be stranded between the two.
#[derive(Default)]
struct Shared {
    connected: bool,
    out_tx: Option<mpsc::UnboundedSender<Frame>>,
    pending: PendingOps,
}

struct SocketInner {
    config: SocketConfig,
    registry: ListenerRegistry,
    shared: StdMutex<Shared>,
    state: Mutex<ConnState>,
    next_link_id: AtomicU64,
}

/// Shared real-time client.
///
/// Clone-cheap handle; all clones drive the same transport.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<SocketInner>,
}

impl SocketClient {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                config,
                registry: ListenerRegistry::new(),
                shared: StdMutex::new(Shared::default()),
                state: Mutex::new(ConnState::Disconnected),
                next_link_id: AtomicU64::new(0),
            }),
        }
    }

    /// Establish the transport for a scope (chat room set, user feed, ...).
    ///
    /// Idempotent: already connected returns immediately; an outstanding
    /// attempt is awaited rather than duplicated. On success the pending
    /// queues are flushed before this call returns.
    ///
    /// The attempt itself runs in a spawned task, so a caller that gives up
    /// on this future (a timeout, a select branch) neither aborts the
    /// handshake nor wedges the state machine; the attempt settles on its
    /// own and later callers observe the outcome.
    pub async fn connect(&self, scope_id: &str, access_token: &str) -> Result<()> {
        let rx = {
            let mut state = self.inner.state.lock().await;
            match &*state {
                ConnState::Connected(_) => return Ok(()),
                ConnState::Connecting(rx) => rx.clone(),
                ConnState::Disconnected => {
                    let (tx, rx) = watch::channel(AttemptPhase::Pending);
                    *state = ConnState::Connecting(rx.clone());

                    let client = self.clone();
                    let scope = scope_id.to_string();
                    let token = access_token.to_string();
                    tokio::spawn(async move {
                        let result = client.establish(&scope, &token).await;
                        let mut state = client.inner.state.lock().await;
                        match result {
                            Ok(link) => {
                                *state = ConnState::Connected(link);
                                let _ = tx.send(AttemptPhase::Connected);
                            }
                            Err(e) => {
                                *state = ConnState::Disconnected;
                                let _ = tx.send(AttemptPhase::Failed(e.to_string()));
                            }
                        }
                    });
                    rx
                }
            }
        };

        wait_attempt(rx).await
    }

    /// Tear down the transport. Errors when no live connection exists, and
    /// never auto-reconnects afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        let link = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut *state, ConnState::Disconnected) {
                ConnState::Connected(link) => link,
                other => {
                    *state = other;
                    return Err(EaselError::NotConnected);
                }
            }
        };

        self.inner.close_gate();
        let _ = link.shutdown.send(true);
        let _ = link.task.await;
        info!("Socket disconnected");
        Ok(())
    }

    /// Whether a live transport currently exists. False during a reconnect
    /// window, so operations issued then queue normally.
    pub fn is_connected(&self) -> bool {
        self.inner.lock_shared().connected
    }

    /// Send an event, or queue it for the next flush when not connected.
    /// Repeated emits queue independently and replay in order.
    pub fn emit(&self, event: &str, data: Value) {
        let frame = Frame::new(event, data);
        let mut shared = self.inner.lock_shared();
        if shared.connected {
            if let Some(tx) = &shared.out_tx {
                match tx.send(frame) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(frame)) => {
                        shared.pending.emits.push(frame);
                        return;
                    }
                }
            }
        }
        debug!(%event, "Socket not connected, queueing emit");
        shared.pending.emits.push(frame);
    }

    /// Register a listener; the returned handle removes it again.
    ///
    /// Registering the same `Arc`'d handler twice for one event is
    /// suppressed, at call time or at flush time.
    pub fn on(&self, event: &str, handler: EventHandler) -> ListenerHandle {
        let handle = ListenerHandle::new();
        let mut shared = self.inner.lock_shared();
        if shared.connected {
            drop(shared);
            return self.inner.registry.add(event, handle, handler);
        }
        shared
            .pending
            .registrations
            .push((event.to_string(), handle, handler));
        handle
    }

    /// Remove the listener registered under the handle.
    pub fn off_handle(&self, handle: ListenerHandle) {
        let mut shared = self.inner.lock_shared();
        if shared.connected {
            drop(shared);
            self.inner.registry.remove_handle(handle);
            return;
        }
        shared.pending.removals.push(Removal::Handle(handle));
    }

    /// Remove every listener for an event.
    pub fn off(&self, event: &str) {
        let mut shared = self.inner.lock_shared();
        if shared.connected {
            drop(shared);
            self.inner.registry.remove_event(event);
            return;
        }
        shared.pending.removals.push(Removal::Event(event.to_string()));
    }

    // =========================================================================
    // Domain conveniences (opaque events to the manager itself)
    // =========================================================================

    pub fn join_room(&self, room_id: &str) {
        self.emit("join-room", serde_json::json!({ "roomId": room_id }));
    }

    pub fn leave_room(&self, room_id: &str) {
        self.emit("leave-room", serde_json::json!({ "roomId": room_id }));
    }

    async fn establish(&self, scope_id: &str, access_token: &str) -> Result<Link> {
        let url = self.inner.config.connect_url(scope_id);
        let ws = open_transport(&url, access_token, self.inner.config.connect_timeout).await?;
        info!(%url, "Socket connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let id = self.inner.next_link_id.fetch_add(1, Ordering::SeqCst);

        self.inner.flush_and_open(&out_tx);

        let inner = Arc::clone(&self.inner);
        let token = access_token.to_string();
        let task = tokio::spawn(async move {
            link_loop(inner, id, url, token, ws, out_rx, shutdown_rx).await;
        });

        Ok(Link {
            id,
            shutdown: shutdown_tx,
            task,
        })
    }
}

impl SocketInner {
    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("socket state lock poisoned")
    }

    /// Transition into Connected: capture and replay the pending queues,
    /// then open the gate for direct sends. Runs entirely under the shared
    /// lock, so every operation is either in the captured queues (flushed
    /// exactly once, FIFO within each queue) or sees the open gate.
    fn flush_and_open(&self, out_tx: &mpsc::UnboundedSender<Frame>) {
        let mut shared = self.lock_shared();
        let captured = shared.pending.take();
        if !captured.is_empty() {
            debug!(
                registrations = captured.registrations.len(),
                removals = captured.removals.len(),
                emits = captured.emits.len(),
                "Flushing queued socket operations"
            );
        }

        for (event, handle, handler) in captured.registrations {
            self.registry.add(&event, handle, handler);
        }
        for removal in captured.removals {
            match removal {
                Removal::Handle(handle) => {
                    self.registry.remove_handle(handle);
                }
                Removal::Event(event) => self.registry.remove_event(&event),
            }
        }
        for frame in captured.emits {
            let _ = out_tx.send(frame);
        }

        shared.out_tx = Some(out_tx.clone());
        shared.connected = true;
    }

    /// Leave Connected: operations queue again until the next flush.
    fn close_gate(&self) {
        let mut shared = self.lock_shared();
        shared.connected = false;
        shared.out_tx = None;
    }

    /// Leave Connected and requeue frames that passed the gate but never
    /// reached the wire. Closing the gate and draining happen under one
    /// lock acquisition, so an emit racing the teardown lands either in the
    /// drained channel or in the pending queue, ahead of anything queued
    /// during the reconnect window.
    fn close_gate_and_requeue(&self, out_rx: &mut mpsc::UnboundedReceiver<Frame>) {
        let mut shared = self.lock_shared();
        shared.connected = false;
        shared.out_tx = None;
        while let Ok(frame) = out_rx.try_recv() {
            debug!(event = %frame.event, "Requeueing frame stranded by transport loss");
            shared.pending.emits.push(frame);
        }
    }
}

async fn wait_attempt(mut rx: watch::Receiver<AttemptPhase>) -> Result<()> {
    loop {
        let phase = rx.borrow_and_update().clone();
        match phase {
            AttemptPhase::Pending => {
                if rx.changed().await.is_err() {
                    return Err(EaselError::WebSocket("connect attempt abandoned".into()));
                }
            }
            AttemptPhase::Connected => return Ok(()),
            AttemptPhase::Failed(msg) => return Err(EaselError::WebSocket(msg)),
        }
    }
}

/// Open the websocket with auth sent two ways: an Authorization header on
/// the upgrade request, and an in-band auth frame right after the handshake
/// (for transports that strip upgrade headers).
async fn open_transport(
    url: &str,
    access_token: &str,
    connect_timeout: Duration,
) -> Result<WsStream> {
    let host = url
        .split("//")
        .nth(1)
        .unwrap_or("localhost")
        .split('/')
        .next()
        .unwrap_or("localhost")
        .split('?')
        .next()
        .unwrap_or("localhost");

    let request = Request::builder()
        .uri(url)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .header("Authorization", format!("Bearer {}", access_token))
        .body(())
        .map_err(|e| EaselError::WebSocket(format!("failed to build request: {}", e)))?;

    let (mut ws, _) = timeout(connect_timeout, connect_async_with_config(request, None, false))
        .await
        .map_err(|_| EaselError::ConnectTimeout(connect_timeout))??;

    ws.send(Frame::auth(access_token).into_message()).await?;
    Ok(ws)
}

enum SessionEnd {
    Shutdown,
    TransportDrop,
}

/// Transport task: runs sessions and the bounded reconnect loop between them.
async fn link_loop(
    inner: Arc<SocketInner>,
    id: u64,
    url: String,
    access_token: String,
    mut ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let end = run_session(&inner, &mut ws, &mut out_rx, &mut shutdown).await;
        inner.close_gate_and_requeue(&mut out_rx);

        match end {
            SessionEnd::Shutdown => {
                let _ = ws.close(None).await;
                break;
            }
            SessionEnd::TransportDrop => {}
        }

        if !inner.config.reconnection {
            break;
        }

        let mut delay = inner.config.reconnect_delay;
        let mut reconnected = false;
        for attempt in 1..=inner.config.max_reconnect_attempts {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match open_transport(&url, &access_token, inner.config.connect_timeout).await {
                Ok(new_ws) => {
                    info!(attempt, "Socket reconnected");
                    ws = new_ws;
                    let (out_tx, new_out_rx) = mpsc::unbounded_channel();
                    out_rx = new_out_rx;
                    inner.flush_and_open(&out_tx);
                    reconnected = true;
                    break;
                }
                Err(e) => {
                    warn!(attempt, "Socket reconnect failed: {}", e);
                    delay = (delay * 2).min(inner.config.max_reconnect_delay);
                }
            }
        }
        if !reconnected {
            if *shutdown.borrow() {
                debug!("Socket shut down during reconnect window");
            } else {
                warn!("Socket reconnect attempts exhausted");
            }
            break;
        }
    }

    inner.close_gate();
    // Clear the connection slot unless a newer link already replaced it.
    let mut state = inner.state.lock().await;
    if let ConnState::Connected(link) = &*state {
        if link.id == id {
            *state = ConnState::Disconnected;
        }
    }
    debug!("Socket link loop ended");
}

/// Pump frames both ways until shutdown or transport drop.
async fn run_session(
    inner: &SocketInner,
    ws: &mut WsStream,
    out_rx: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        tokio::select! {
            maybe_frame = out_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        if let Err(e) = ws.send(frame.into_message()).await {
                            error!("Failed to send frame: {}", e);
                            return SessionEnd::TransportDrop;
                        }
                    }
                    None => return SessionEnd::TransportDrop,
                }
            }
            maybe_msg = ws.next() => {
                match maybe_msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed socket: {:?}", frame);
                        return SessionEnd::TransportDrop;
                    }
                    Some(Ok(message)) => {
                        if let Some(frame) = Frame::from_message(&message) {
                            inner.registry.dispatch(&frame.event, &frame.data);
                        }
                    }
                    Some(Err(e)) => {
                        error!("Socket error: {}", e);
                        return SessionEnd::TransportDrop;
                    }
                    None => {
                        info!("Socket stream ended");
                        return SessionEnd::TransportDrop;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}
