//! Native/Desktop driver using tokio-tungstenite.

use std::collections::VecDeque;
use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use campusnet_shared::{Channel, ClientFrame};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant, Interval, Sleep};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use super::{callback, Callback, ConnectionState, SharedCallback, WsContext};
use crate::ws::lifecycle::{Lifecycle, LifecycleAction};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Frame(String),
    Shutdown,
}

/// One running socket task.
struct Run {
    alive: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Exclusive owner of one channel's socket (Native implementation).
///
/// The socket lives in a background tokio task; the handle only talks to it
/// through a queue. Closing or dropping the handle stops the task: pending
/// timers are cancelled and no callback runs for this handle afterwards.
pub struct ConnectionHandle {
    channel: Option<Channel>,
    ctx: WsContext,
    on_frame: SharedCallback<Value>,
    on_state: Option<SharedCallback<ConnectionState>>,
    state: Arc<watch::Sender<ConnectionState>>,
    run: Option<Run>,
}

impl ConnectionHandle {
    /// Open `channel`. With `None` the handle stays idle and never touches the
    /// network. Must be called from within a tokio runtime.
    pub fn open(
        channel: Option<Channel>,
        ctx: WsContext,
        on_frame: impl Callback<Value> + 'static,
    ) -> Self {
        Self::start(channel, ctx, callback(on_frame), None)
    }

    /// Like [`ConnectionHandle::open`], also reporting every state change.
    pub fn open_observed(
        channel: Option<Channel>,
        ctx: WsContext,
        on_frame: impl Callback<Value> + 'static,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self::start(channel, ctx, callback(on_frame), Some(callback(on_state)))
    }

    pub(crate) fn start(
        channel: Option<Channel>,
        ctx: WsContext,
        on_frame: SharedCallback<Value>,
        on_state: Option<SharedCallback<ConnectionState>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let mut handle = Self {
            channel,
            ctx,
            on_frame,
            on_state,
            state: Arc::new(state),
            run: None,
        };
        handle.spawn_run();
        handle
    }

    fn spawn_run(&mut self) {
        let Some(channel) = self.channel else {
            crate::log_debug!("[ws:-] No channel, staying idle");
            return;
        };
        let alive = Arc::new(AtomicBool::new(true));
        let (outbound, rx) = mpsc::unbounded_channel();
        let task = SocketTask {
            channel,
            ctx: self.ctx.clone(),
            lifecycle: Lifecycle::new(
                channel.path(),
                self.ctx.reconnect.clone(),
                self.ctx.keepalive,
            ),
            on_frame: self.on_frame.clone(),
            on_state: self.on_state.clone(),
            state: self.state.clone(),
            alive: alive.clone(),
        };
        tokio::spawn(task.run(rx));
        self.run = Some(Run { alive, outbound });
    }

    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// Send a frame. Silently dropped unless the socket is open.
    pub fn send(&self, frame: &ClientFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => self.send_text(json),
            Err(e) => crate::log_error!("Serialize failed: {}", e),
        }
    }

    /// Send an arbitrary JSON frame. Silently dropped unless the socket is open.
    pub fn send_value(&self, value: &Value) {
        self.send_text(value.to_string());
    }

    fn send_text(&self, json: String) {
        let Some(run) = &self.run else {
            return;
        };
        if !self.is_connected() {
            crate::log_debug!("[ws:{}] Not connected, dropping frame", self.label());
            return;
        }
        let _ = run.outbound.send(Outbound::Frame(json));
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch the connection state. The receiver outlives retargets.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Switch to another channel: the current socket is torn down and a new
    /// one opened with fresh counters. No-op for the same channel.
    pub fn retarget(&mut self, channel: Option<Channel>) {
        if channel == self.channel {
            return;
        }
        self.close();
        self.channel = channel;
        self.spawn_run();
    }

    /// Tear down. Idempotent.
    pub fn close(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.alive.store(false, Ordering::SeqCst);
        let _ = run.outbound.send(Outbound::Shutdown);
        let previous = self.state.send_replace(ConnectionState::Idle);
        if previous != ConnectionState::Idle {
            if let Some(on_state) = &self.on_state {
                on_state(ConnectionState::Idle);
            }
        }
        crate::log_debug!("[ws:{}] Closed by owner", self.label());
    }

    fn label(&self) -> String {
        self.channel
            .map(|c| c.path())
            .unwrap_or_else(|| "-".to_string())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the background task of one socket.
struct SocketTask {
    channel: Channel,
    ctx: WsContext,
    lifecycle: Lifecycle,
    on_frame: SharedCallback<Value>,
    on_state: Option<SharedCallback<ConnectionState>>,
    state: Arc<watch::Sender<ConnectionState>>,
    alive: Arc<AtomicBool>,
}

impl SocketTask {
    async fn run(mut self, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let label = self.channel.path();
        let mut socket: Option<Socket> = None;
        let mut keepalive: Option<Interval> = None;
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        let url = self.ctx.endpoint_url(&self.channel);
        let mut pending_actions: VecDeque<_> = self.lifecycle.start(url).into();

        loop {
            while let Some(action) = pending_actions.pop_front() {
                if !self.is_alive() {
                    close_socket(&mut socket).await;
                    return;
                }
                self.publish();
                match action {
                    LifecycleAction::Connect { url } => {
                        let attempt = timeout(self.ctx.connect_timeout, connect_async(url.as_str()));
                        match attempt.await {
                            Ok(Ok((stream, _response))) => {
                                socket = Some(stream);
                                pending_actions.extend(self.lifecycle.on_open());
                            }
                            Ok(Err(e)) => {
                                crate::log_warn!("[ws:{}] Connect failed: {}", label, e);
                                pending_actions.extend(self.lifecycle.on_closed());
                            }
                            Err(_) => {
                                crate::log_warn!(
                                    "[ws:{}] Handshake timed out after {:?}",
                                    label,
                                    self.ctx.connect_timeout
                                );
                                pending_actions.extend(self.lifecycle.on_closed());
                            }
                        }
                    }
                    LifecycleAction::SendPing => {
                        if let Ok(ping) = serde_json::to_string(&ClientFrame::Ping) {
                            send_text(&mut socket, &label, ping).await;
                        }
                    }
                    LifecycleAction::StartKeepAlive(period) => {
                        keepalive = Some(tokio::time::interval_at(Instant::now() + period, period));
                    }
                    LifecycleAction::StopKeepAlive => keepalive = None,
                    LifecycleAction::ScheduleReconnect(delay) => {
                        reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                    }
                    LifecycleAction::CancelReconnect => reconnect = None,
                    LifecycleAction::CloseSocket => close_socket(&mut socket).await,
                }
            }
            if !self.is_alive() {
                close_socket(&mut socket).await;
                return;
            }
            self.publish();

            tokio::select! {
                frame = next_frame(&mut socket) => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&label, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        crate::log_info!("[ws:{}] Closed by server", label);
                        socket = None;
                        pending_actions.extend(self.lifecycle.on_closed());
                    }
                    Some(Err(e)) => {
                        crate::log_warn!("[ws:{}] Read error: {}", label, e);
                        socket = None;
                        pending_actions.extend(self.lifecycle.on_closed());
                    }
                    // Pong is handled automatically by tungstenite
                    Some(Ok(_)) => {}
                },
                _ = tick(&mut keepalive) => {
                    pending_actions.extend(self.lifecycle.on_keepalive_tick());
                }
                _ = fire(&mut reconnect) => {
                    reconnect = None;
                    let url = self.ctx.endpoint_url(&self.channel);
                    pending_actions.extend(self.lifecycle.on_reconnect_timer(url));
                }
                msg = outbound.recv() => match msg {
                    Some(Outbound::Frame(json)) => {
                        if self.lifecycle.can_send() {
                            send_text(&mut socket, &label, json).await;
                        }
                    }
                    Some(Outbound::Shutdown) | None => {
                        for action in self.lifecycle.teardown() {
                            if action == LifecycleAction::CloseSocket {
                                close_socket(&mut socket).await;
                            }
                        }
                        return;
                    }
                },
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn dispatch(&self, label: &str, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(frame) => {
                if self.is_alive() {
                    (self.on_frame)(frame);
                }
            }
            Err(e) => crate::log_warn!("[ws:{}] Dropping malformed frame: {}", label, e),
        }
    }

    /// Mirror the lifecycle state to the handle, unless the handle let go.
    fn publish(&self) {
        let next = self.lifecycle.state().clone();
        let alive = &self.alive;
        let changed = self.state.send_if_modified(|current| {
            if !alive.load(Ordering::SeqCst) || *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            if let Some(on_state) = &self.on_state {
                on_state(self.lifecycle.state().clone());
            }
        }
    }
}

async fn next_frame(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(ws) => ws.next().await,
        None => pending().await,
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn fire(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn send_text(socket: &mut Option<Socket>, label: &str, json: String) {
    let Some(ws) = socket.as_mut() else {
        return;
    };
    crate::log_debug!("[ws:{}] Sending {}", label, json);
    if let Err(e) = ws.send(Message::text(json)).await {
        crate::log_warn!("[ws:{}] Send failed: {}", label, e);
    }
}

async fn close_socket(socket: &mut Option<Socket>) {
    if let Some(mut ws) = socket.take() {
        let _ = ws.close(None).await;
    }
}
