//! WASM/Web driver using web_sys::WebSocket.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use campusnet_shared::{Channel, ClientFrame};
use gloo_timers::callback::{Interval, Timeout};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use web_sys::{js_sys, CloseEvent, Event, MessageEvent, WebSocket};

use super::{callback, Callback, ConnectionState, SharedCallback, WsContext};
use crate::ws::lifecycle::{Lifecycle, LifecycleAction};

/// Browser event handlers of the current socket, kept alive while it is
/// current.
struct SocketClosures {
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

struct Inner {
    channel: Channel,
    ctx: WsContext,
    lifecycle: Lifecycle,
    socket: Option<WebSocket>,
    closures: Option<SocketClosures>,
    keepalive: Option<Interval>,
    reconnect: Option<Timeout>,
    on_frame: SharedCallback<Value>,
    on_state: Option<SharedCallback<ConnectionState>>,
    published: ConnectionState,
}

/// Exclusive owner of one channel's socket (WASM implementation).
///
/// All socket and timer callbacks hold a weak reference to the handle's
/// state; once the handle is closed or dropped they do nothing.
pub struct ConnectionHandle {
    channel: Option<Channel>,
    ctx: WsContext,
    on_frame: SharedCallback<Value>,
    on_state: Option<SharedCallback<ConnectionState>>,
    inner: Option<Rc<RefCell<Inner>>>,
}

impl ConnectionHandle {
    /// Open `channel`. With `None` the handle stays idle and never touches the
    /// network.
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
        let mut handle = Self {
            channel,
            ctx,
            on_frame,
            on_state,
            inner: None,
        };
        handle.spawn_run();
        handle
    }

    fn spawn_run(&mut self) {
        let Some(channel) = self.channel else {
            crate::log_debug!("[ws:-] No channel, staying idle");
            return;
        };
        let inner = Rc::new(RefCell::new(Inner {
            channel,
            ctx: self.ctx.clone(),
            lifecycle: Lifecycle::new(
                channel.path(),
                self.ctx.reconnect.clone(),
                self.ctx.keepalive,
            ),
            socket: None,
            closures: None,
            keepalive: None,
            reconnect: None,
            on_frame: self.on_frame.clone(),
            on_state: self.on_state.clone(),
            published: ConnectionState::Idle,
        }));
        let actions = {
            let mut guard = inner.borrow_mut();
            let url = guard.ctx.endpoint_url(&channel);
            guard.lifecycle.start(url)
        };
        apply(&inner, actions);
        self.inner = Some(inner);
    }

    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// Send a frame. Silently dropped unless the socket is open.
    pub fn send(&self, frame: &ClientFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => self.send_text(&json),
            Err(e) => crate::log_error!("Serialize failed: {}", e),
        }
    }

    /// Send an arbitrary JSON frame. Silently dropped unless the socket is open.
    pub fn send_value(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    fn send_text(&self, json: &str) {
        let Some(inner) = &self.inner else {
            return;
        };
        let guard = inner.borrow();
        if !guard.lifecycle.can_send() {
            crate::log_debug!("[ws:{}] Not connected, dropping frame", guard.channel);
            return;
        }
        send_on(&guard, json);
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .as_ref()
            .map(|inner| inner.borrow().lifecycle.state().clone())
            .unwrap_or_default()
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
        let Some(inner) = self.inner.take() else {
            return;
        };
        let actions = inner.borrow_mut().lifecycle.teardown();
        apply(&inner, actions);
        let on_state = {
            let mut guard = inner.borrow_mut();
            if let Some(ws) = guard.socket.take() {
                detach(&ws);
            }
            guard.closures = None;
            guard.keepalive = None;
            guard.reconnect = None;
            let changed = guard.published != ConnectionState::Idle;
            guard.published = ConnectionState::Idle;
            guard.on_state.clone().filter(|_| changed)
        };
        if let Some(on_state) = on_state {
            on_state(ConnectionState::Idle);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Execute lifecycle actions, feeding back whatever they produce.
fn apply(inner: &Rc<RefCell<Inner>>, actions: Vec<LifecycleAction>) {
    let mut queue: std::collections::VecDeque<_> = actions.into();
    while let Some(action) = queue.pop_front() {
        let more = match action {
            LifecycleAction::Connect { url } => connect(inner, &url),
            LifecycleAction::SendPing => {
                let guard = inner.borrow();
                if let Ok(ping) = serde_json::to_string(&ClientFrame::Ping) {
                    send_on(&guard, &ping);
                }
                vec![]
            }
            LifecycleAction::StartKeepAlive(period) => {
                let weak = Rc::downgrade(inner);
                let millis = period.as_millis().min(u32::MAX as u128) as u32;
                let interval = Interval::new(millis, move || {
                    with_live(&weak, |inner| {
                        let actions = inner.borrow_mut().lifecycle.on_keepalive_tick();
                        apply(inner, actions);
                    });
                });
                inner.borrow_mut().keepalive = Some(interval);
                vec![]
            }
            LifecycleAction::StopKeepAlive => {
                inner.borrow_mut().keepalive = None;
                vec![]
            }
            LifecycleAction::ScheduleReconnect(delay) => {
                let weak = Rc::downgrade(inner);
                let millis = delay.as_millis().min(u32::MAX as u128) as u32;
                let timeout = Timeout::new(millis, move || {
                    with_live(&weak, |inner| {
                        let actions = {
                            let mut guard = inner.borrow_mut();
                            guard.reconnect = None;
                            let url = guard.ctx.endpoint_url(&guard.channel);
                            guard.lifecycle.on_reconnect_timer(url)
                        };
                        apply(inner, actions);
                    });
                });
                inner.borrow_mut().reconnect = Some(timeout);
                vec![]
            }
            LifecycleAction::CancelReconnect => {
                inner.borrow_mut().reconnect = None;
                vec![]
            }
            LifecycleAction::CloseSocket => {
                let mut guard = inner.borrow_mut();
                if let Some(ws) = guard.socket.take() {
                    detach(&ws);
                    let _ = ws.close();
                }
                guard.closures = None;
                vec![]
            }
        };
        queue.extend(more);
    }
    publish(inner);
}

fn connect(inner: &Rc<RefCell<Inner>>, url: &str) -> Vec<LifecycleAction> {
    let label = inner.borrow().channel.path();
    publish(inner);

    let ws = match WebSocket::new(url) {
        Ok(ws) => ws,
        Err(e) => {
            crate::log_warn!("[ws:{}] Failed to create WebSocket: {:?}", label, e);
            return inner.borrow_mut().lifecycle.on_closed();
        }
    };

    let weak = Rc::downgrade(inner);
    let on_open = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
        with_live(&weak, |inner| {
            let actions = inner.borrow_mut().lifecycle.on_open();
            apply(inner, actions);
        });
    });

    let weak = Rc::downgrade(inner);
    let label_for_message = label.clone();
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |e: MessageEvent| {
        let Ok(text) = e.data().dyn_into::<js_sys::JsString>() else {
            return;
        };
        let text: String = text.into();
        match serde_json::from_str::<Value>(&text) {
            Ok(frame) => with_live(&weak, |inner| {
                let on_frame = inner.borrow().on_frame.clone();
                on_frame(frame);
            }),
            Err(e) => crate::log_warn!(
                "[ws:{}] Dropping malformed frame: {}",
                label_for_message,
                e
            ),
        }
    });

    let weak = Rc::downgrade(inner);
    let label_for_close = label.clone();
    let on_close = Closure::<dyn FnMut(CloseEvent)>::new(move |e: CloseEvent| {
        crate::log_info!("[ws:{}] Closed with code {}", label_for_close, e.code());
        with_live(&weak, socket_closed);
    });

    let weak = Rc::downgrade(inner);
    let label_for_error = label;
    let on_error = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
        crate::log_warn!("[ws:{}] Socket error", label_for_error);
        with_live(&weak, socket_closed);
    });

    ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    let mut guard = inner.borrow_mut();
    if let Some(previous) = guard.socket.replace(ws) {
        detach(&previous);
    }
    guard.closures = Some(SocketClosures {
        _on_open: on_open,
        _on_message: on_message,
        _on_close: on_close,
        _on_error: on_error,
    });
    vec![]
}

fn socket_closed(inner: &Rc<RefCell<Inner>>) {
    let actions = inner.borrow_mut().lifecycle.on_closed();
    apply(inner, actions);
}

/// Unhook a socket before its closures are dropped.
fn detach(ws: &WebSocket) {
    ws.set_onopen(None);
    ws.set_onmessage(None);
    ws.set_onclose(None);
    ws.set_onerror(None);
}

/// Run `f` only while the handle still owns this socket.
fn with_live(weak: &Weak<RefCell<Inner>>, f: impl FnOnce(&Rc<RefCell<Inner>>)) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if inner.borrow().lifecycle.is_torn_down() {
        return;
    }
    f(&inner);
}

fn send_on(inner: &Inner, json: &str) {
    let Some(ws) = &inner.socket else {
        return;
    };
    // readyState 1 = OPEN
    if ws.ready_state() != WebSocket::OPEN {
        return;
    }
    if let Err(e) = ws.send_with_str(json) {
        crate::log_warn!("[ws:{}] Send failed: {:?}", inner.channel, e);
    }
}

fn publish(inner: &Rc<RefCell<Inner>>) {
    let on_state = {
        let mut guard = inner.borrow_mut();
        if guard.lifecycle.is_torn_down() {
            return;
        }
        let next = guard.lifecycle.state().clone();
        if guard.published == next {
            return;
        }
        guard.published = next.clone();
        guard.on_state.clone().map(|cb| (cb, next))
    };
    if let Some((on_state, state)) = on_state {
        on_state(state);
    }
}
