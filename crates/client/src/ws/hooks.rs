//! Channel hooks for Dioxus components.
//!
//! Each hook owns one adapter for the lifetime of the component instance. The
//! adapter is re-created when its key changes (another chat is opened) and
//! closed when the component unmounts.
//!
//! Socket callbacks never call component code directly: they push into a
//! queue drained by a task on the component's scope, which invokes the
//! handlers passed on the latest render. Updates still queued for a replaced
//! adapter are discarded.

use std::cell::RefCell;
use std::rc::Rc;

use campusnet_shared::ChatMessage;
use dioxus::prelude::*;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use serde_json::Value;

use super::{
    ChatChannel, ChatHandlers, ConnectionHandle, ConnectionState, ConnectionsChannel,
    ConnectionsHandlers, FeedChannel, FeedHandlers, NotificationsChannel, PresenceChannel,
    PresenceHandlers, WsContext,
};

enum Update<E> {
    Event(E),
    State(ConnectionState),
}

type Sink<E> = UnboundedSender<Update<E>>;

struct Slot<K, A> {
    key: K,
    adapter: A,
}

type SharedSlot<K, A> = Rc<RefCell<Option<Slot<K, A>>>>;
type LatestHandler<E> = Rc<RefCell<Box<dyn FnMut(E)>>>;

/// Adapters a hook can own.
pub trait HookAdapter: 'static {
    fn connection(&self) -> &ConnectionHandle;
}

macro_rules! hook_adapter {
    ($($adapter:ty),*) => {
        $(impl HookAdapter for $adapter {
            fn connection(&self) -> &ConnectionHandle {
                <$adapter>::connection(self)
            }
        })*
    };
}

hook_adapter!(
    ChatChannel,
    ConnectionsChannel,
    FeedChannel,
    PresenceChannel,
    NotificationsChannel
);

/// Handle returned by the channel hooks.
pub struct ChannelHook<K: 'static, A: HookAdapter> {
    state: Signal<ConnectionState>,
    slot: SharedSlot<K, A>,
}

impl<K: 'static, A: HookAdapter> Clone for ChannelHook<K, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            slot: self.slot.clone(),
        }
    }
}

impl<K: 'static, A: HookAdapter> ChannelHook<K, A> {
    /// Reactive: reading it subscribes the component.
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Send a raw frame. Dropped unless connected.
    pub fn send(&self, frame: &Value) {
        if let Some(slot) = self.slot.borrow().as_ref() {
            slot.adapter.connection().send_value(frame);
        }
    }
}

impl ChannelHook<i64, ChatChannel> {
    pub fn send_message(&self, content: &str, attachment: Option<&str>) {
        if let Some(slot) = self.slot.borrow().as_ref() {
            slot.adapter.send_message(content, attachment);
        }
    }

    pub fn set_typing(&self, is_typing: bool) {
        if let Some(slot) = self.slot.borrow().as_ref() {
            slot.adapter.set_typing(is_typing);
        }
    }
}

/// Keep one adapter alive per key and route its updates to the component.
fn use_channel<K, A, E>(
    key: K,
    open: impl FnOnce(&K, Sink<E>) -> A,
    handle: impl FnMut(E) + 'static,
) -> ChannelHook<K, A>
where
    K: PartialEq + Clone + 'static,
    A: HookAdapter,
    E: 'static,
{
    let state = use_signal(ConnectionState::default);
    let slot: SharedSlot<K, A> = use_hook(|| Rc::new(RefCell::new(None)));
    let latest: LatestHandler<E> =
        use_hook(|| Rc::new(RefCell::new(Box::new(|_| {}) as Box<dyn FnMut(E)>)));
    *latest.borrow_mut() = Box::new(handle);

    let stale = slot
        .borrow()
        .as_ref()
        .map_or(true, |current| current.key != key);
    if stale {
        // The previous adapter closes before the next one opens.
        slot.borrow_mut().take();
        let (sink, updates) = unbounded();
        let adapter = open(&key, sink);
        *slot.borrow_mut() = Some(Slot {
            key: key.clone(),
            adapter,
        });
        spawn(drain(updates, key, slot.clone(), latest, state));
    }

    let on_unmount = slot.clone();
    use_drop(move || {
        on_unmount.borrow_mut().take();
    });

    ChannelHook { state, slot }
}

async fn drain<K: PartialEq, A, E>(
    mut updates: UnboundedReceiver<Update<E>>,
    key: K,
    slot: SharedSlot<K, A>,
    handler: LatestHandler<E>,
    mut state: Signal<ConnectionState>,
) {
    while let Some(update) = updates.next().await {
        let current = slot
            .borrow()
            .as_ref()
            .is_some_and(|current| current.key == key);
        if !current {
            continue;
        }
        match update {
            Update::Event(event) => (handler.borrow_mut())(event),
            Update::State(next) => state.set(next),
        }
    }
}

fn event_sink<E: Send + 'static>(sink: &Sink<E>) -> impl Fn(E) + Send + Sync + 'static {
    let sink = sink.clone();
    move |event| {
        let _ = sink.unbounded_send(Update::Event(event));
    }
}

fn state_sink<E: Send + 'static>(
    sink: &Sink<E>,
) -> impl Fn(ConnectionState) + Send + Sync + 'static {
    let sink = sink.clone();
    move |state| {
        let _ = sink.unbounded_send(Update::State(state));
    }
}

enum ChatUpdate {
    Message(ChatMessage),
    Typing(i64, bool),
}

/// Live conversation. `chat_id <= 0` keeps the channel idle.
pub fn use_chat_channel(
    ctx: WsContext,
    chat_id: i64,
    on_message: EventHandler<ChatMessage>,
    on_typing: Option<EventHandler<(i64, bool)>>,
) -> ChannelHook<i64, ChatChannel> {
    use_channel(
        chat_id,
        |chat_id, sink: Sink<ChatUpdate>| {
            let messages = event_sink(&sink);
            let typing = event_sink(&sink);
            let handlers = ChatHandlers::new()
                .on_message(move |msg| messages(ChatUpdate::Message(msg)))
                .on_typing(move |(user, is_typing)| typing(ChatUpdate::Typing(user, is_typing)));
            ChatChannel::open_observed(*chat_id, ctx, handlers, state_sink(&sink))
        },
        move |update| match update {
            ChatUpdate::Message(msg) => on_message.call(msg),
            ChatUpdate::Typing(user, is_typing) => {
                if let Some(on_typing) = on_typing {
                    on_typing.call((user, is_typing));
                }
            }
        },
    )
}

enum ConnectionsUpdate {
    Frame(Value),
    Accepted(i64),
}

/// Connection-request events. `on_frame` sees every frame verbatim.
pub fn use_connections_channel(
    ctx: WsContext,
    on_frame: Option<EventHandler<Value>>,
    on_accepted: Option<EventHandler<i64>>,
) -> ChannelHook<(), ConnectionsChannel> {
    use_channel(
        (),
        |_, sink: Sink<ConnectionsUpdate>| {
            let frames = event_sink(&sink);
            let accepted = event_sink(&sink);
            let handlers = ConnectionsHandlers::new()
                .on_frame(move |frame| frames(ConnectionsUpdate::Frame(frame)))
                .on_accepted(move |user| accepted(ConnectionsUpdate::Accepted(user)));
            ConnectionsChannel::open_observed(ctx, handlers, state_sink(&sink))
        },
        move |update| match update {
            ConnectionsUpdate::Frame(frame) => {
                if let Some(on_frame) = on_frame {
                    on_frame.call(frame);
                }
            }
            ConnectionsUpdate::Accepted(user) => {
                if let Some(on_accepted) = on_accepted {
                    on_accepted.call(user);
                }
            }
        },
    )
}

enum FeedUpdate {
    Post(Value),
    Comment(Value),
}

pub fn use_feed_channel(
    ctx: WsContext,
    on_new_post: Option<EventHandler<Value>>,
    on_new_comment: Option<EventHandler<Value>>,
) -> ChannelHook<(), FeedChannel> {
    use_channel(
        (),
        |_, sink: Sink<FeedUpdate>| {
            let posts = event_sink(&sink);
            let comments = event_sink(&sink);
            let handlers = FeedHandlers::new()
                .on_new_post(move |post| posts(FeedUpdate::Post(post)))
                .on_new_comment(move |comment| comments(FeedUpdate::Comment(comment)));
            FeedChannel::open_observed(ctx, handlers, state_sink(&sink))
        },
        move |update| match update {
            FeedUpdate::Post(post) => {
                if let Some(on_new_post) = on_new_post {
                    on_new_post.call(post);
                }
            }
            FeedUpdate::Comment(comment) => {
                if let Some(on_new_comment) = on_new_comment {
                    on_new_comment.call(comment);
                }
            }
        },
    )
}

enum PresenceUpdate {
    Online(i64, String),
    Offline(i64),
}

pub fn use_presence_channel(
    ctx: WsContext,
    on_user_online: Option<EventHandler<(i64, String)>>,
    on_user_offline: Option<EventHandler<i64>>,
) -> ChannelHook<(), PresenceChannel> {
    use_channel(
        (),
        |_, sink: Sink<PresenceUpdate>| {
            let online = event_sink(&sink);
            let offline = event_sink(&sink);
            let handlers = PresenceHandlers::new()
                .on_user_online(move |(user, name)| online(PresenceUpdate::Online(user, name)))
                .on_user_offline(move |user| offline(PresenceUpdate::Offline(user)));
            PresenceChannel::open_observed(ctx, handlers, state_sink(&sink))
        },
        move |update| match update {
            PresenceUpdate::Online(user, name) => {
                if let Some(on_user_online) = on_user_online {
                    on_user_online.call((user, name));
                }
            }
            PresenceUpdate::Offline(user) => {
                if let Some(on_user_offline) = on_user_offline {
                    on_user_offline.call(user);
                }
            }
        },
    )
}

pub fn use_notifications_channel(
    ctx: WsContext,
    on_notification: Option<EventHandler<Value>>,
) -> ChannelHook<(), NotificationsChannel> {
    use_channel(
        (),
        |_, sink: Sink<Value>| {
            NotificationsChannel::open_observed(ctx, event_sink(&sink), state_sink(&sink))
        },
        move |frame| {
            if let Some(on_notification) = on_notification {
                on_notification.call(frame);
            }
        },
    )
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use dioxus::dioxus_core::{VNode, VirtualDom};

    use super::*;
    use crate::{ClientConfig, TokenStore};

    type Renders = Rc<RefCell<Vec<(bool, ConnectionState)>>>;

    fn ctx() -> WsContext {
        let tokens = TokenStore::in_memory();
        tokens.set_tokens("t", "r");
        let mut config = ClientConfig::for_api("http://unused.invalid");
        config.ws_base_url = "ws://127.0.0.1:9".to_string();
        WsContext::new(&config, tokens)
    }

    fn no_conversation() -> Element {
        let ctx = use_context::<WsContext>();
        let renders = use_context::<Renders>();
        let chat = use_chat_channel(ctx, 0, EventHandler::new(|_: ChatMessage| {}), None);
        chat.send_message("nobody listens", None);
        chat.set_typing(true);
        renders.borrow_mut().push((chat.is_connected(), chat.state()));
        VNode::empty()
    }

    #[tokio::test]
    async fn chat_hook_without_conversation_stays_idle() {
        let renders = Renders::default();
        let mut dom = VirtualDom::new(no_conversation)
            .with_root_context(ctx())
            .with_root_context(renders.clone());
        dom.rebuild_in_place();

        assert_eq!(*renders.borrow(), vec![(false, ConnectionState::Idle)]);
        drop(dom);
    }
}
