//! `feed` adapter.

use campusnet_shared::{Channel, ChannelEvent, FeedEvent};
use serde_json::Value;

use crate::ws::{callback, Callback, ConnectionHandle, ConnectionState, SharedCallback, WsContext};

#[derive(Clone, Default)]
pub struct FeedHandlers {
    on_new_post: Option<SharedCallback<Value>>,
    on_new_comment: Option<SharedCallback<Value>>,
}

impl FeedHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_post(mut self, f: impl Callback<Value> + 'static) -> Self {
        self.on_new_post = Some(callback(f));
        self
    }

    pub fn on_new_comment(mut self, f: impl Callback<Value> + 'static) -> Self {
        self.on_new_comment = Some(callback(f));
        self
    }
}

pub fn dispatch(frame: &Value, handlers: &FeedHandlers) {
    match FeedEvent::decode(frame) {
        Some(FeedEvent::NewPost { post }) => {
            if let Some(on_new_post) = &handlers.on_new_post {
                on_new_post(post);
            }
        }
        Some(FeedEvent::NewComment { comment }) => {
            if let Some(on_new_comment) = &handlers.on_new_comment {
                on_new_comment(comment);
            }
        }
        None => {}
    }
}

/// New posts and comments as they are published.
pub struct FeedChannel {
    connection: ConnectionHandle,
}

impl FeedChannel {
    pub fn open(ctx: WsContext, handlers: FeedHandlers) -> Self {
        Self::connect(ctx, handlers, None)
    }

    /// Like [`FeedChannel::open`], also reporting connection state changes.
    pub fn open_observed(
        ctx: WsContext,
        handlers: FeedHandlers,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self::connect(ctx, handlers, Some(callback(on_state)))
    }

    fn connect(
        ctx: WsContext,
        handlers: FeedHandlers,
        on_state: Option<SharedCallback<ConnectionState>>,
    ) -> Self {
        let on_frame = callback(move |frame: Value| dispatch(&frame, &handlers));
        Self {
            connection: ConnectionHandle::start(Some(Channel::Feed), ctx, on_frame, on_state),
        }
    }

    pub fn send(&self, frame: &Value) {
        self.connection.send_value(frame);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn posts_and_comments_go_to_their_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (p, c) = (seen.clone(), seen.clone());
        let handlers = FeedHandlers::new()
            .on_new_post(move |post: Value| p.lock().unwrap().push(("post", post["id"].clone())))
            .on_new_comment(move |comment: Value| {
                c.lock().unwrap().push(("comment", comment["id"].clone()))
            });

        dispatch(&json!({"type": "new_post", "post": {"id": 1, "content": "hello"}}), &handlers);
        dispatch(&json!({"type": "new_comment", "comment": {"id": 9}}), &handlers);
        dispatch(&json!({"type": "new_post"}), &handlers);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("post", json!(1)), ("comment", json!(9))]
        );
    }
}
