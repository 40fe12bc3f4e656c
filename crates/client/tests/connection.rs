//! Socket lifecycle against a loopback WebSocket server.

use std::time::Duration;

use campusnet_client::config::ClientConfig;
use campusnet_client::ws::{
    ChatChannel, ChatHandlers, ConnectionState, FeedChannel, FeedHandlers, ReconnectConfig,
    WsContext,
};
use campusnet_client::TokenStore;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepted sockets together with the request URI they were opened with.
struct Loopback {
    base: String,
    accepted: mpsc::UnboundedReceiver<(String, ServerSocket)>,
}

impl Loopback {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, accepted) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (uri_tx, uri_rx) = std::sync::mpsc::channel();
                let callback = move |req: &Request, resp: Response| {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok::<_, ErrorResponse>(resp)
                };
                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    let uri = uri_rx.recv().unwrap_or_default();
                    if tx.send((uri, ws)).is_err() {
                        return;
                    }
                }
            }
        });
        Self { base, accepted }
    }

    async fn next(&mut self) -> (String, ServerSocket) {
        timeout(Duration::from_secs(5), self.accepted.recv())
            .await
            .expect("no connection within 5s")
            .expect("listener stopped")
    }

    async fn assert_no_connection(&mut self, within: Duration) {
        assert!(
            timeout(within, self.accepted.recv()).await.is_err(),
            "unexpected connection"
        );
    }

    fn context(&self, token: &str) -> WsContext {
        let tokens = TokenStore::in_memory();
        tokens.set_tokens(token, "r");
        let mut config = ClientConfig::for_api("http://unused.invalid");
        config.ws_base_url = self.base.clone();
        config.reconnect = ReconnectConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
        };
        WsContext::new(&config, tokens)
    }
}

async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5s")
            .expect("socket ended")
            .expect("read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for(
    state: &mut watch::Receiver<ConnectionState>,
    want: impl Fn(&ConnectionState) -> bool,
) {
    timeout(Duration::from_secs(5), state.wait_for(|s| want(s)))
        .await
        .expect("state not reached within 5s")
        .expect("handle dropped");
}

#[tokio::test]
async fn connects_with_token_and_pings_on_open() {
    let mut server = Loopback::start().await;
    let feed = FeedChannel::open(server.context("tok en+1"), FeedHandlers::new());

    let (uri, mut ws) = server.next().await;
    assert_eq!(uri, "/ws/feed?token=tok%20en%2B1");
    assert_eq!(next_json(&mut ws).await, json!({ "type": "ping" }));

    let mut state = feed.connection().subscribe_state();
    wait_for(&mut state, ConnectionState::is_connected).await;
}

#[tokio::test]
async fn frames_are_dispatched_and_malformed_ones_dropped() {
    let mut server = Loopback::start().await;
    let (posts_tx, mut posts) = mpsc::unbounded_channel();
    let feed = FeedChannel::open(
        server.context("t"),
        FeedHandlers::new().on_new_post(move |post| {
            let _ = posts_tx.send(post);
        }),
    );

    let (_, mut ws) = server.next().await;
    next_json(&mut ws).await;
    ws.send(Message::text("{not json")).await.unwrap();
    ws.send(Message::text(r#"{"type":"mystery"}"#)).await.unwrap();
    ws.send(Message::text(r#"{"type":"new_post","post":{"id":3}}"#))
        .await
        .unwrap();

    let post = timeout(Duration::from_secs(5), posts.recv()).await.unwrap().unwrap();
    assert_eq!(post, json!({ "id": 3 }));
    assert!(feed.is_connected());
}

#[tokio::test]
async fn chat_frames_go_out_only_while_open() {
    let mut server = Loopback::start().await;
    let chat = ChatChannel::open(42, server.context("t"), ChatHandlers::new());
    chat.send_message("too early", None);

    let (uri, mut ws) = server.next().await;
    assert!(uri.starts_with("/ws/messages/42?"));
    assert_eq!(next_json(&mut ws).await, json!({ "type": "ping" }));

    let mut state = chat.connection().subscribe_state();
    wait_for(&mut state, ConnectionState::is_connected).await;
    chat.send_message("hi", Some("img.png"));
    chat.set_typing(true);

    assert_eq!(
        next_json(&mut ws).await,
        json!({ "type": "message", "content": "hi", "attachment": "img.png" })
    );
    assert_eq!(
        next_json(&mut ws).await,
        json!({ "type": "typing", "is_typing": true })
    );
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let mut server = Loopback::start().await;
    let (states_tx, mut states) = mpsc::unbounded_channel();
    let feed = FeedChannel::open_observed(server.context("t"), FeedHandlers::new(), move |s| {
        let _ = states_tx.send(s);
    });

    let (_, mut first) = server.next().await;
    next_json(&mut first).await;
    first.close(None).await.unwrap();
    drop(first);

    let (_, mut second) = server.next().await;
    assert_eq!(next_json(&mut second).await, json!({ "type": "ping" }));
    let mut state = feed.connection().subscribe_state();
    wait_for(&mut state, ConnectionState::is_connected).await;

    let mut seen = Vec::new();
    while let Ok(s) = states.try_recv() {
        seen.push(s);
    }
    let delay = Duration::from_millis(50);
    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::ReconnectScheduled { attempt: 1, delay },
            ConnectionState::Connecting,
            ConnectionState::Open,
        ]
    );
}

#[tokio::test]
async fn rotated_token_is_used_on_next_reconnect_only() {
    let mut server = Loopback::start().await;
    let ctx = server.context("t1");
    let tokens = ctx.tokens.clone();
    let _feed = FeedChannel::open(ctx, FeedHandlers::new());

    let (uri, mut first) = server.next().await;
    assert_eq!(uri, "/ws/feed?token=t1");
    next_json(&mut first).await;

    // An open socket keeps the token it was opened with.
    tokens.set_tokens("t2", "r");
    server.assert_no_connection(Duration::from_millis(300)).await;

    first.close(None).await.unwrap();
    drop(first);

    let (uri, mut second) = server.next().await;
    assert_eq!(uri, "/ws/feed?token=t2");
    assert_eq!(next_json(&mut second).await, json!({ "type": "ping" }));
}

#[tokio::test]
async fn stalled_handshake_counts_as_failed_attempt() {
    // Accepts TCP but never answers the websocket upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if accepted_tx.send(stream).is_err() {
                return;
            }
        }
    });

    let tokens = TokenStore::in_memory();
    tokens.set_tokens("t", "r");
    let mut config = ClientConfig::for_api("http://unused.invalid");
    config.ws_base_url = base;
    config.connect_timeout = Duration::from_millis(100);
    config.reconnect = ReconnectConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    };
    let feed = FeedChannel::open(WsContext::new(&config, tokens), FeedHandlers::new());
    let mut state = feed.connection().subscribe_state();

    wait_for(&mut state, |s| *s == ConnectionState::Terminated).await;

    let mut held = Vec::new();
    while let Ok(stream) = accepted.try_recv() {
        held.push(stream);
    }
    assert_eq!(held.len(), 2);
}

#[tokio::test]
async fn close_cancels_pending_reconnect() {
    let mut server = Loopback::start().await;
    let mut ctx = server.context("t");
    ctx.reconnect.initial_delay = Duration::from_millis(300);
    let mut feed = FeedChannel::open(ctx, FeedHandlers::new());
    let mut state = feed.connection().subscribe_state();

    let (_, mut first) = server.next().await;
    next_json(&mut first).await;
    first.close(None).await.unwrap();
    wait_for(&mut state, |s| {
        matches!(s, ConnectionState::ReconnectScheduled { .. })
    })
    .await;

    feed.close();
    assert_eq!(feed.state(), ConnectionState::Idle);
    server.assert_no_connection(Duration::from_millis(700)).await;
    assert_eq!(feed.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn no_conversation_selected_stays_idle() {
    let mut server = Loopback::start().await;
    let chat = ChatChannel::open(0, server.context("t"), ChatHandlers::new());
    let negative = ChatChannel::open(-4, server.context("t"), ChatHandlers::new());

    server.assert_no_connection(Duration::from_millis(300)).await;
    assert_eq!(chat.state(), ConnectionState::Idle);
    assert!(!negative.is_connected());
}

#[tokio::test]
async fn gives_up_after_reconnect_cap() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    // Nothing listens there anymore: every attempt is refused.
    drop(listener);

    let tokens = TokenStore::in_memory();
    tokens.set_tokens("t", "r");
    let mut config = ClientConfig::for_api("http://unused.invalid");
    config.ws_base_url = base;
    config.reconnect = ReconnectConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    };
    let feed = FeedChannel::open(WsContext::new(&config, tokens), FeedHandlers::new());
    let mut state = feed.connection().subscribe_state();

    wait_for(&mut state, |s| *s == ConnectionState::Terminated).await;
}
