//! campusnet-tail - follow one realtime channel from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Public feed, token from the environment
//! CAMPUSNET_ACCESS_TOKEN=... campusnet-tail --channel feed
//!
//! # One conversation against a remote backend
//! CAMPUSNET_API_BASE_URL=https://api.campus.example campusnet-tail --channel chat:42 --token ...
//! ```

#[cfg(not(target_arch = "wasm32"))]
mod tail {
    use anyhow::{anyhow, bail, Result};
    use campusnet_client::logging::init_tracing;
    use campusnet_client::ws::{
        ChatChannel, ChatHandlers, ConnectionHandle, ConnectionsChannel, ConnectionsHandlers,
        FeedChannel, FeedHandlers, NotificationsChannel, PresenceChannel, PresenceHandlers,
        WsContext,
    };
    use campusnet_client::{ClientConfig, TokenStore};
    use campusnet_shared::Channel;
    use clap::Parser;

    /// Follow one campusnet realtime channel and log its events
    #[derive(Parser, Debug)]
    #[command(name = "campusnet-tail")]
    #[command(version)]
    struct Args {
        /// feed, connections, notifications, online, or chat:<id>
        #[arg(short, long, value_parser = parse_channel)]
        channel: Channel,

        /// Access token. Without it the stored session is used.
        #[arg(short, long, env = "CAMPUSNET_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    }

    fn parse_channel(raw: &str) -> Result<Channel, String> {
        let parsed = match raw.strip_prefix("chat:") {
            Some(id) => id.parse::<i64>().ok().and_then(Channel::chat),
            None => Channel::parse(raw),
        };
        parsed.ok_or_else(|| {
            format!("unknown channel {raw:?}, expected feed, connections, notifications, online or chat:<id>")
        })
    }

    /// The adapter being followed.
    enum Tail {
        Chat(ChatChannel),
        Connections(ConnectionsChannel),
        Feed(FeedChannel),
        Notifications(NotificationsChannel),
        Presence(PresenceChannel),
    }

    impl Tail {
        fn open(channel: Channel, ctx: WsContext) -> Self {
            match channel {
                Channel::Messages(chat_id) => Tail::Chat(ChatChannel::open(
                    chat_id,
                    ctx,
                    ChatHandlers::new()
                        .on_message(|msg| {
                            tracing::info!(
                                id = msg.id,
                                sender = msg.sender_id,
                                at = %msg.timestamp,
                                "message: {}",
                                msg.content.as_deref().unwrap_or("")
                            )
                        })
                        .on_typing(|(user, typing)| tracing::info!(user, typing, "typing")),
                )),
                Channel::Connections => Tail::Connections(ConnectionsChannel::open(
                    ctx,
                    ConnectionsHandlers::new().on_event(|event| tracing::info!(?event, "connection")),
                )),
                Channel::Feed => Tail::Feed(FeedChannel::open(
                    ctx,
                    FeedHandlers::new()
                        .on_new_post(|post| tracing::info!(%post, "new post"))
                        .on_new_comment(|comment| tracing::info!(%comment, "new comment")),
                )),
                Channel::Notifications => Tail::Notifications(NotificationsChannel::open(
                    ctx,
                    |frame| tracing::info!(%frame, "notification"),
                )),
                Channel::Online => Tail::Presence(PresenceChannel::open(
                    ctx,
                    PresenceHandlers::new()
                        .on_user_online(|(user, name)| tracing::info!(user, name = %name, "online"))
                        .on_user_offline(|user| tracing::info!(user, "offline")),
                )),
            }
        }

        fn connection(&self) -> &ConnectionHandle {
            match self {
                Tail::Chat(c) => c.connection(),
                Tail::Connections(c) => c.connection(),
                Tail::Feed(c) => c.connection(),
                Tail::Notifications(c) => c.connection(),
                Tail::Presence(c) => c.connection(),
            }
        }
    }

    pub async fn run() -> Result<()> {
        let args = Args::parse();
        init_tracing("campusnet_client=info,campusnet_tail=info");

        let config = ClientConfig::from_env();
        let tokens = match args.token {
            Some(token) if !token.trim().is_empty() => {
                let tokens = TokenStore::in_memory();
                tokens.set_tokens(token.trim(), "");
                tokens
            }
            _ => TokenStore::platform_default(&config.app_name),
        };
        if tokens.access_token().is_none() {
            bail!("no access token: pass --token or set CAMPUSNET_ACCESS_TOKEN");
        }

        tracing::info!(channel = %args.channel, base = %config.ws_base_url, "Following channel");
        let tail = Tail::open(args.channel, WsContext::new(&config, tokens));
        let mut state = tail.connection().subscribe_state();

        loop {
            tokio::select! {
                changed = state.changed() => {
                    changed.map_err(|_| anyhow!("connection handle went away"))?;
                    let current = state.borrow_and_update().clone();
                    tracing::info!(state = ?current, "Connection state");
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("Interrupted, closing");
                    break;
                }
            }
        }

        drop(tail);
        Ok(())
    }

}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tail::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
