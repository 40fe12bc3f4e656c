//! Token storage and the authenticated session bundle.

use std::sync::{Arc, RwLock};

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::ws::WsContext;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, Default, Clone)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

struct TokenStoreInner {
    cache: RwLock<Tokens>,
    /// Session tier, holds the access token.
    session: Box<dyn KeyValueStore>,
    /// Durable tier, holds the refresh token.
    durable: Box<dyn KeyValueStore>,
}

/// Access and refresh tokens, shared by every REST call and socket attempt.
///
/// The access token lives in the session tier and the refresh token in the
/// durable tier. Both values are written under one lock, so a reader never
/// sees the access token of one pair with the refresh token of another.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access", &self.access_token().is_some())
            .field("has_refresh", &self.refresh_token().is_some())
            .finish()
    }
}

impl TokenStore {
    pub fn new(session: impl KeyValueStore + 'static, durable: impl KeyValueStore + 'static) -> Self {
        let tokens = Tokens {
            access: session.get(ACCESS_TOKEN_KEY),
            refresh: durable.get(REFRESH_TOKEN_KEY),
        };
        Self {
            inner: Arc::new(TokenStoreInner {
                cache: RwLock::new(tokens),
                session: Box::new(session),
                durable: Box::new(durable),
            }),
        }
    }

    /// Both tiers in memory. Nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), MemoryStore::new())
    }

    /// Platform tiers: `sessionStorage` + `localStorage` in the browser,
    /// memory + config-directory files on desktop.
    #[cfg(target_arch = "wasm32")]
    pub fn platform_default(_app_name: &str) -> Self {
        use crate::storage::WebStorage;
        Self::new(WebStorage::session(), WebStorage::local())
    }

    /// Platform tiers: `sessionStorage` + `localStorage` in the browser,
    /// memory + config-directory files on desktop.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn platform_default(app_name: &str) -> Self {
        use crate::storage::FileStore;
        match FileStore::in_config_dir(app_name) {
            Some(durable) => Self::new(MemoryStore::new(), durable),
            None => {
                crate::log_warn!("No config directory available, refresh token will not persist");
                Self::in_memory()
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        let cached = self
            .inner
            .cache
            .read()
            .ok()
            .and_then(|tokens| tokens.access.clone());
        cached.or_else(|| self.inner.session.get(ACCESS_TOKEN_KEY))
    }

    pub fn refresh_token(&self) -> Option<String> {
        let cached = self
            .inner
            .cache
            .read()
            .ok()
            .and_then(|tokens| tokens.refresh.clone());
        cached.or_else(|| self.inner.durable.get(REFRESH_TOKEN_KEY))
    }

    /// A blank token counts as absent.
    pub fn has_session(&self) -> bool {
        let present = |token: Option<String>| token.is_some_and(|t| !t.is_empty());
        present(self.access_token()) || present(self.refresh_token())
    }

    /// Replace both tokens.
    pub fn set_tokens(&self, access: &str, refresh: &str) {
        let Ok(mut tokens) = self.inner.cache.write() else {
            crate::log_error!("Token store lock poisoned, tokens not updated");
            return;
        };
        tokens.access = Some(access.to_string());
        tokens.refresh = Some(refresh.to_string());
        if !self.inner.session.set(ACCESS_TOKEN_KEY, access) {
            crate::log_warn!("Failed to persist access token");
        }
        if !self.inner.durable.set(REFRESH_TOKEN_KEY, refresh) {
            crate::log_warn!("Failed to persist refresh token");
        }
    }

    pub fn clear(&self) {
        if let Ok(mut tokens) = self.inner.cache.write() {
            *tokens = Tokens::default();
        }
        self.inner.session.remove(ACCESS_TOKEN_KEY);
        self.inner.durable.remove(REFRESH_TOKEN_KEY);
    }
}

/// Everything a signed-in client needs: configuration, tokens and the
/// authenticated REST client built on them.
#[derive(Clone)]
pub struct AuthSession {
    config: Arc<ClientConfig>,
    tokens: TokenStore,
    api: ApiClient,
}

impl AuthSession {
    pub fn new(config: ClientConfig, tokens: TokenStore) -> Self {
        let api = ApiClient::new(&config.api_base_url, tokens.clone());
        Self {
            config: Arc::new(config),
            tokens,
            api,
        }
    }

    /// Replace the REST client, e.g. to install a session-expired hook.
    pub fn with_api(mut self, api: ApiClient) -> Self {
        self.api = api;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Connection settings for opening realtime channels.
    pub fn ws_context(&self) -> WsContext {
        WsContext::new(&self.config, self.tokens.clone())
    }

    /// Check if user is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.tokens.access_token().is_some()
    }

    /// Tell the server, then forget the tokens whatever it answered.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            crate::log_warn!("Logout request failed: {}", e);
        }
        self.tokens.clear();
    }
}
