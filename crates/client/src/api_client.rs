//! HTTP API client with bearer auth and single-flight token refresh.

use std::sync::{Arc, Mutex};

use campusnet_shared::{
    ApiError, Chat, Connection, LoginRequest, LoginResponse, Message, MessageCreateRequest,
    OtpVerifyRequest, RefreshTokenRequest, StatusMessage, TokenPair, User,
};
use futures_util::future::{FutureExt, Shared};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth_session::TokenStore;
use crate::ws::{callback, Callback, SharedCallback};

/// Endpoints that never carry a bearer token and never trigger a refresh.
const PUBLIC_ENDPOINTS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/verify-2fa",
    "/auth/refresh",
];

#[cfg(not(target_arch = "wasm32"))]
type RefreshFuture =
    Shared<futures_util::future::BoxFuture<'static, Result<String, ApiError>>>;
#[cfg(target_arch = "wasm32")]
type RefreshFuture =
    Shared<futures_util::future::LocalBoxFuture<'static, Result<String, ApiError>>>;

/// HTTP client for the campusnet REST API.
///
/// Every request carries the current access token. A 401 is answered by one
/// refresh shared by all requests that hit it, after which each request is
/// retried once.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: TokenStore,
    refresh: Arc<Mutex<Option<RefreshFuture>>>,
    on_session_expired: Option<SharedCallback<()>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, tokens: TokenStore) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            refresh: Arc::new(Mutex::new(None)),
            on_session_expired: None,
        }
    }

    /// Called once per failed refresh, after the tokens were cleared.
    /// Browser apps navigate to the login page here.
    pub fn with_session_expired_hook(mut self, hook: impl Callback<()> + 'static) -> Self {
        self.on_session_expired = Some(callback(hook));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(Method::GET, path, None).await?;
        decode(&text)
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self.execute(Method::POST, path, Some(encode(body)?)).await?;
        decode(&text)
    }

    /// Make a POST request without body
    pub async fn post_empty<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(Method::POST, path, None).await?;
        decode(&text)
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self.execute(Method::PUT, path, Some(encode(body)?)).await?;
        decode(&text)
    }

    /// Make a PATCH request with JSON body
    pub async fn patch_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self.execute(Method::PATCH, path, Some(encode(body)?)).await?;
        decode(&text)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Send a request, refreshing the access token and retrying once on 401.
    /// Returns the raw body of a successful response.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, ApiError> {
        if is_public(path) {
            let (status, text) = self.send_once(&method, path, body.as_deref(), None).await?;
            return finish(status, text);
        }

        let sent_with = self.tokens.access_token();
        let (status, text) = self
            .send_once(&method, path, body.as_deref(), sent_with.as_deref())
            .await?;
        if status != 401 {
            return finish(status, text);
        }

        let retry_token = match self.tokens.access_token() {
            // Someone refreshed while this request was on the wire.
            Some(current) if sent_with.as_ref() != Some(&current) => current,
            _ => self.refresh_access_token().await?,
        };
        crate::log_debug!("Retrying {} {} with a fresh token", method, path);
        let (status, text) = self
            .send_once(&method, path, body.as_deref(), Some(&retry_token))
            .await?;
        finish(status, text)
    }

    /// Obtain a new access token, joining the refresh already in flight if
    /// there is one.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let flight = {
            let mut slot = self.refresh.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    let flight = self.start_refresh();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut slot = self.refresh.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }
        outcome
    }

    fn start_refresh(&self) -> RefreshFuture {
        let client = self.client.clone();
        let url = self.url("/auth/refresh");
        let tokens = self.tokens.clone();
        let on_expired = self.on_session_expired.clone();

        let refresh = async move {
            let outcome = match tokens.refresh_token().filter(|t| !t.is_empty()) {
                Some(refresh_token) => request_refresh(&client, &url, refresh_token).await,
                None => Err(ApiError::Unauthenticated),
            };
            match outcome {
                Ok(pair) => {
                    tokens.set_tokens(&pair.access_token, &pair.refresh_token);
                    crate::log_info!("Access token refreshed");
                    Ok(pair.access_token)
                }
                Err(e) => {
                    crate::log_warn!("Token refresh failed, session expired: {}", e);
                    tokens.clear();
                    if let Some(on_expired) = on_expired {
                        on_expired(());
                    }
                    Err(ApiError::SessionExpired)
                }
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            refresh.boxed().shared()
        }
        #[cfg(target_arch = "wasm32")]
        {
            refresh.boxed_local().shared()
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&[u8]>,
        token: Option<&str>,
    ) -> Result<(u16, String), ApiError> {
        let mut rb = self.client.request(method.clone(), self.url(path));
        if let Some(token) = token {
            rb = rb.bearer_auth(token);
        }
        if let Some(body) = body {
            rb = rb
                .header("Content-Type", "application/json")
                .body(body.to_vec());
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        Ok((status, text))
    }

    // --- Auth ---

    /// Stores the tokens unless a second factor is still required.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.post_json("/auth/login", &request).await?;
        if !response.requires_2fa && !response.access_token.is_empty() {
            self.tokens
                .set_tokens(&response.access_token, &response.refresh_token);
        }
        Ok(response)
    }

    /// Complete a login that answered `requires_2fa`.
    pub async fn verify_2fa(&self, email: &str, code: &str) -> Result<LoginResponse, ApiError> {
        let request = OtpVerifyRequest {
            token: code.to_string(),
            email: email.to_string(),
        };
        let response: LoginResponse = self.post_json("/auth/verify-2fa", &request).await?;
        if !response.access_token.is_empty() {
            self.tokens
                .set_tokens(&response.access_token, &response.refresh_token);
        }
        Ok(response)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_empty("/auth/logout").await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.get_json("/auth/me").await
    }

    // --- Chats ---

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
        self.get_json("/chats").await
    }

    pub async fn chat_messages(&self, chat_id: i64) -> Result<Vec<Message>, ApiError> {
        self.get_json(&format!("/chats/{chat_id}/messages")).await
    }

    pub async fn send_direct_message(
        &self,
        request: &MessageCreateRequest,
    ) -> Result<Message, ApiError> {
        self.post_json("/chats/message", request).await
    }

    pub async fn mark_chat_read(&self, chat_id: i64) -> Result<StatusMessage, ApiError> {
        self.post_empty(&format!("/chats/{chat_id}/mark-as-read")).await
    }

    // --- Connections ---

    pub async fn list_pending_incoming(&self) -> Result<Vec<Connection>, ApiError> {
        self.get_json("/connections/pending/incoming").await
    }

    pub async fn accept_connection(&self, connection_id: i64) -> Result<Connection, ApiError> {
        self.post_empty(&format!("/connections/{connection_id}/accept"))
            .await
    }

    pub async fn reject_connection(&self, connection_id: i64) -> Result<Connection, ApiError> {
        self.post_empty(&format!("/connections/{connection_id}/reject"))
            .await
    }

    pub async fn delete_connection(&self, connection_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/connections/{connection_id}")).await
    }
}

fn is_public(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    PUBLIC_ENDPOINTS
        .iter()
        .any(|public| path.trim_end_matches('/') == *public)
}

async fn request_refresh(
    client: &Client,
    url: &str,
    refresh_token: String,
) -> Result<TokenPair, ApiError> {
    let resp = client
        .post(url)
        .json(&RefreshTokenRequest { refresh_token })
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
    decode(&finish(status, text)?)
}

fn finish(status: u16, text: String) -> Result<String, ApiError> {
    if (200..300).contains(&status) {
        Ok(text)
    } else {
        Err(ApiError::Http { status, body: text })
    }
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_endpoints_ignore_query_and_trailing_slash() {
        assert!(is_public("/auth/login"));
        assert!(is_public("/auth/refresh/"));
        assert!(is_public("/auth/verify-2fa?next=home"));
        assert!(!is_public("/auth/me"));
        assert!(!is_public("/auth/logout"));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let value: Option<StatusMessage> = decode("").unwrap();
        assert_eq!(value, None);
        assert!(decode::<()>("  ").is_ok());
    }

    #[test]
    fn non_success_keeps_body() {
        let err = finish(404, r#"{"detail":"Chat not found"}"#.into()).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.detail(), "Chat not found");
    }

    #[test]
    fn urls_join_base_and_path() {
        let api = ApiClient::new("http://localhost:8000/", TokenStore::in_memory());
        assert_eq!(api.url("/chats"), "http://localhost:8000/chats");
        assert_eq!(api.url("chats/3/messages"), "http://localhost:8000/chats/3/messages");
        assert_eq!(api.url("https://other/x"), "https://other/x");
    }
}
