//! NextAuth session client over its REST routes.
//!
//! Routes used, relative to the auth base (default `/api/auth/`):
//! - `GET  csrf`               -> `{"csrfToken": "..."}`
//! - `POST signin/{provider}`  -> `{"url": "<redirect>"}` with `json=true`
//! - `GET  session`            -> session object, or `{}` when signed out
//! - `POST signout`            -> `{"url": "<redirect>"}` with `json=true`

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::firebase::with_trailing_slash;
use super::{Session, SessionBackend};
use crate::error::BackendError;

/// Receives the URL the browser should be sent to after a sign-in request.
pub type RedirectHandler = Arc<dyn Fn(&Url) + Send + Sync>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfResponse {
    csrf_token: String,
}

#[derive(Debug, Deserialize)]
struct RedirectResponse {
    url: String,
}

/// Cookie-holding client for a NextAuth server.
pub struct NextAuthClient {
    http: reqwest::Client,
    base: Url,
    callback_url: String,
    on_redirect: RedirectHandler,
}

impl NextAuthClient {
    /// Create a client for the auth routes under `base`
    /// (e.g. `http://localhost:3000/api/auth`).
    ///
    /// Fails if the cookie-holding HTTP client cannot be built. Without the
    /// cookie jar every session would read as signed out.
    pub fn new(base: Url) -> Result<Self, BackendError> {
        let callback_url = base.origin().ascii_serialization();
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base: with_trailing_slash(base),
            callback_url,
            on_redirect: Arc::new(|url: &Url| {
                info!(url = %url, "Continue sign-in in the browser");
            }),
        })
    }

    /// Page the server redirects back to after sign-in / sign-out.
    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = callback_url.into();
        self
    }

    pub fn with_redirect_handler(mut self, handler: RedirectHandler) -> Self {
        self.on_redirect = handler;
        self
    }

    /// Set the HTTP client. It must keep cookies for sessions to stick.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn route(&self, route: &str) -> Result<Url, BackendError> {
        self.base
            .join(route)
            .map_err(|e| BackendError::Other(format!("Invalid NextAuth route '{route}': {e}")))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(BackendError::Api { status, message })
    }

    async fn csrf_token(&self) -> Result<String, BackendError> {
        let response = self.http.get(self.route("csrf")?).send().await?;
        let data: CsrfResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("csrf response: {e}")))?;
        Ok(data.csrf_token)
    }

    async fn post_action(&self, route: &str) -> Result<Url, BackendError> {
        let csrf_token = self.csrf_token().await?;
        let form = [
            ("csrfToken", csrf_token.as_str()),
            ("callbackUrl", self.callback_url.as_str()),
            ("json", "true"),
        ];
        let response = self.http.post(self.route(route)?).form(&form).send().await?;
        let data: RedirectResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("{route} response: {e}")))?;

        // Relative redirects resolve against the server origin.
        self.base
            .join(&data.url)
            .map_err(|e| BackendError::Decode(format!("redirect url '{}': {e}", data.url)))
    }
}

#[async_trait]
impl SessionBackend for NextAuthClient {
    async fn sign_in(&self, provider: &str) -> Result<(), BackendError> {
        let route = format!("signin/{}", urlencoding::encode(provider));
        let redirect = self.post_action(&route).await?;

        if let Some((_, error)) = redirect.query_pairs().find(|(k, _)| k == "error") {
            return Err(BackendError::Other(format!("Sign-in rejected: {error}")));
        }

        debug!(provider, url = %redirect, "NextAuth sign-in redirect");
        (self.on_redirect)(&redirect);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.post_action("signout").await?;
        debug!("NextAuth session ended");
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let response = self.http.get(self.route("session")?).send().await?;
        let body: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("session response: {e}")))?;
        parse_session(body)
    }
}

impl std::fmt::Debug for NextAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextAuthClient")
            .field("base", &self.base.as_str())
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// `null`, `{}` and sessions without a user all mean "signed out".
fn parse_session(body: serde_json::Value) -> Result<Option<Session>, BackendError> {
    match &body {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => return Ok(None),
        _ => {}
    }
    let session: Session = serde_json::from_value(body)?;
    if session.user.is_none() {
        return Ok(None);
    }
    Ok(Some(session))
}
