//! Firebase Authentication over the Identity Toolkit REST API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use url::Url;

use super::{
    FirebaseBackend, FirebaseListener, FirebaseUser, IdpCredential, PopupHandler,
    UpstreamProvider,
};
use crate::error::BackendError;
use crate::subscription::{ObserverSet, Subscription, call_guarded};

/// Default Identity Toolkit base URL.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/";

/// Default `requestUri` sent with IdP sign-ins.
pub const DEFAULT_REQUEST_URI: &str = "http://localhost";

/// Response of `accounts:signInWithIdp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// In-process Firebase auth instance.
///
/// Holds the signed-in user and a listener set. The interactive part of a
/// popup sign-in is delegated to a [`PopupHandler`]; the credential it returns
/// is exchanged for a Firebase user with `accounts:signInWithIdp`.
pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
    endpoint: Url,
    request_uri: String,
    popup: Arc<dyn PopupHandler>,
    current: Mutex<Option<FirebaseUser>>,
    listeners: ObserverSet<Option<FirebaseUser>>,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>, popup: Arc<dyn PopupHandler>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            // Constant URL; parsing cannot fail.
            endpoint: Url::parse(IDENTITY_TOOLKIT_URL).expect("valid identity toolkit url"),
            request_uri: DEFAULT_REQUEST_URI.to_string(),
            popup,
            current: Mutex::new(None),
            listeners: ObserverSet::new(),
        }
    }

    /// Point the client at another Identity Toolkit host (emulator, tests).
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = with_trailing_slash(endpoint);
        self
    }

    pub fn with_request_uri(mut self, request_uri: impl Into<String>) -> Self {
        self.request_uri = request_uri.into();
        self
    }

    /// Set the HTTP client (useful for testing or custom TLS config).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Synchronous view of the signed-in user.
    pub fn current_user(&self) -> Option<FirebaseUser> {
        self.current.lock().expect("lock poisoned").clone()
    }

    /// Replace the signed-in user, notifying listeners when it changed.
    fn set_current(&self, user: Option<FirebaseUser>) {
        let changed = {
            let mut current = self.current.lock().expect("lock poisoned");
            if *current == user {
                false
            } else {
                *current = user.clone();
                true
            }
        };
        if changed {
            debug!(signed_in = user.is_some(), "Firebase auth state changed");
            self.listeners.notify(&user);
        }
    }

    async fn sign_in_with_idp(
        &self,
        provider: &UpstreamProvider,
        credential: &IdpCredential,
    ) -> Result<FirebaseUser, BackendError> {
        let post_body = post_body(provider, credential)?;
        let mut url = self
            .endpoint
            // `./` keeps the colon from being read as a URL scheme.
            .join("./accounts:signInWithIdp")
            .map_err(|e| BackendError::Other(format!("Invalid Identity Toolkit URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let payload = serde_json::json!({
            "postBody": post_body,
            "requestUri": self.request_uri,
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });

        let response = self.http.post(url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BackendError::Api { status, message });
        }

        let data: SignInWithIdpResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("signInWithIdp response: {e}")))?;

        Ok(FirebaseUser {
            uid: data.local_id,
            display_name: data.display_name.or(data.full_name),
            email: data.email,
            photo_url: data.photo_url,
            provider_id: data.provider_id.or_else(|| Some(provider.provider_id.clone())),
            id_token: data.id_token,
            refresh_token: data.refresh_token,
        })
    }
}

#[async_trait]
impl FirebaseBackend for FirebaseAuth {
    async fn sign_in_with_popup(
        &self,
        provider: &UpstreamProvider,
    ) -> Result<FirebaseUser, BackendError> {
        let credential = self.popup.open(provider).await?;
        let user = self.sign_in_with_idp(provider, &credential).await?;
        info!(provider = %provider.provider_id, uid = %user.uid, "Firebase sign-in complete");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_current(None);
        Ok(())
    }

    fn on_auth_state_changed(&self, listener: FirebaseListener) -> Subscription {
        let subscription = self.listeners.subscribe(Arc::clone(&listener));
        let current = self.current_user();
        call_guarded("firebase listener", || listener(&current));
        subscription
    }
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("endpoint", &self.endpoint.as_str())
            .field("request_uri", &self.request_uri)
            .field("signed_in", &self.current_user().is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Form-encoded `postBody` for `signInWithIdp`.
fn post_body(provider: &UpstreamProvider, credential: &IdpCredential) -> Result<String, BackendError> {
    let mut parts = Vec::new();
    if let Some(token) = &credential.id_token {
        parts.push(format!("id_token={}", urlencoding::encode(token)));
    }
    if let Some(token) = &credential.access_token {
        parts.push(format!("access_token={}", urlencoding::encode(token)));
    }
    if parts.is_empty() {
        return Err(BackendError::Other(format!(
            "{} returned no credential",
            provider.provider_id
        )));
    }
    parts.push(format!(
        "providerId={}",
        urlencoding::encode(&provider.provider_id)
    ));
    Ok(parts.join("&"))
}

pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
