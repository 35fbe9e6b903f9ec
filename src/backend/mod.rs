//! Backing identity libraries.
//!
//! The adapters never speak to an identity service directly; they go through
//! one of the two contracts defined here:
//! - [`FirebaseBackend`] - popup sign-in with a push-based change stream
//! - [`SessionBackend`] - redirect sign-in with a pull-only session read
//!
//! [`FirebaseAuth`] and [`NextAuthClient`] are the HTTP implementations used
//! by the binary; tests substitute in-process fakes.

pub mod firebase;
pub mod nextauth;

pub use firebase::FirebaseAuth;
pub use nextauth::NextAuthClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BackendError;
use crate::subscription::{Callback, Subscription};

/// User object as the popup backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    /// Upstream issuer, e.g. `google.com`.
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing)]
    pub refresh_token: Option<String>,
}

/// Listener for the popup backend's change stream.
pub type FirebaseListener = Callback<Option<FirebaseUser>>;

/// Upstream credential issuer configuration handed to the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamProvider {
    /// Issuer id, e.g. `google.com` or `github.com`.
    pub provider_id: String,
    pub scopes: Vec<String>,
    pub custom_parameters: BTreeMap<String, String>,
}

impl UpstreamProvider {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            scopes: Vec::new(),
            custom_parameters: BTreeMap::new(),
        }
    }

    pub fn google() -> Self {
        Self::new("google.com")
    }

    pub fn github() -> Self {
        Self::new("github.com")
    }

    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn custom_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(key.into(), value.into());
        self
    }
}

/// Credential returned by the upstream issuer after the interactive step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdpCredential {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

/// The interactive half of a popup sign-in.
///
/// Implementations show the upstream consent screen and hand back the issued
/// credential, or [`BackendError::Cancelled`] if the user backs out.
#[async_trait]
pub trait PopupHandler: Send + Sync {
    async fn open(&self, provider: &UpstreamProvider) -> Result<IdpCredential, BackendError>;
}

/// Contract of the popup-based identity library.
#[async_trait]
pub trait FirebaseBackend: Send + Sync {
    /// Run the interactive exchange and establish a session.
    async fn sign_in_with_popup(
        &self,
        provider: &UpstreamProvider,
    ) -> Result<FirebaseUser, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Register a listener. It is called right away with the current user and
    /// again on every change until the subscription is cancelled.
    fn on_auth_state_changed(&self, listener: FirebaseListener) -> Subscription;
}

/// User portion of a server-issued session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Server-issued session as returned by the session endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub expires: Option<chrono::DateTime<chrono::Utc>>,
}

/// Contract of the session-cookie identity library.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Start a redirect-based sign-in with the named upstream source.
    async fn sign_in(&self, provider: &str) -> Result<(), BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Read the current session; `None` when signed out.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;
}
