//! Consumer-facing view of the orchestrator.

use std::sync::RwLock;

use crate::error::{AuthError, Result};
use crate::models::{AuthSnapshot, AuthUser, ProviderKind};
use crate::orchestrator::AuthOrchestrator;
use crate::subscription::{Callback, Subscription};

/// Explicit holder for the application's [`AuthOrchestrator`].
///
/// Constructed empty and bound once with [`provide`](Self::provide). Every
/// accessor fails with [`AuthError::Uninitialized`] until then.
#[derive(Debug, Default)]
pub struct AuthContext {
    orchestrator: RwLock<Option<AuthOrchestrator>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the context. A second call replaces the previous orchestrator.
    pub fn provide(&self, orchestrator: AuthOrchestrator) {
        *self.orchestrator.write().expect("lock poisoned") = Some(orchestrator);
    }

    pub fn is_provided(&self) -> bool {
        self.orchestrator.read().expect("lock poisoned").is_some()
    }

    fn get(&self) -> Result<AuthOrchestrator> {
        self.orchestrator
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or(AuthError::Uninitialized)
    }

    /// Provider and user as last published.
    pub fn snapshot(&self) -> Result<AuthSnapshot> {
        Ok(self.get()?.snapshot())
    }

    /// The signed-in user as last published.
    pub fn user(&self) -> Result<Option<AuthUser>> {
        Ok(self.get()?.user())
    }

    /// Label of the active provider, e.g. `"NextAuth"`.
    pub fn provider_label(&self) -> Result<&'static str> {
        Ok(self.get()?.provider().label())
    }

    pub async fn sign_in(&self, provider: &str) -> Result<()> {
        self.get()?.sign_in(provider).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.get()?.sign_out().await
    }

    pub async fn current_user(&self) -> Result<Option<AuthUser>> {
        self.get()?.current_user().await
    }

    /// Re-read the active session and publish it.
    pub async fn refresh(&self) -> Result<Option<AuthUser>> {
        self.get()?.refresh().await
    }

    pub async fn switch_provider(&self, kind: ProviderKind) -> Result<()> {
        self.get()?.switch_provider(kind).await
    }

    pub fn on_auth_state_changed(&self, callback: Callback<AuthSnapshot>) -> Result<Subscription> {
        Ok(self.get()?.on_auth_state_changed(callback))
    }
}
