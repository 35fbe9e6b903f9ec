//! Adapter over the popup backend.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{AuthObserver, IdentityAdapter, capture, deliver, unsupported};
use crate::backend::{FirebaseBackend, FirebaseListener, FirebaseUser, UpstreamProvider};
use crate::error::{BackendError, Result};
use crate::models::{AuthUser, ProviderKind};
use crate::subscription::Subscription;

const KIND: ProviderKind = ProviderKind::Firebase;

/// Client credentials for the upstream sources the popup backend supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamCredentials {
    pub google_client_id: Option<String>,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
}

impl UpstreamCredentials {
    /// Upstream sources known to this table.
    pub const SUPPORTED: [&'static str; 2] = ["google", "github"];

    /// Popup configuration for `name`, or `None` if the source is unknown.
    pub fn upstream(&self, name: &str) -> Option<UpstreamProvider> {
        match name {
            "google" => {
                let mut provider = UpstreamProvider::google().add_scope("email");
                if let Some(id) = &self.google_client_id {
                    provider = provider.custom_parameter("client_id", id);
                }
                Some(provider)
            }
            "github" => {
                let mut provider = UpstreamProvider::github();
                if let Some(id) = &self.github_client_id {
                    provider = provider.custom_parameter("client_id", id);
                }
                if let Some(secret) = &self.github_client_secret {
                    provider = provider.custom_parameter("client_secret", secret);
                }
                Some(provider)
            }
            _ => None,
        }
    }
}

impl From<&FirebaseUser> for AuthUser {
    fn from(user: &FirebaseUser) -> Self {
        Self {
            id: Some(user.uid.clone()),
            name: user.display_name.clone(),
            email: user.email.clone(),
            image: user.photo_url.clone(),
        }
    }
}

/// Variant A: forwards the backend's push stream.
pub struct FirebaseAdapter {
    backend: Arc<dyn FirebaseBackend>,
    upstreams: UpstreamCredentials,
}

impl FirebaseAdapter {
    pub fn new(backend: Arc<dyn FirebaseBackend>, upstreams: UpstreamCredentials) -> Self {
        Self { backend, upstreams }
    }
}

#[async_trait]
impl IdentityAdapter for FirebaseAdapter {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn sign_in(&self, provider: &str) -> Result<()> {
        let upstream = self
            .upstreams
            .upstream(provider)
            .ok_or_else(|| unsupported(KIND, provider))?;
        capture(KIND, "sign in", self.backend.sign_in_with_popup(&upstream)).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        capture(KIND, "sign out", self.backend.sign_out()).await
    }

    /// Takes one value off the change stream, then unsubscribes.
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let subscription = self
            .backend
            .on_auth_state_changed(Arc::new(move |user: &Option<FirebaseUser>| {
                if let Some(tx) = tx.lock().expect("lock poisoned").take() {
                    let _ = tx.send(user.as_ref().map(AuthUser::from));
                }
            }));

        let first = async {
            rx.await
                .map_err(|_| BackendError::Other("auth state stream closed".into()))
        };
        let result = capture(KIND, "get current user", first).await;
        subscription.unsubscribe();
        result
    }

    async fn on_auth_state_changed(&self, observer: AuthObserver) -> Subscription {
        let listener: FirebaseListener = Arc::new(move |user: &Option<FirebaseUser>| {
            deliver(KIND, &observer, user.as_ref().map(AuthUser::from));
        });
        self.backend.on_auth_state_changed(listener)
    }
}

impl std::fmt::Debug for FirebaseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAdapter")
            .field("upstreams", &UpstreamCredentials::SUPPORTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::subscription::ObserverSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal in-process popup backend.
    #[derive(Default)]
    struct FakeFirebase {
        current: Mutex<Option<FirebaseUser>>,
        listeners: ObserverSet<Option<FirebaseUser>>,
        popups: AtomicUsize,
        fail_sign_out: bool,
        last_upstream: Mutex<Option<UpstreamProvider>>,
    }

    fn user(uid: &str) -> FirebaseUser {
        FirebaseUser {
            uid: uid.into(),
            display_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            photo_url: None,
            provider_id: Some("google.com".into()),
            id_token: None,
            refresh_token: None,
        }
    }

    #[async_trait]
    impl FirebaseBackend for FakeFirebase {
        async fn sign_in_with_popup(
            &self,
            provider: &UpstreamProvider,
        ) -> std::result::Result<FirebaseUser, BackendError> {
            self.popups.fetch_add(1, Ordering::SeqCst);
            *self.last_upstream.lock().unwrap() = Some(provider.clone());
            let u = user("uid-1");
            *self.current.lock().unwrap() = Some(u.clone());
            self.listeners.notify(&Some(u.clone()));
            Ok(u)
        }

        async fn sign_out(&self) -> std::result::Result<(), BackendError> {
            if self.fail_sign_out {
                return Err(BackendError::Other("network down".into()));
            }
            *self.current.lock().unwrap() = None;
            self.listeners.notify(&None);
            Ok(())
        }

        fn on_auth_state_changed(&self, listener: FirebaseListener) -> Subscription {
            let sub = self.listeners.subscribe(Arc::clone(&listener));
            let current = self.current.lock().unwrap().clone();
            listener(&current);
            sub
        }
    }

    fn adapter(backend: Arc<FakeFirebase>) -> FirebaseAdapter {
        FirebaseAdapter::new(
            backend,
            UpstreamCredentials {
                google_client_id: Some("google-id".into()),
                github_client_id: Some("gh-id".into()),
                github_client_secret: Some("gh-secret".into()),
            },
        )
    }

    #[test]
    fn test_upstream_table() {
        let creds = UpstreamCredentials {
            google_client_id: Some("g".into()),
            github_client_id: Some("h".into()),
            github_client_secret: Some("s".into()),
        };
        let google = creds.upstream("google").unwrap();
        assert_eq!(google.provider_id, "google.com");
        assert_eq!(google.scopes, vec!["email".to_string()]);
        assert_eq!(google.custom_parameters["client_id"], "g");

        let github = creds.upstream("github").unwrap();
        assert_eq!(github.custom_parameters["client_secret"], "s");

        assert!(creds.upstream("twitter").is_none());
        assert!(creds.upstream("Google").is_none());
    }

    #[tokio::test]
    async fn test_unsupported_provider_never_reaches_backend() {
        let backend = Arc::new(FakeFirebase::default());
        let err = adapter(Arc::clone(&backend))
            .sign_in("twitter")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedProvider { ref provider, .. } if provider == "twitter"));
        assert_eq!(backend.popups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sign_in_passes_upstream_config() {
        let backend = Arc::new(FakeFirebase::default());
        adapter(Arc::clone(&backend)).sign_in("github").await.unwrap();
        let upstream = backend.last_upstream.lock().unwrap().clone().unwrap();
        assert_eq!(upstream.provider_id, "github.com");
        assert_eq!(upstream.custom_parameters["client_id"], "gh-id");
    }

    #[tokio::test]
    async fn test_current_user_takes_one_value_and_unsubscribes() {
        let backend = Arc::new(FakeFirebase::default());
        let adapter = adapter(Arc::clone(&backend));

        assert!(adapter.current_user().await.unwrap().is_none());
        adapter.sign_in("google").await.unwrap();

        let current = adapter.current_user().await.unwrap().unwrap();
        assert_eq!(current.id.as_deref(), Some("uid-1"));
        assert_eq!(current.name.as_deref(), Some("Ada"));
        assert!(backend.listeners.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_then_current_user_is_none() {
        let backend = Arc::new(FakeFirebase::default());
        let adapter = adapter(backend);
        adapter.sign_in("google").await.unwrap();
        adapter.sign_out().await.unwrap();
        assert!(adapter.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_failure_is_wrapped() {
        let backend = Arc::new(FakeFirebase {
            fail_sign_out: true,
            ..Default::default()
        });
        let err = adapter(backend).sign_out().await.unwrap_err();
        assert!(matches!(err, AuthError::Operation { ref operation, .. } if operation == "sign out"));
    }

    #[tokio::test]
    async fn test_observer_sees_registration_and_changes() {
        let backend = Arc::new(FakeFirebase::default());
        let adapter = adapter(Arc::clone(&backend));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = adapter
            .on_auth_state_changed(Arc::new(move |user: Option<AuthUser>| {
                s.lock().unwrap().push(user.map(|u| u.id.unwrap_or_default()));
            }))
            .await;

        adapter.sign_in("google").await.unwrap();
        sub.unsubscribe();
        adapter.sign_out().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![None, Some("uid-1".to_string())]);
    }
}
