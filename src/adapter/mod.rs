//! The identity provider capability and its two variants.
//!
//! - [`FirebaseAdapter`] wraps a [`FirebaseBackend`](crate::backend::FirebaseBackend):
//!   push-based, notifies on registration and on every change.
//! - [`NextAuthAdapter`] wraps a [`SessionBackend`](crate::backend::SessionBackend):
//!   pull-based, reads the session once on registration. How it follows
//!   later changes is chosen with [`SessionRefresh`].

pub mod firebase;
pub mod nextauth;

pub use firebase::{FirebaseAdapter, UpstreamCredentials};
pub use nextauth::{NextAuthAdapter, SessionRefresh};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::error::{AuthError, BackendError, Result};
use crate::models::{AuthUser, ProviderKind};
use crate::subscription::{Subscription, call_guarded};

/// Observer of normalized auth state.
pub type AuthObserver = Arc<dyn Fn(Option<AuthUser>) + Send + Sync>;

/// Capability every identity backend satisfies.
#[async_trait]
pub trait IdentityAdapter: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> ProviderKind;

    /// Start an interactive sign-in with the named upstream source
    /// (e.g. `"google"`, `"github"`).
    async fn sign_in(&self, provider: &str) -> Result<()>;

    /// End the backing session. Succeeds when there is no session.
    async fn sign_out(&self) -> Result<()>;

    /// Read the backing session; `Ok(None)` when signed out.
    async fn current_user(&self) -> Result<Option<AuthUser>>;

    /// Register an observer for auth state changes. Never fails; observer
    /// panics are caught and logged.
    async fn on_auth_state_changed(&self, observer: AuthObserver) -> Subscription;
}

/// Await a backend call, logging and wrapping its failure.
///
/// Both variants route every backend call through here so failures are
/// logged exactly once, at the point of capture.
pub(crate) async fn capture<T, F>(backend: ProviderKind, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    call.await.map_err(|source| {
        error!(backend = %backend, operation, error = %source, "Auth operation failed");
        AuthError::Operation {
            backend,
            operation: operation.to_string(),
            source,
        }
    })
}

/// Build and log an unsupported-provider error.
pub(crate) fn unsupported(backend: ProviderKind, provider: &str) -> AuthError {
    error!(backend = %backend, provider, "Upstream provider not supported");
    AuthError::UnsupportedProvider {
        provider: provider.to_string(),
        backend,
    }
}

/// Hand a normalized value to an observer without letting it unwind.
pub(crate) fn deliver(backend: ProviderKind, observer: &AuthObserver, user: Option<AuthUser>) {
    call_guarded(backend.label(), || observer(user));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_wraps_backend_error() {
        let result: Result<()> = capture(ProviderKind::NextAuth, "sign out", async {
            Err(BackendError::Api {
                status: 502,
                message: "bad gateway".into(),
            })
        })
        .await;

        match result {
            Err(AuthError::Operation {
                backend,
                operation,
                source: BackendError::Api { status, .. },
            }) => {
                assert_eq!(backend, ProviderKind::NextAuth);
                assert_eq!(operation, "sign out");
                assert_eq!(status, 502);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_passes_success_through() {
        let value = capture(ProviderKind::Firebase, "read", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_deliver_contains_panics() {
        let observer: AuthObserver = Arc::new(|_: Option<AuthUser>| panic!("observer bug"));
        deliver(ProviderKind::Firebase, &observer, None);
    }
}
