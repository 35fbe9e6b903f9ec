//! Adapter over the server-session backend.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AuthObserver, IdentityAdapter, capture, deliver};
use crate::backend::{SessionBackend, SessionUser};
use crate::error::Result;
use crate::models::{AuthUser, ProviderKind};
use crate::subscription::{ObserverSet, Subscription};

const KIND: ProviderKind = ProviderKind::NextAuth;

/// How the session adapter follows changes after the initial read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionRefresh {
    /// Read once on registration; callers re-query explicitly.
    #[default]
    Manual,
    /// Re-read after this adapter's own sign-in and sign-out.
    AfterOperations,
    /// Re-read on a fixed interval while subscribed.
    Poll(Duration),
}

impl From<SessionUser> for AuthUser {
    fn from(user: SessionUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

/// Variant B: pull-based, backed by a session read.
pub struct NextAuthAdapter {
    backend: Arc<dyn SessionBackend>,
    refresh: SessionRefresh,
    observers: ObserverSet<Option<AuthUser>>,
    /// Last value handed to `observers`; `None` until the first read.
    last_seen: Mutex<Option<Option<AuthUser>>>,
}

impl NextAuthAdapter {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            refresh: SessionRefresh::Manual,
            observers: ObserverSet::new(),
            last_seen: Mutex::new(None),
        }
    }

    pub fn with_refresh(mut self, refresh: SessionRefresh) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn refresh_mode(&self) -> SessionRefresh {
        self.refresh
    }

    async fn read_user(&self) -> Result<Option<AuthUser>> {
        read_user(self.backend.as_ref()).await
    }

    /// Re-read the session and notify kept observers if it changed.
    async fn resync(&self) {
        if self.refresh != SessionRefresh::AfterOperations || self.observers.is_empty() {
            return;
        }
        let user = match self.read_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Session re-read after operation failed");
                return;
            }
        };
        let changed = {
            let mut last = self.last_seen.lock().expect("lock poisoned");
            if last.as_ref() == Some(&user) {
                false
            } else {
                *last = Some(user.clone());
                true
            }
        };
        if changed {
            debug!(signed_in = user.is_some(), "Session changed after operation");
            self.observers.notify(&user);
        }
    }
}

async fn read_user(backend: &dyn SessionBackend) -> Result<Option<AuthUser>> {
    let session = capture(KIND, "get session", backend.get_session()).await?;
    Ok(session.and_then(|s| s.user).map(AuthUser::from))
}

#[async_trait]
impl IdentityAdapter for NextAuthAdapter {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn sign_in(&self, provider: &str) -> Result<()> {
        capture(KIND, "sign in", self.backend.sign_in(provider)).await?;
        self.resync().await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        capture(KIND, "sign out", self.backend.sign_out()).await?;
        self.resync().await;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>> {
        self.read_user().await
    }

    /// Reads the session once and reports it. A failed read is logged and
    /// the observer is not called.
    async fn on_auth_state_changed(&self, observer: AuthObserver) -> Subscription {
        let initial = self.read_user().await.ok();
        if let Some(user) = &initial {
            deliver(KIND, &observer, user.clone());
        }

        match self.refresh {
            SessionRefresh::Manual => Subscription::noop(),
            SessionRefresh::AfterOperations => {
                if let Some(user) = initial {
                    *self.last_seen.lock().expect("lock poisoned") = Some(user);
                }
                self.observers.subscribe(Arc::new(move |user: &Option<AuthUser>| {
                    observer(user.clone());
                }))
            }
            SessionRefresh::Poll(interval) => {
                let backend = Arc::clone(&self.backend);
                let handle = tokio::spawn(poll_session(backend, observer, interval, initial));
                Subscription::new(move || handle.abort())
            }
        }
    }
}

async fn poll_session(
    backend: Arc<dyn SessionBackend>,
    observer: AuthObserver,
    interval: Duration,
    mut last: Option<Option<AuthUser>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial read already covered it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let user = match read_user(backend.as_ref()).await {
            Ok(user) => user,
            Err(_) => continue,
        };
        if last.as_ref() != Some(&user) {
            debug!(signed_in = user.is_some(), "Polled session changed");
            last = Some(user.clone());
            deliver(KIND, &observer, user);
        }
    }
}

impl std::fmt::Debug for NextAuthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextAuthAdapter")
            .field("refresh", &self.refresh)
            .field("observers", &self.observers.len())
            .finish()
    }
}
