//! Owns the active adapter and publishes the combined auth state.
//!
//! One [`AuthOrchestrator`] is built at start-up and cloned into consumers.
//! It holds exactly one adapter at a time, forwards the adapter's change
//! stream as [`AuthSnapshot`]s, and swaps adapters on
//! [`switch_provider`](AuthOrchestrator::switch_provider).
//!
//! Every adapter subscription is tagged with a generation number. A switch
//! bumps the generation before the new adapter is attached, so a late
//! notification from a detached adapter can never overwrite the new state.

use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::{
    AuthObserver, FirebaseAdapter, IdentityAdapter, NextAuthAdapter, SessionRefresh,
    UpstreamCredentials,
};
use crate::backend::{FirebaseBackend, SessionBackend};
use crate::error::{AuthError, Result};
use crate::models::{AuthSnapshot, AuthUser, ProviderKind};
use crate::selector::ProviderSelector;
use crate::subscription::{Callback, ObserverSet, Subscription};

// ---------------------------------------------------------------------------
// Adapter construction
// ---------------------------------------------------------------------------

/// Builds a fresh adapter for a provider kind.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, kind: ProviderKind) -> Result<Arc<dyn IdentityAdapter>>;
}

impl<F> AdapterFactory for F
where
    F: Fn(ProviderKind) -> Result<Arc<dyn IdentityAdapter>> + Send + Sync,
{
    fn create(&self, kind: ProviderKind) -> Result<Arc<dyn IdentityAdapter>> {
        self(kind)
    }
}

/// Factory over long-lived backends.
///
/// Backends are shared across switches; only the adapters wrapping them are
/// rebuilt. A kind without a backend yields [`AuthError::NotConfigured`].
#[derive(Default, Clone)]
pub struct BackendFactory {
    firebase: Option<(Arc<dyn FirebaseBackend>, UpstreamCredentials)>,
    nextauth: Option<(Arc<dyn SessionBackend>, SessionRefresh)>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_firebase(
        mut self,
        backend: Arc<dyn FirebaseBackend>,
        upstreams: UpstreamCredentials,
    ) -> Self {
        self.firebase = Some((backend, upstreams));
        self
    }

    pub fn with_nextauth(mut self, backend: Arc<dyn SessionBackend>, refresh: SessionRefresh) -> Self {
        self.nextauth = Some((backend, refresh));
        self
    }

    pub fn supports(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Firebase => self.firebase.is_some(),
            ProviderKind::NextAuth => self.nextauth.is_some(),
        }
    }
}

impl AdapterFactory for BackendFactory {
    fn create(&self, kind: ProviderKind) -> Result<Arc<dyn IdentityAdapter>> {
        match kind {
            ProviderKind::Firebase => {
                let (backend, upstreams) =
                    self.firebase.as_ref().ok_or(AuthError::NotConfigured(kind))?;
                Ok(Arc::new(FirebaseAdapter::new(
                    Arc::clone(backend),
                    upstreams.clone(),
                )))
            }
            ProviderKind::NextAuth => {
                let (backend, refresh) =
                    self.nextauth.as_ref().ok_or(AuthError::NotConfigured(kind))?;
                Ok(Arc::new(
                    NextAuthAdapter::new(Arc::clone(backend)).with_refresh(*refresh),
                ))
            }
        }
    }
}

impl std::fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactory")
            .field("firebase", &self.firebase.is_some())
            .field("nextauth", &self.nextauth.as_ref().map(|(_, r)| *r))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

struct ActiveAdapter {
    kind: ProviderKind,
    adapter: Arc<dyn IdentityAdapter>,
    subscription: Option<Subscription>,
}

struct State {
    generation: u64,
    snapshot: AuthSnapshot,
}

struct Inner {
    factory: Arc<dyn AdapterFactory>,
    selector: ProviderSelector,
    active: RwLock<ActiveAdapter>,
    state: Mutex<State>,
    tx: watch::Sender<AuthSnapshot>,
    observers: ObserverSet<AuthSnapshot>,
    /// Serializes switches, refreshes and close.
    switch_lock: tokio::sync::Mutex<()>,
    /// Held shared by sign-in and sign-out, exclusively by a switch.
    operations: tokio::sync::RwLock<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(subscription) = active.subscription.take() {
            debug!(provider = active.kind.token(), "Detaching adapter from dropped orchestrator");
            subscription.unsubscribe();
        }
    }
}

impl Inner {
    /// Apply a user reported by the adapter attached at `generation`.
    fn apply(&self, generation: u64, user: Option<AuthUser>) {
        let snapshot = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.generation != generation {
                debug!(
                    generation,
                    current = state.generation,
                    "Dropping notification from detached adapter"
                );
                return;
            }
            state.snapshot = AuthSnapshot {
                provider: state.snapshot.provider,
                user,
            };
            self.tx.send_replace(state.snapshot.clone());
            state.snapshot.clone()
        };
        self.observers.notify(&snapshot);
    }

    /// Start a new generation for `kind` with nobody signed in.
    fn reset(&self, kind: ProviderKind) -> u64 {
        let (generation, snapshot) = {
            let mut state = self.state.lock().expect("lock poisoned");
            state.generation += 1;
            state.snapshot = AuthSnapshot::signed_out(kind);
            self.tx.send_replace(state.snapshot.clone());
            (state.generation, state.snapshot.clone())
        };
        self.observers.notify(&snapshot);
        generation
    }

    fn generation(&self) -> u64 {
        self.state.lock().expect("lock poisoned").generation
    }

    fn adapter(&self) -> Arc<dyn IdentityAdapter> {
        Arc::clone(&self.active.read().expect("lock poisoned").adapter)
    }

    fn take_subscription(&self) -> Option<Subscription> {
        self.active
            .write()
            .expect("lock poisoned")
            .subscription
            .take()
    }
}

/// Attach `adapter` under `generation`. Runs without any orchestrator lock
/// held since push-based adapters notify during registration.
async fn attach(
    inner: &Arc<Inner>,
    adapter: &dyn IdentityAdapter,
    generation: u64,
) -> Subscription {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let observer: AuthObserver = Arc::new(move |user: Option<AuthUser>| {
        if let Some(inner) = weak.upgrade() {
            inner.apply(generation, user);
        }
    });
    adapter.on_auth_state_changed(observer).await
}

/// Cheap-to-clone handle over the active identity adapter.
#[derive(Clone)]
pub struct AuthOrchestrator {
    inner: Arc<Inner>,
}

impl AuthOrchestrator {
    /// Read the persisted choice, build that adapter and subscribe to it.
    ///
    /// If the persisted kind cannot be built, falls back to the default kind.
    pub async fn initialize(
        factory: Arc<dyn AdapterFactory>,
        selector: ProviderSelector,
    ) -> Result<Self> {
        let mut kind = selector.read();
        let adapter = match factory.create(kind) {
            Ok(adapter) => adapter,
            Err(e) if kind != ProviderKind::default() => {
                warn!(provider = kind.token(), error = %e, "Stored provider unavailable, using default");
                kind = ProviderKind::default();
                factory.create(kind)?
            }
            Err(e) => return Err(e),
        };

        let snapshot = AuthSnapshot::signed_out(kind);
        let (tx, _rx) = watch::channel(snapshot.clone());
        let inner = Arc::new(Inner {
            factory,
            selector,
            active: RwLock::new(ActiveAdapter {
                kind,
                adapter: Arc::clone(&adapter),
                subscription: None,
            }),
            state: Mutex::new(State {
                generation: 0,
                snapshot,
            }),
            tx,
            observers: ObserverSet::new(),
            switch_lock: tokio::sync::Mutex::new(()),
            operations: tokio::sync::RwLock::new(()),
        });

        let subscription = attach(&inner, adapter.as_ref(), 0).await;
        inner.active.write().expect("lock poisoned").subscription = Some(subscription);

        info!(provider = kind.token(), "Auth orchestrator initialized");
        Ok(Self { inner })
    }

    /// Replace the active adapter with one for `kind`.
    ///
    /// A no-op when `kind` is already active. Otherwise signs out of the
    /// current adapter (failures are logged, not returned), detaches it,
    /// persists the choice and attaches the new adapter. The published state
    /// resets to signed-out for `kind` until the new adapter reports.
    ///
    /// Waits for in-flight sign-ins and sign-outs to finish first, so a popup
    /// that completes mid-switch is still signed out of the old adapter.
    pub async fn switch_provider(&self, kind: ProviderKind) -> Result<()> {
        let _guard = self.inner.switch_lock.lock().await;

        let (from, old) = {
            let active = self.inner.active.read().expect("lock poisoned");
            (active.kind, Arc::clone(&active.adapter))
        };
        if from == kind {
            debug!(provider = kind.token(), "Provider already active");
            return Ok(());
        }

        // Built first so an unconfigured kind leaves everything untouched.
        let adapter = self.inner.factory.create(kind)?;
        let _operations = self.inner.operations.write().await;
        info!(from = from.token(), to = kind.token(), "Switching auth provider");

        if let Err(e) = old.sign_out().await {
            warn!(provider = from.token(), error = %e, "Sign-out during provider switch failed");
        }
        if let Some(subscription) = self.inner.take_subscription() {
            subscription.unsubscribe();
        }
        self.inner.selector.write(kind);

        let generation = self.inner.reset(kind);
        {
            let mut active = self.inner.active.write().expect("lock poisoned");
            active.kind = kind;
            active.adapter = Arc::clone(&adapter);
        }

        let subscription = attach(&self.inner, adapter.as_ref(), generation).await;
        self.inner.active.write().expect("lock poisoned").subscription = Some(subscription);
        Ok(())
    }

    /// Start a sign-in with the named upstream source on the active adapter.
    ///
    /// State changes arrive through the adapter's notifications.
    pub async fn sign_in(&self, provider: &str) -> Result<()> {
        let _operations = self.inner.operations.read().await;
        self.inner.adapter().sign_in(provider).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        let _operations = self.inner.operations.read().await;
        self.inner.adapter().sign_out().await
    }

    /// Read the active adapter's session directly.
    pub async fn current_user(&self) -> Result<Option<AuthUser>> {
        self.inner.adapter().current_user().await
    }

    /// Re-read the active adapter's session and publish it.
    pub async fn refresh(&self) -> Result<Option<AuthUser>> {
        let _guard = self.inner.switch_lock.lock().await;
        let generation = self.inner.generation();
        let user = self.inner.adapter().current_user().await?;
        self.inner.apply(generation, user.clone());
        Ok(user)
    }

    /// Register an observer of published snapshots.
    ///
    /// New observers get the next change, not the current value.
    pub fn on_auth_state_changed(&self, callback: Callback<AuthSnapshot>) -> Subscription {
        self.inner.observers.subscribe(callback)
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.tx.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.lock().expect("lock poisoned").snapshot.clone()
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.snapshot().user
    }

    pub fn provider(&self) -> ProviderKind {
        self.snapshot().provider
    }

    /// Detach from the active adapter. Later notifications are ignored.
    pub async fn close(&self) {
        let _guard = self.inner.switch_lock.lock().await;
        if let Some(subscription) = self.inner.take_subscription() {
            subscription.unsubscribe();
        }
        self.inner.state.lock().expect("lock poisoned").generation += 1;
        debug!("Auth orchestrator closed");
    }
}

impl std::fmt::Debug for AuthOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOrchestrator")
            .field("snapshot", &self.snapshot())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}
