//! In-process backends shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use authswitch::backend::{
    FirebaseBackend, FirebaseListener, FirebaseUser, Session, SessionBackend, SessionUser,
    UpstreamProvider,
};
use authswitch::store::{MemoryPreferenceStore, PreferenceStore};
use authswitch::{
    AuthOrchestrator, AuthSnapshot, BackendError, BackendFactory, ObserverSet, ProviderSelector,
    SessionRefresh, Subscription, UpstreamCredentials,
};

pub const FIREBASE_USER: &str = "firebase-user";
pub const SESSION_USER: &str = "session-user";

/// Popup backend that signs in instantly and pushes every change.
#[derive(Default)]
pub struct FakeFirebase {
    current: Mutex<Option<FirebaseUser>>,
    listeners: ObserverSet<Option<FirebaseUser>>,
    pub popups: AtomicUsize,
    pub sign_outs: AtomicUsize,
    pub registrations: AtomicUsize,
}

impl FakeFirebase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signed_in(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn set(&self, user: Option<FirebaseUser>) {
        *self.current.lock().unwrap() = user.clone();
        self.listeners.notify(&user);
    }
}

#[async_trait]
impl FirebaseBackend for FakeFirebase {
    async fn sign_in_with_popup(
        &self,
        provider: &UpstreamProvider,
    ) -> Result<FirebaseUser, BackendError> {
        self.popups.fetch_add(1, Ordering::SeqCst);
        let user = FirebaseUser {
            uid: format!("uid-{}", provider.provider_id),
            display_name: Some(FIREBASE_USER.into()),
            email: None,
            photo_url: None,
            provider_id: Some(provider.provider_id.clone()),
            id_token: None,
            refresh_token: None,
        };
        self.set(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.set(None);
        Ok(())
    }

    fn on_auth_state_changed(&self, listener: FirebaseListener) -> Subscription {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let subscription = self.listeners.subscribe(Arc::clone(&listener));
        let current = self.current.lock().unwrap().clone();
        listener(&current);
        subscription
    }
}

/// Session backend holding one server-side session.
#[derive(Default)]
pub struct FakeSessions {
    user: Mutex<Option<SessionUser>>,
    pub sign_ins: AtomicUsize,
    pub sign_outs: AtomicUsize,
    pub reads: AtomicUsize,
}

impl FakeSessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_session() -> Arc<Self> {
        let sessions = Self::new();
        sessions.establish();
        sessions
    }

    pub fn establish(&self) {
        *self.user.lock().unwrap() = Some(SessionUser {
            id: Some("42".into()),
            name: Some(SESSION_USER.into()),
            email: Some("session@example.com".into()),
            image: None,
        });
    }
}

#[async_trait]
impl SessionBackend for FakeSessions {
    async fn sign_in(&self, _provider: &str) -> Result<(), BackendError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        self.establish();
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.user.lock().unwrap() = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.user.lock().unwrap().clone().map(|user| Session {
            user: Some(user),
            expires: None,
        }))
    }
}

pub fn factory(
    firebase: &Arc<FakeFirebase>,
    sessions: &Arc<FakeSessions>,
    refresh: SessionRefresh,
) -> Arc<BackendFactory> {
    Arc::new(
        BackendFactory::new()
            .with_firebase(
                Arc::clone(firebase) as Arc<dyn FirebaseBackend>,
                UpstreamCredentials::default(),
            )
            .with_nextauth(Arc::clone(sessions) as Arc<dyn SessionBackend>, refresh),
    )
}

pub async fn orchestrator(
    firebase: &Arc<FakeFirebase>,
    sessions: &Arc<FakeSessions>,
    store: Arc<dyn PreferenceStore>,
) -> AuthOrchestrator {
    AuthOrchestrator::initialize(
        factory(firebase, sessions, SessionRefresh::Manual),
        ProviderSelector::new(store),
    )
    .await
    .unwrap()
}

pub fn memory_store() -> Arc<MemoryPreferenceStore> {
    Arc::new(MemoryPreferenceStore::new())
}

/// Record every published snapshot.
pub fn record(orchestrator: &AuthOrchestrator) -> (Arc<Mutex<Vec<AuthSnapshot>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let subscription = orchestrator.on_auth_state_changed(Arc::new(move |snap: &AuthSnapshot| {
        s.lock().unwrap().push(snap.clone());
    }));
    (seen, subscription)
}
