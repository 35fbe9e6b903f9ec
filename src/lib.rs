//! Switchable authentication over two identity backends.
//!
//! An [`AuthOrchestrator`] keeps exactly one [`IdentityAdapter`] active,
//! remembers the choice through a [`ProviderSelector`], and publishes a
//! combined [`AuthSnapshot`] (active provider plus signed-in user) to its
//! observers. [`AuthContext`] is the read-side holder handed to consumers.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod selector;
pub mod store;
pub mod subscription;

pub use adapter::{
    AuthObserver, FirebaseAdapter, IdentityAdapter, NextAuthAdapter, SessionRefresh,
    UpstreamCredentials,
};
pub use context::AuthContext;
pub use error::{AuthError, BackendError, Result, StoreError};
pub use models::{AuthSnapshot, AuthUser, ProviderKind};
pub use orchestrator::{AdapterFactory, AuthOrchestrator, BackendFactory};
pub use selector::{PREFERENCE_KEY, ProviderSelector};
pub use subscription::{Callback, ObserverSet, Subscription};
