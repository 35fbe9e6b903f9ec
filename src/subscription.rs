//! Observer registration and cancellation handles.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::error;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle for one observer registration.
///
/// `unsubscribe` may be called any number of times; only the first call has
/// an effect. Dropping the handle does not cancel the registration.
pub struct Subscription {
    cancel: Mutex<Option<CancelFn>>,
}

impl Subscription {
    /// Wrap a cancellation routine.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Cancel the registration.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().expect("lock poisoned").take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether a cancellation routine is still pending.
    pub fn is_active(&self) -> bool {
        self.cancel.lock().expect("lock poisoned").is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Callback stored in an [`ObserverSet`].
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// A set of callbacks notified in registration order.
///
/// Callbacks run without the internal lock held, so a callback may register
/// or cancel observers (itself included). A callback cancelled while a
/// notification is in flight is skipped.
pub struct ObserverSet<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> ObserverSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback; the returned handle removes it.
    pub fn subscribe(&self, callback: Callback<T>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut registry = self.inner.lock().expect("lock poisoned");
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push(Entry {
                id,
                active: Arc::clone(&active),
                callback,
            });
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .expect("lock poisoned")
                    .entries
                    .retain(|entry| entry.id != id);
            }
        })
    }

    /// Invoke every live callback with `value`.
    pub fn notify(&self, value: &T) {
        let targets: Vec<(Arc<AtomicBool>, Callback<T>)> = {
            let registry = self.inner.lock().expect("lock poisoned");
            registry
                .entries
                .iter()
                .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.callback)))
                .collect()
        };

        for (active, callback) in targets {
            if active.load(Ordering::SeqCst) {
                call_guarded("observer", || callback(value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObserverSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ObserverSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.inner.lock().map(|r| r.entries.len()).unwrap_or(0);
        f.debug_struct("ObserverSet").field("observers", &len).finish()
    }
}

/// Run a callback, logging instead of unwinding if it panics.
pub(crate) fn call_guarded(context: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(context, panic = %message, "Auth state callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Callback<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &u32| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_subscription() {
        let sub = Subscription::noop();
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn test_cancelled_observer_not_notified() {
        let set = ObserverSet::new();
        let (a_count, a) = counter();
        let (b_count, b) = counter();
        let sub_a = set.subscribe(a);
        let _sub_b = set.subscribe(b);

        set.notify(&1);
        sub_a.unsubscribe();
        set.notify(&2);

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_observer_can_cancel_itself_during_notify() {
        let set: ObserverSet<u32> = ObserverSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&slot);
        let c = Arc::clone(&calls);
        let sub = set.subscribe(Arc::new(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        }));
        *slot.lock().unwrap() = Some(sub);

        set.notify(&1);
        set.notify(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_cancel_after_set_dropped() {
        let set: ObserverSet<u32> = ObserverSet::new();
        let (_, cb) = counter();
        let sub = set.subscribe(cb);
        drop(set);
        sub.unsubscribe();
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let set: ObserverSet<u32> = ObserverSet::new();
        let _bad = set.subscribe(Arc::new(|_: &u32| panic!("observer bug")));
        let (count, good) = counter();
        let _good = set.subscribe(good);

        set.notify(&7);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
