use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use log::debug;

use super::controller::{FormController, FormResult, read_lock, write_lock};
use super::path::{FieldPath, IntoFieldPath};
use super::value::{FieldValue, FormValues};

pub(super) type WatchCallback = Arc<dyn Fn(&FieldValue) + Send + Sync>;

struct Listener {
    id: u64,
    scope: Option<FieldPath>,
    active: Arc<AtomicBool>,
    callback: WatchCallback,
}

#[derive(Default)]
pub(super) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Handle returned by the push-mode watchers.
///
/// Dropping the handle keeps the listener alive; call
/// [`Subscription::unsubscribe`] to stop it.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<RwLock<ListenerRegistry>>,
}

impl Subscription {
    /// Stops the listener. Safe to call repeatedly; once it returns the
    /// callback is never invoked again, even by a notification in progress.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = match registry.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            registry.listeners.retain(|listener| listener.id != self.id);
        }
        debug!("watch subscription {} removed", self.id);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl FormController {
    /// Current value at `path`, or `None` if it does not resolve.
    pub fn watch(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldValue>> {
        self.value(path)
    }

    /// Current value of the whole form.
    pub fn watch_all(&self) -> FormResult<FormValues> {
        self.values()
    }

    /// Calls `callback` with the value at `path` after every committed change
    /// that touches it.
    pub fn watch_with<F>(&self, path: impl IntoFieldPath, callback: F) -> FormResult<Subscription>
    where
        F: Fn(&FieldValue) + Send + Sync + 'static,
    {
        let path = path.into_field_path()?;
        let path = self.canonical_path(&path)?.unwrap_or(path);
        self.subscribe(Some(path), Arc::new(callback))
    }

    /// Calls `callback` with the whole value tree after every committed change.
    pub fn watch_all_with<F>(&self, callback: F) -> FormResult<Subscription>
    where
        F: Fn(&FieldValue) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(callback))
    }

    fn subscribe(
        &self,
        scope: Option<FieldPath>,
        callback: WatchCallback,
    ) -> FormResult<Subscription> {
        let mut registry = write_lock(&self.listeners, "registering watch listener")?;
        registry.next_id += 1;
        let id = registry.next_id;
        let active = Arc::new(AtomicBool::new(true));
        registry.listeners.push(Listener {
            id,
            scope,
            active: active.clone(),
            callback,
        });
        debug!("watch subscription {id} added");
        Ok(Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.listeners),
        })
    }

    /// Delivers a committed change at `changed` to every overlapping
    /// listener, in subscription order. Each listener reads the latest value
    /// right before it runs.
    pub(super) fn notify(&self, changed: &FieldPath) -> FormResult<()> {
        let targets = read_lock(&self.listeners, "collecting watch listeners")?
            .listeners
            .iter()
            .filter(|listener| {
                listener
                    .scope
                    .as_ref()
                    .is_none_or(|scope| scope.overlaps(changed))
            })
            .map(|listener| {
                (
                    listener.scope.clone(),
                    listener.active.clone(),
                    listener.callback.clone(),
                )
            })
            .collect::<Vec<_>>();

        for (scope, active, callback) in targets {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            let value = {
                let state = read_lock(&self.state, "reading watched value")?;
                match &scope {
                    Some(scope) => state.values.get(scope).cloned(),
                    None => Some(state.values.as_value().clone()),
                }
            };
            if let Some(value) = value {
                callback(&value);
            }
        }
        Ok(())
    }
}
