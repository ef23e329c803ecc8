//! Registry of mounted views, keyed by client identity.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::debug;
use url::Url;

use super::task::{ViewHandle, mount};
use crate::channel::Connector;
use crate::config::ReconnectConfig;
use crate::error::Result;
use crate::identity::ClientIdentity;

/// Thread-safe store of mounted views.
///
/// A view stays mounted while at least one [`Subscription`] to it is alive;
/// dropping the last subscription unmounts it and closes its channel.
#[derive(Debug, Clone)]
pub struct ViewStore {
    inner: Arc<ViewStoreInner>,
}

#[derive(Debug)]
struct ViewStoreInner {
    views: RwLock<HashMap<ClientIdentity, Mounted>>,
    connector: Arc<dyn Connector>,
    backend: Url,
    reconnect: ReconnectConfig,
}

#[derive(Debug)]
struct Mounted {
    handle: ViewHandle,
    subscribers: usize,
}

impl ViewStore {
    /// Create an empty store whose views connect to `backend`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, backend: Url, reconnect: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(ViewStoreInner {
                views: RwLock::new(HashMap::new()),
                connector,
                backend,
                reconnect,
            }),
        }
    }

    /// Subscribe to the view for `client_id`, mounting it if needed.
    ///
    /// An already-mounted view is reused, so its channel is not reopened.
    pub fn mount(&self, client_id: &ClientIdentity) -> Result<Subscription> {
        let mut guard = self
            .inner
            .views
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(mounted) = guard.get_mut(client_id)
            && !mounted.handle.is_unmounted()
        {
            mounted.subscribers += 1;
            return Ok(Subscription::new(self.clone(), mounted.handle.clone()));
        }

        let (handle, _join) = mount(
            client_id.clone(),
            Arc::clone(&self.inner.connector),
            &self.inner.backend,
            self.inner.reconnect,
        )?;
        guard.insert(
            client_id.clone(),
            Mounted {
                handle: handle.clone(),
                subscribers: 1,
            },
        );
        Ok(Subscription::new(self.clone(), handle))
    }

    /// Get a mounted view.
    #[must_use]
    pub fn get(&self, client_id: &ClientIdentity) -> Option<ViewHandle> {
        let guard = self
            .inner
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .get(client_id)
            .map(|mounted| mounted.handle.clone())
            .filter(|handle| !handle.is_unmounted())
    }

    /// Number of mounted views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, handle: &ViewHandle) {
        let mut guard = self
            .inner
            .views
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(mounted) = guard.get_mut(handle.client_id()) else {
            handle.unmount();
            return;
        };
        // A stale subscription to a view that was already replaced.
        if !mounted.handle.same_view(handle) {
            handle.unmount();
            return;
        }

        mounted.subscribers = mounted.subscribers.saturating_sub(1);
        if mounted.subscribers == 0 {
            guard.remove(handle.client_id());
            handle.unmount();
            debug!(client_id = %handle.client_id(), "Last subscriber left, view unmounted");
        }
    }
}

/// A live subscription to a mounted view's rendered transcript.
#[derive(Debug)]
pub struct Subscription {
    store: ViewStore,
    handle: ViewHandle,
    rendered: watch::Receiver<String>,
}

impl Subscription {
    fn new(store: ViewStore, handle: ViewHandle) -> Self {
        let rendered = handle.subscribe();
        Self {
            store,
            handle,
            rendered,
        }
    }

    /// The subscribed view.
    #[must_use]
    pub fn handle(&self) -> &ViewHandle {
        &self.handle
    }

    /// Current HTML, marking it as seen.
    pub fn current(&mut self) -> String {
        self.rendered.borrow_and_update().clone()
    }

    /// Wait for the next re-render. Returns `false` once the view is gone.
    pub async fn changed(&mut self) -> bool {
        self.rendered.changed().await.is_ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.release(&self.handle);
    }
}
