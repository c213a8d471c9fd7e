//! Session observation and auth-change subscriptions.
//!
//! The backend owns the session lifecycle. [`SessionStore`] only reads the
//! current session and relays change notifications to subscribers; the
//! returned [`Subscription`] removes its handler when dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::SignedOut => "signed_out",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
        }
    }
}

pub type AuthHandler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, AuthHandler>,
}

/// Handler registry shared by backends that emit auth events.
#[derive(Clone, Default)]
pub struct AuthListeners {
    inner: Arc<Mutex<Registry>>,
}

impl AuthListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: AuthHandler) -> Subscription {
        let id = {
            let mut registry = lock_registry(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.insert(id, handler);
            id
        };
        Subscription {
            registry: Some(Arc::downgrade(&self.inner)),
            id,
        }
    }

    /// Deliver an event. Handlers run outside the registry lock.
    pub fn emit(&self, event: &AuthEvent) {
        let handlers: Vec<AuthHandler> = {
            let registry = lock_registry(&self.inner);
            registry.handlers.values().cloned().collect()
        };
        debug!(event = event.name(), listeners = handlers.len(), "auth event");
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        lock_registry(&self.inner).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps an auth-change handler registered. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Option<Weak<Mutex<Registry>>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn release(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            lock_registry(&registry).handlers.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.registry.is_some())
            .finish()
    }
}

/// Read access to the backend session plus change notifications.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn Backend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The current session, or `None`. Backend failures count as signed out.
    pub async fn current_session(&self) -> Option<Session> {
        match self.backend.get_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session lookup failed; treating as signed out");
                None
            }
        }
    }

    pub fn on_session_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.backend.on_auth_state_change(Arc::new(handler))
    }
}
