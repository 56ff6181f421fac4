//! The signed-in user as seen by one tab.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identity of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub id: String,
    pub is_logged_in: bool,
    pub name: String,
    pub role: String,
}

/// Per-tab identity store.
///
/// Everything in the session core only reads it, except the logout
/// executor which clears it once a logout is finalized.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    tx: std::sync::Arc<watch::Sender<Option<Identity>>>,
}

impl IdentityStore {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn set(&self, identity: Identity) {
        self.tx.send_replace(Some(identity));
    }

    /// Clear the identity. Returns the identity that was present, if any.
    pub fn clear(&self) -> Option<Identity> {
        self.tx.send_replace(None)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}
