pub mod auth;
pub mod file;
pub mod memory;
pub mod session;

use serde_json::Value;
use thiserror::Error;

pub use crate::auth::{
    display_auth_error, AccountId, AuthError, Authenticator, MemoryAuthenticator,
};
pub use crate::file::FileStore;
pub use crate::memory::MemoryStore;
pub use crate::session::{SyncError, SyncSession, SyncStatus};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote document is not valid json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unable to watch remote document: {0}")]
    Watch(#[from] notify::Error),
}

/// Push notification from a subscribed document.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// The document changed, including echoes of our own writes.
    Changed(Value),
    Failed(String),
}

pub type Listener = Box<dyn Fn(RemoteEvent) + Send + Sync>;

/// Document-oriented persistence holding one habit document per account.
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the account has no document yet.
    fn read(&self, account: &AccountId) -> Result<Option<Value>, RemoteError>;
    fn write(&self, account: &AccountId, document: &Value) -> Result<(), RemoteError>;
    fn subscribe(&self, account: &AccountId, listener: Listener)
        -> Result<Subscription, RemoteError>;
}

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
