use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::Subscription;

/// Opaque identifier of the signed-in account; selects the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("account id must not be empty")]
    EmptyAccount,
    #[error("Firebase: Error (auth/invalid-credential).")]
    InvalidCredentials,
    #[error("Firebase: Error (auth/email-already-in-use).")]
    AccountExists,
    #[error("Firebase: Password should be at least 6 characters (auth/weak-password).")]
    WeakPassword,
}

impl AccountId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AuthError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::EmptyAccount);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const TRANSPORT_PREFIXES: [&str; 1] = ["Firebase:"];

/// Error text shown next to the sign-in form, without the transport prefix.
pub fn display_auth_error(message: &str) -> String {
    let mut text = message.trim();
    for prefix in TRANSPORT_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
        }
    }
    text.to_string()
}

pub type AccountListener = Box<dyn Fn(Option<&AccountId>) + Send + Sync>;

/// Identity provider in front of the remote store.
pub trait Authenticator: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> Result<AccountId, AuthError>;
    fn sign_up(&self, email: &str, password: &str) -> Result<AccountId, AuthError>;
    fn sign_out(&self);
    fn current_account(&self) -> Option<AccountId>;
    /// `listener` is called with the current account right away and again
    /// on every sign-in or sign-out.
    fn on_account_changed(&self, listener: AccountListener) -> Subscription;
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Account registry kept in process memory.
#[derive(Default, Clone)]
pub struct MemoryAuthenticator {
    inner: Arc<Mutex<AuthInner>>,
}

#[derive(Default)]
struct AuthInner {
    passwords: HashMap<AccountId, String>,
    current: Option<AccountId>,
    listeners: Vec<(u64, Arc<AccountListener>)>,
    next_listener: u64,
}

impl MemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_current(&self, account: Option<AccountId>) {
        let listeners: Vec<Arc<AccountListener>> = {
            let mut inner = self.inner.lock();
            if inner.current == account {
                return;
            }
            inner.current = account.clone();
            inner.listeners.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in listeners {
            (listener.as_ref())(account.as_ref());
        }
    }

    fn unregister(inner: &Weak<Mutex<AuthInner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }
}

impl Authenticator for MemoryAuthenticator {
    fn sign_in(&self, email: &str, password: &str) -> Result<AccountId, AuthError> {
        let account = AccountId::new(email.to_ascii_lowercase())?;
        let known = self.inner.lock().passwords.get(&account).map(String::as_str) == Some(password);
        if !known {
            return Err(AuthError::InvalidCredentials);
        }
        info!(%account, "signed in");
        self.set_current(Some(account.clone()));
        Ok(account)
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<AccountId, AuthError> {
        let account = AccountId::new(email.to_ascii_lowercase())?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        {
            let mut inner = self.inner.lock();
            if inner.passwords.contains_key(&account) {
                return Err(AuthError::AccountExists);
            }
            inner.passwords.insert(account.clone(), password.to_string());
        }
        info!(%account, "signed up");
        self.set_current(Some(account.clone()));
        Ok(account)
    }

    fn sign_out(&self) {
        self.set_current(None);
    }

    fn current_account(&self) -> Option<AccountId> {
        self.inner.lock().current.clone()
    }

    fn on_account_changed(&self, listener: AccountListener) -> Subscription {
        let listener = Arc::new(listener);
        let (id, current) = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.push((id, listener.clone()));
            (id, inner.current.clone())
        };
        (listener.as_ref())(current.as_ref());
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || MemoryAuthenticator::unregister(&weak, id))
    }
}
