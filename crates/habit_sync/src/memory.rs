use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{AccountId, Listener, RemoteError, RemoteEvent, RemoteStore, Subscription};

/// In-process document store. Every write is echoed to the account's
/// subscribers, the way a hosted document database reports its own writes.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<AccountId, Value>,
    listeners: Vec<Registration>,
    next_listener: u64,
    failing_writes: usize,
    failing_reads: usize,
    write_count: usize,
}

struct Registration {
    id: u64,
    account: AccountId,
    listener: Arc<Listener>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, account: &AccountId) -> Option<Value> {
        self.inner.lock().documents.get(account).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().write_count
    }

    pub fn subscriber_count(&self, account: &AccountId) -> usize {
        self.inner
            .lock()
            .listeners
            .iter()
            .filter(|registration| &registration.account == account)
            .count()
    }

    /// Make the next `count` writes fail with [`RemoteError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.lock().failing_writes = count;
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.inner.lock().failing_reads = count;
    }

    /// Store a document as if another client had written it.
    pub fn put_external(&self, account: &AccountId, document: Value) {
        self.inner
            .lock()
            .documents
            .insert(account.clone(), document.clone());
        self.notify(account, RemoteEvent::Changed(document));
    }

    /// Report a subscription failure to the account's listeners.
    pub fn emit_error(&self, account: &AccountId, message: &str) {
        self.notify(account, RemoteEvent::Failed(message.to_string()));
    }

    fn notify(&self, account: &AccountId, event: RemoteEvent) {
        let listeners: Vec<Arc<Listener>> = self
            .inner
            .lock()
            .listeners
            .iter()
            .filter(|registration| &registration.account == account)
            .map(|registration| registration.listener.clone())
            .collect();
        for listener in listeners {
            (listener.as_ref())(event.clone());
        }
    }

    fn unregister(inner: &Weak<Mutex<MemoryInner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner
                .lock()
                .listeners
                .retain(|registration| registration.id != id);
        }
    }
}

impl RemoteStore for MemoryStore {
    fn read(&self, account: &AccountId) -> Result<Option<Value>, RemoteError> {
        let mut inner = self.inner.lock();
        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(RemoteError::Unavailable("read rejected".into()));
        }
        Ok(inner.documents.get(account).cloned())
    }

    fn write(&self, account: &AccountId, document: &Value) -> Result<(), RemoteError> {
        {
            let mut inner = self.inner.lock();
            if inner.failing_writes > 0 {
                inner.failing_writes -= 1;
                return Err(RemoteError::Unavailable("write rejected".into()));
            }
            inner.write_count += 1;
            inner.documents.insert(account.clone(), document.clone());
        }
        self.notify(account, RemoteEvent::Changed(document.clone()));
        Ok(())
    }

    fn subscribe(
        &self,
        account: &AccountId,
        listener: Listener,
    ) -> Result<Subscription, RemoteError> {
        let mut inner = self.inner.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push(Registration {
            id,
            account: account.clone(),
            listener: Arc::new(listener),
        });
        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || MemoryStore::unregister(&weak, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_are_echoed_until_unsubscribed() {
        let store = MemoryStore::new();
        let account = AccountId::new("alice").unwrap();
        let seen = Arc::new(Mutex::new(Vec::<RemoteEvent>::new()));
        let sink = seen.clone();
        let subscription = store
            .subscribe(&account, Box::new(move |event: RemoteEvent| sink.lock().push(event)))
            .unwrap();

        store.write(&account, &json!({ "n": 1 })).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.subscriber_count(&account), 1);

        subscription.unsubscribe();
        store.write(&account, &json!({ "n": 2 })).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.subscriber_count(&account), 0);
        assert_eq!(store.document(&account), Some(json!({ "n": 2 })));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        let account = AccountId::new("bob").unwrap();
        store.fail_next_writes(1);
        assert!(store.write(&account, &json!({})).is_err());
        assert!(store.write(&account, &json!({})).is_ok());
        assert_eq!(store.write_count(), 1);
    }
}
