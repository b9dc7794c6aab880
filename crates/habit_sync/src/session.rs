use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use habit_domain::{AppState, HabitService, PendingWrite, SchemaError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{AccountId, RemoteError, RemoteEvent, RemoteStore, Subscription};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// What the front end shows about synchronization.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub loading: bool,
    pub error: Option<String>,
    /// Whether the account document has been read (or found missing).
    /// Nothing is written before that.
    pub loaded: bool,
    pub synced_revision: Option<u64>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Connects a [`HabitService`] to a [`RemoteStore`] for one account.
///
/// Local mutations queue full-state writes in the service; [`flush`] delivers
/// the newest one. Push notifications are buffered by the store callback and
/// applied on [`pump`], so all state changes happen on the caller's loop.
///
/// Until the account document has been read successfully the session never
/// writes: local edits stay queued and [`flush`] retries the read first.
///
/// [`flush`]: SyncSession::flush
/// [`pump`]: SyncSession::pump
pub struct SyncSession<S: RemoteStore> {
    store: Arc<S>,
    account: AccountId,
    service: Arc<HabitService>,
    inbox: Arc<Mutex<VecDeque<RemoteEvent>>>,
    subscription: Option<Subscription>,
    status: SyncStatus,
}

impl<S: RemoteStore> SyncSession<S> {
    /// Load (or seed) the account document and subscribe to changes.
    /// Failures are recorded in [`SyncStatus`]; the local state stays usable.
    pub fn connect(store: Arc<S>, account: AccountId, service: Arc<HabitService>) -> Self {
        let mut session = Self {
            store,
            account,
            service,
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            subscription: None,
            status: SyncStatus {
                loading: true,
                ..SyncStatus::default()
            },
        };
        session.initialize();
        session
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn service(&self) -> &Arc<HabitService> {
        &self.service
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.status.loaded
    }

    #[instrument(skip(self), fields(account = %self.account))]
    fn initialize(&mut self) {
        if let Err(err) = self.load_or_seed() {
            self.record_error(&err);
        }
        let inbox = self.inbox.clone();
        let listener = Box::new(move |event: RemoteEvent| inbox.lock().push_back(event));
        match self.store.subscribe(&self.account, listener) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(err) => self.record_error(&SyncError::from(err)),
        }
        self.status.loading = false;
    }

    fn load_or_seed(&mut self) -> Result<(), SyncError> {
        match self.store.read(&self.account)? {
            Some(document) => {
                let state = AppState::from_document(document)?;
                if self.service.has_pending_writes() {
                    warn!(
                        local = self.service.revision(),
                        remote = state.revision,
                        "discarding edits made before the habit document loaded"
                    );
                }
                info!(revision = state.revision, "loaded habit document");
                self.service.adopt(state);
                self.status.loaded = true;
                self.mark_synced();
            }
            None if self.service.has_pending_writes() => {
                debug!("no habit document yet; keeping queued edits");
                self.status.loaded = true;
            }
            None => {
                self.status.loaded = true;
                let initial = AppState::initial(self.service.now());
                info!("no habit document yet; seeding defaults");
                self.service.adopt(initial.clone());
                let write = PendingWrite {
                    revision: initial.revision,
                    state: initial,
                };
                self.deliver(write)?;
            }
        }
        Ok(())
    }

    /// Deliver the newest queued write. Returns whether a write reached the
    /// store; a failed write stays queued for the next flush. When the
    /// document has not been read yet, the read is retried first and
    /// nothing is written unless it succeeds.
    #[instrument(skip(self), fields(account = %self.account))]
    pub fn flush(&mut self) -> bool {
        if !self.status.loaded {
            if let Err(err) = self.load_or_seed() {
                self.record_error(&err);
                return false;
            }
        }
        let Some(write) = self.service.take_pending_write() else {
            return false;
        };
        match self.deliver(write) {
            Ok(()) => true,
            Err(err) => {
                self.record_error(&err);
                false
            }
        }
    }

    fn deliver(&mut self, write: PendingWrite) -> Result<(), SyncError> {
        let document = match write.state.to_document() {
            Ok(document) => document,
            Err(err) => {
                self.service.requeue(write);
                return Err(err.into());
            }
        };
        if let Err(err) = self.store.write(&self.account, &document) {
            self.service.requeue(write);
            return Err(err.into());
        }
        debug!(revision = write.revision, "delivered habit document");
        self.status.synced_revision = Some(write.revision);
        self.mark_synced();
        Ok(())
    }

    /// Apply buffered push notifications. Returns how many replaced the
    /// local state.
    pub fn pump(&mut self) -> usize {
        let events: Vec<RemoteEvent> = self.inbox.lock().drain(..).collect();
        let mut applied = 0;
        for event in events {
            match event {
                RemoteEvent::Changed(document) => match AppState::from_document(document) {
                    Ok(state) if !self.status.loaded => {
                        info!(revision = state.revision, "loaded habit document from push");
                        self.service.adopt(state);
                        self.status.loaded = true;
                        self.mark_synced();
                        applied += 1;
                    }
                    Ok(state) => {
                        if self.service.apply_remote(state) {
                            applied += 1;
                        }
                        self.status.error = None;
                    }
                    Err(err) => self.record_error(&SyncError::from(err)),
                },
                RemoteEvent::Failed(message) => {
                    warn!(%message, "habit subscription failed");
                    self.status.error = Some(message);
                }
            }
        }
        applied
    }

    /// Flush pending writes, then apply whatever the store pushed back.
    pub fn sync(&mut self) -> bool {
        let delivered = self.flush();
        self.pump();
        delivered
    }

    pub fn disconnect(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn mark_synced(&mut self) {
        self.status.error = None;
        self.status.last_synced_at = Some(self.service.now());
    }

    fn record_error(&mut self, err: &SyncError) {
        warn!(%err, "habit sync failed");
        self.status.error = Some(err.to_string());
    }
}
