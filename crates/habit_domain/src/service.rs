use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{
    clock::{Clock, SystemClock},
    error::HabitError,
    model::{self, AppState, OneOffTask, PeriodSnapshot, PeriodType, TaskTemplate},
    period,
    snapshot::SnapshotStore,
};

pub const RESET_PROMPT: &str =
    "Are you absolutely sure? This will delete all habits and history from your account.";

/// What to do when a completion toggle targets a template that is not part
/// of the period's due set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonDuePolicy {
    #[default]
    Reject,
    Permit,
}

/// Interactive confirmation for destructive actions.
pub trait ConfirmationGate {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// A full-state write waiting to be delivered to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub revision: u64,
    pub state: AppState,
}

/// Owns the habit state. Every mutation updates the state under one write
/// lock, bumps the revision and queues the complete new state for sync.
pub struct HabitService {
    state: RwLock<AppState>,
    outbox: Mutex<VecDeque<PendingWrite>>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    non_due_policy: NonDuePolicy,
}

pub struct HabitServiceBuilder {
    state: AppState,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    non_due_policy: NonDuePolicy,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            state: AppState::default(),
            clock: Arc::new(SystemClock),
            offset: Utc.fix(),
            non_due_policy: NonDuePolicy::default(),
        }
    }

    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = state;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_non_due_policy(mut self, policy: NonDuePolicy) -> Self {
        self.non_due_policy = policy;
        self
    }

    pub fn build(self) -> Result<HabitService, HabitError> {
        self.state.validate()?;
        Ok(HabitService {
            state: RwLock::new(self.state),
            outbox: Mutex::new(VecDeque::new()),
            clock: self.clock,
            offset: self.offset,
            non_due_policy: self.non_due_policy,
        })
    }
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        period::local_date(self.clock.now(), self.offset)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn non_due_policy(&self) -> NonDuePolicy {
        self.non_due_policy
    }

    pub fn state(&self) -> AppState {
        self.state.read().clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn templates(&self) -> Vec<TaskTemplate> {
        self.state.read().templates.clone()
    }

    pub fn active_templates(&self, period: PeriodType) -> Vec<TaskTemplate> {
        self.state
            .read()
            .templates
            .iter()
            .filter(|template| template.active && template.period == period)
            .cloned()
            .collect()
    }

    pub fn template(&self, id: &str) -> Option<TaskTemplate> {
        self.state.read().template(id).cloned()
    }

    pub fn get_snapshot(&self, date: NaiveDate, period: PeriodType) -> PeriodSnapshot {
        let state = self.state.read();
        let snapshot = SnapshotStore::new(&state, self.offset)
            .get_snapshot(date, period)
            .into_owned();
        snapshot
    }

    pub fn is_persisted(&self, date: NaiveDate, period: PeriodType) -> bool {
        let state = self.state.read();
        let persisted = SnapshotStore::new(&state, self.offset).is_persisted(date, period);
        persisted
    }

    pub fn toggle_task(
        &self,
        date: NaiveDate,
        period: PeriodType,
        template_id: &str,
    ) -> Result<bool, HabitError> {
        let policy = self.non_due_policy;
        let toggled = self.mutate_snapshot(date, period, |snapshot| {
            if policy == NonDuePolicy::Reject && !snapshot.is_due(template_id) {
                return Err(HabitError::TaskNotDue {
                    template_id: template_id.to_string(),
                    period_key: snapshot.period_key.clone(),
                });
            }
            let entry = snapshot
                .completion_map
                .entry(template_id.to_string())
                .or_insert(false);
            *entry = !*entry;
            Ok(Some(*entry))
        })?;
        Ok(toggled.unwrap_or(false))
    }

    /// Append a one-off task to the period and return its id.
    pub fn add_one_off_task(
        &self,
        date: NaiveDate,
        period: PeriodType,
        title: &str,
    ) -> Result<String, HabitError> {
        let title = normalize_title(title)?;
        let id = model::new_id();
        let task = OneOffTask {
            id: id.clone(),
            title,
            completed: false,
        };
        self.mutate_snapshot(date, period, move |snapshot| {
            snapshot.one_off_tasks.push(task);
            Ok(Some(()))
        })?;
        Ok(id)
    }

    /// Flip a one-off task. Returns `None` and leaves the state untouched
    /// when the id is unknown in that period.
    pub fn toggle_one_off_task(
        &self,
        date: NaiveDate,
        period: PeriodType,
        one_off_id: &str,
    ) -> Result<Option<bool>, HabitError> {
        self.mutate_snapshot(date, period, |snapshot| {
            Ok(snapshot
                .one_off_tasks
                .iter_mut()
                .find(|task| task.id == one_off_id)
                .map(|task| {
                    task.completed = !task.completed;
                    task.completed
                }))
        })
    }

    pub fn delete_one_off_task(
        &self,
        date: NaiveDate,
        period: PeriodType,
        one_off_id: &str,
    ) -> Result<bool, HabitError> {
        let removed = self.mutate_snapshot(date, period, |snapshot| {
            let before = snapshot.one_off_tasks.len();
            snapshot.one_off_tasks.retain(|task| task.id != one_off_id);
            Ok((snapshot.one_off_tasks.len() != before).then_some(()))
        })?;
        Ok(removed.is_some())
    }

    pub fn add_task(&self, title: &str, period: PeriodType) -> Result<TaskTemplate, HabitError> {
        let title = normalize_title(title)?;
        let template = TaskTemplate::new(model::new_id(), title, period, self.clock.now());
        let mut state = self.state.write();
        state.templates.push(template.clone());
        info!(id = %template.id, %period, "added task template");
        self.commit(&mut state);
        Ok(template)
    }

    /// Soft-delete a template. Persisted snapshots keep referring to it.
    pub fn delete_template(&self, id: &str) -> Result<(), HabitError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let template = state
            .templates
            .iter_mut()
            .find(|template| template.id == id)
            .ok_or_else(|| HabitError::UnknownTemplate(id.to_string()))?;
        if template.is_deleted() {
            return Ok(());
        }
        template.soft_delete(now);
        info!(%id, "deleted task template");
        self.commit(&mut state);
        Ok(())
    }

    /// Wipe every template and snapshot once `gate` confirms.
    pub fn reset_all_data(&self, gate: &dyn ConfirmationGate) -> bool {
        if !gate.confirm(RESET_PROMPT) {
            return false;
        }
        let mut state = self.state.write();
        let revision = state.revision;
        *state = AppState {
            revision,
            ..AppState::default()
        };
        info!("reset all habit data");
        self.commit(&mut state);
        true
    }

    /// Newest queued write, discarding older ones it supersedes.
    pub fn take_pending_write(&self) -> Option<PendingWrite> {
        let mut outbox = self.outbox.lock();
        let newest = outbox.pop_back();
        outbox.clear();
        newest
    }

    /// Put back a write that failed to deliver, unless a newer one is queued.
    pub fn requeue(&self, write: PendingWrite) {
        let mut outbox = self.outbox.lock();
        if outbox.iter().all(|pending| pending.revision < write.revision) {
            debug!(revision = write.revision, "requeued failed write");
            outbox.push_back(write);
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.outbox.lock().is_empty()
    }

    /// Replace local state with a remote document unconditionally.
    pub fn adopt(&self, remote: AppState) {
        let mut state = self.state.write();
        self.outbox.lock().clear();
        debug!(revision = remote.revision, "adopted remote state");
        *state = remote;
    }

    /// Apply a pushed remote state unless local changes are newer or still
    /// waiting to be written. Returns whether the state was replaced.
    pub fn apply_remote(&self, remote: AppState) -> bool {
        let mut state = self.state.write();
        if !self.outbox.lock().is_empty() || remote.revision < state.revision {
            debug!(
                remote = remote.revision,
                local = state.revision,
                "ignored stale remote state"
            );
            return false;
        }
        *state = remote;
        true
    }

    fn mutate_snapshot<T>(
        &self,
        date: NaiveDate,
        period: PeriodType,
        op: impl FnOnce(&mut PeriodSnapshot) -> Result<Option<T>, HabitError>,
    ) -> Result<Option<T>, HabitError> {
        let mut state = self.state.write();
        let mut snapshot = SnapshotStore::new(&state, self.offset)
            .get_snapshot(date, period)
            .into_owned();
        let Some(outcome) = op(&mut snapshot)? else {
            return Ok(None);
        };
        debug!(key = %snapshot.period_key, "persisting snapshot");
        state
            .snapshots
            .insert(snapshot.period_key.clone(), snapshot);
        self.commit(&mut state);
        Ok(Some(outcome))
    }

    fn commit(&self, state: &mut AppState) {
        state.revision += 1;
        self.outbox.lock().push_back(PendingWrite {
            revision: state.revision,
            state: state.clone(),
        });
    }
}

fn normalize_title(title: &str) -> Result<String, HabitError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(HabitError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn service_at(day: u32) -> (HabitService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap(),
        ));
        let service = HabitService::builder()
            .with_clock(clock.clone())
            .build()
            .unwrap();
        (service, clock)
    }

    #[test]
    fn reads_do_not_persist() {
        let (service, _) = service_at(5);
        service.add_task("Stretch", PeriodType::Daily).unwrap();
        let revision = service.revision();
        let first = service.get_snapshot(jan(5), PeriodType::Daily);
        let second = service.get_snapshot(jan(5), PeriodType::Daily);
        assert_eq!(first, second);
        assert!(!service.is_persisted(jan(5), PeriodType::Daily));
        assert_eq!(service.revision(), revision);
    }

    #[test]
    fn toggle_twice_restores_completion() {
        let (service, _) = service_at(5);
        let template = service.add_task("Stretch", PeriodType::Daily).unwrap();
        assert!(service.toggle_task(jan(5), PeriodType::Daily, &template.id).unwrap());
        assert!(!service.toggle_task(jan(5), PeriodType::Daily, &template.id).unwrap());
        assert!(!service
            .get_snapshot(jan(5), PeriodType::Daily)
            .is_completed(&template.id));
    }

    #[test]
    fn reject_policy_refuses_non_due_toggle() {
        let (service, _) = service_at(5);
        let template = service.add_task("Stretch", PeriodType::Daily).unwrap();
        let err = service
            .toggle_task(jan(4), PeriodType::Daily, &template.id)
            .unwrap_err();
        assert!(matches!(err, HabitError::TaskNotDue { .. }));
        assert!(!service.is_persisted(jan(4), PeriodType::Daily));
    }

    #[test]
    fn permit_policy_records_non_due_entry() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 5, 9, 0, 0).unwrap(),
        ));
        let service = HabitService::builder()
            .with_clock(clock)
            .with_non_due_policy(NonDuePolicy::Permit)
            .build()
            .unwrap();
        assert!(service.toggle_task(jan(5), PeriodType::Daily, "ghost").unwrap());
        let snapshot = service.get_snapshot(jan(5), PeriodType::Daily);
        assert!(!snapshot.is_due("ghost"));
        assert!(snapshot.is_completed("ghost"));
    }

    #[test]
    fn unknown_one_off_toggle_is_a_no_op() {
        let (service, _) = service_at(5);
        let revision = service.revision();
        assert_eq!(
            service
                .toggle_one_off_task(jan(5), PeriodType::Daily, "missing")
                .unwrap(),
            None
        );
        assert!(!service.is_persisted(jan(5), PeriodType::Daily));
        assert_eq!(service.revision(), revision);
    }

    #[test]
    fn one_off_tasks_can_be_added_toggled_and_deleted() {
        let (service, _) = service_at(5);
        let id = service
            .add_one_off_task(jan(5), PeriodType::Weekly, "Call the bank")
            .unwrap();
        assert_eq!(
            service.toggle_one_off_task(jan(6), PeriodType::Weekly, &id).unwrap(),
            None,
            "Jan 6 opens a new ISO week"
        );
        assert_eq!(
            service.toggle_one_off_task(jan(5), PeriodType::Weekly, &id).unwrap(),
            Some(true)
        );
        assert!(service.delete_one_off_task(jan(5), PeriodType::Weekly, &id).unwrap());
        assert!(!service.delete_one_off_task(jan(5), PeriodType::Weekly, &id).unwrap());
        assert!(service
            .get_snapshot(jan(5), PeriodType::Weekly)
            .one_off_tasks
            .is_empty());
    }

    #[test]
    fn blank_titles_are_rejected() {
        let (service, _) = service_at(5);
        assert!(matches!(
            service.add_task("   ", PeriodType::Daily),
            Err(HabitError::EmptyTitle)
        ));
        assert!(matches!(
            service.add_one_off_task(jan(5), PeriodType::Daily, ""),
            Err(HabitError::EmptyTitle)
        ));
    }

    #[test]
    fn delete_unknown_template_fails() {
        let (service, _) = service_at(5);
        assert!(matches!(
            service.delete_template("nope"),
            Err(HabitError::UnknownTemplate(id)) if id == "nope"
        ));
    }

    #[test]
    fn second_delete_keeps_first_deletion_instant() {
        let (service, clock) = service_at(5);
        let template = service.add_task("Stretch", PeriodType::Daily).unwrap();
        service.delete_template(&template.id).unwrap();
        let first = service.template(&template.id).unwrap().deleted_at;
        clock.advance(chrono::Duration::days(3));
        service.delete_template(&template.id).unwrap();
        assert_eq!(service.template(&template.id).unwrap().deleted_at, first);
    }

    #[test]
    fn reset_requires_confirmation() {
        let (service, _) = service_at(5);
        service.add_task("Stretch", PeriodType::Daily).unwrap();
        assert!(!service.reset_all_data(&|_: &str| false));
        assert_eq!(service.templates().len(), 1);

        assert!(service.reset_all_data(&|prompt: &str| prompt == RESET_PROMPT));
        let state = service.state();
        assert!(state.templates.is_empty());
        assert!(state.snapshots.is_empty());
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn outbox_coalesces_to_newest_revision() {
        let (service, _) = service_at(5);
        service.add_task("Stretch", PeriodType::Daily).unwrap();
        service.add_task("Read", PeriodType::Daily).unwrap();
        let write = service.take_pending_write().unwrap();
        assert_eq!(write.revision, 2);
        assert_eq!(write.state.templates.len(), 2);
        assert!(service.take_pending_write().is_none());

        service.requeue(write.clone());
        assert!(service.has_pending_writes());
        service.add_task("Walk", PeriodType::Daily).unwrap();
        service.requeue(write);
        assert_eq!(service.take_pending_write().unwrap().revision, 3);
    }

    #[test]
    fn stale_remote_state_is_ignored() {
        let (service, _) = service_at(5);
        service.add_task("Stretch", PeriodType::Daily).unwrap();
        let older = AppState::default();
        assert!(!service.apply_remote(older.clone()), "local write still pending");

        service.take_pending_write();
        assert!(!service.apply_remote(older), "remote revision is older");

        let newer = AppState {
            revision: 7,
            ..AppState::default()
        };
        assert!(service.apply_remote(newer));
        assert_eq!(service.revision(), 7);
    }
}
