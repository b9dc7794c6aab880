use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use habit_domain::{clock::ManualClock, AppState, HabitService, PeriodType};
use habit_sync::{AccountId, FileStore, RemoteStore, SyncSession};
use tempfile::tempdir;

fn service_at(day: u32) -> Arc<HabitService> {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, day, 8, 0, 0).unwrap(),
    ));
    Arc::new(HabitService::builder().with_clock(clock).build().unwrap())
}

#[test]
fn state_survives_a_restart_through_the_file_store() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(temp.path()).expect("open store"));
    let account = AccountId::new("carol").unwrap();
    let march = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();

    let first = service_at(3);
    let mut session = SyncSession::connect(store.clone(), account.clone(), first.clone());
    assert!(session.status().error.is_none());
    first.toggle_task(march(3), PeriodType::Daily, "1").unwrap();
    let stretch = first.add_task("Stretch", PeriodType::Weekly).unwrap();
    first
        .add_one_off_task(march(3), PeriodType::Monthly, "Renew passport")
        .unwrap();
    assert!(session.flush());
    session.disconnect();

    let second = service_at(4);
    let session = SyncSession::connect(store.clone(), account.clone(), second.clone());
    assert!(session.status().error.is_none());
    assert_eq!(second.state(), first.state());
    assert!(second.get_snapshot(march(3), PeriodType::Daily).is_completed("1"));
    assert!(second
        .get_snapshot(march(4), PeriodType::Weekly)
        .is_due(&stretch.id));
    assert_eq!(
        second.get_snapshot(march(20), PeriodType::Monthly).one_off_tasks[0].title,
        "Renew passport"
    );
    session.disconnect();
}

#[test]
fn accounts_do_not_share_documents() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(temp.path()).expect("open store"));
    let dave = AccountId::new("dave").unwrap();
    let erin = AccountId::new("erin").unwrap();

    let service = service_at(5);
    let mut session = SyncSession::connect(store.clone(), dave.clone(), service.clone());
    service.add_task("Meditate", PeriodType::Daily).unwrap();
    assert!(session.flush());
    session.disconnect();

    let stored_dave = AppState::from_document(store.read(&dave).unwrap().unwrap()).unwrap();
    assert_eq!(stored_dave.templates.len(), 3);
    assert!(store.read(&erin).unwrap().is_none());

    let other = service_at(5);
    let session = SyncSession::connect(store.clone(), erin.clone(), other.clone());
    assert_eq!(other.templates().len(), 2);
    session.disconnect();
}

#[test]
fn similar_account_ids_get_separate_documents() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(temp.path()).expect("open store"));
    let dotted = AccountId::new("a.b@x.com").unwrap();
    let underscored = AccountId::new("a_b@x.com").unwrap();
    let shouting = AccountId::new("A.B@X.COM").unwrap();
    assert_ne!(store.document_path(&dotted), store.document_path(&underscored));
    assert_ne!(
        store.document_path(&dotted).to_string_lossy().to_lowercase(),
        store.document_path(&shouting).to_string_lossy().to_lowercase()
    );

    let service = service_at(6);
    let mut session = SyncSession::connect(store.clone(), dotted.clone(), service.clone());
    service.add_task("Stretch", PeriodType::Daily).unwrap();
    assert!(session.flush());
    session.disconnect();

    assert!(store.read(&underscored).unwrap().is_none());
    assert!(store.read(&shouting).unwrap().is_none());
    let other = service_at(6);
    let session = SyncSession::connect(store.clone(), underscored, other.clone());
    assert_eq!(other.templates().len(), 2);
    assert_eq!(service.templates().len(), 3);
    session.disconnect();
}
