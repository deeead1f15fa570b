//! Invite consumption under contention, against a file-backed database
//! with the reader pool enabled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;

use parley_db::Database;
use parley_db::models::{ConsumeOutcome, NewInvite, NewUser, RegistrationOutcome};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Unique database path per test.
fn temp_db_path() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "parley-db-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("parley.db")
}

fn new_invite(code: &str, max_uses: u32) -> NewInvite {
    NewInvite {
        id: uuid::Uuid::new_v4().to_string(),
        code: code.into(),
        created_by: None,
        max_uses,
        expires_at: None,
    }
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        id: uuid::Uuid::new_v4().to_string(),
        username: name.into(),
        display_name: name.into(),
        password_hash: "pw".into(),
        pin_hash: "pin".into(),
        public_key: None,
        is_admin: false,
    }
}

#[test]
fn concurrent_consumers_never_overrun_budget() {
    let db = Arc::new(Database::open(&temp_db_path()).unwrap());
    db.insert_invite(&new_invite("ONE", 1)).unwrap();

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                db.consume_invite("ONE", Utc::now()).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<ConsumeOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let consumed = outcomes
        .iter()
        .filter(|o| matches!(o, ConsumeOutcome::Consumed { .. }))
        .count();

    assert_eq!(consumed, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, ConsumeOutcome::Consumed { .. } | ConsumeOutcome::NotUsable))
    );
    assert_eq!(db.get_invite_by_code("ONE").unwrap().unwrap().uses, 1);
}

#[test]
fn concurrent_registrations_respect_budget() {
    let db = Arc::new(Database::open(&temp_db_path()).unwrap());
    db.insert_invite(&new_invite("TWO", 2)).unwrap();

    let contenders = 6;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let user = new_user(&format!("user{i}"));
                barrier.wait();
                db.create_user_with_invite(&user, "TWO", Utc::now()).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<RegistrationOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let created = outcomes
        .iter()
        .filter(|o| matches!(o, RegistrationOutcome::Created { .. }))
        .count();
    let rejected = outcomes
        .iter()
        .filter(|o| **o == RegistrationOutcome::InviteNotUsable)
        .count();

    assert_eq!(created, 2);
    assert_eq!(rejected, contenders - 2);
    assert_eq!(db.get_invite_by_code("TWO").unwrap().unwrap().uses, 2);

    let registered = (0..contenders)
        .filter(|i| db.get_user_by_username(&format!("user{i}")).unwrap().is_some())
        .count();
    assert_eq!(registered, 2);
}
