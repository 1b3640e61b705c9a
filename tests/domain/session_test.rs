use chrono::{Duration, Utc};

use arunika::domain::{DeviceId, Session, SessionStatus, Turn};

#[test]
fn given_session_when_language_changes_then_expiry_moves_forward() {
    let start = Utc::now();
    let mut session = Session::new_at(DeviceId::new("doll-001"), start);
    let later = start + Duration::minutes(10);

    session.set_language("en-US".to_string(), later);

    assert_eq!(session.metadata.language, "en-US");
    assert_eq!(session.last_active_at, later);
    assert_eq!(session.expires_at, later + Duration::hours(24));
}

#[test]
fn given_session_past_expiry_when_checked_then_expired_and_inactive() {
    let start = Utc::now() - Duration::hours(30);
    let session = Session::new_at(DeviceId::new("doll-001"), start);

    assert!(session.is_expired(Utc::now()));
    assert!(!session.is_active(Utc::now()));
    assert_eq!(session.status, SessionStatus::Active);
}

#[test]
fn given_turns_when_reading_history_then_order_is_preserved() {
    let start = Utc::now();
    let mut session = Session::new_at(DeviceId::new("doll-001"), start);
    let first = start + Duration::seconds(1);
    let second = start + Duration::seconds(2);

    session
        .append_turn(Turn::user(first, "Halo".to_string(), 1200), first)
        .unwrap();
    session
        .append_turn(Turn::assistant(second, "Hai!".to_string(), 800), second)
        .unwrap();

    let contents: Vec<&str> = session.history().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["Halo", "Hai!"]);
    assert_eq!(session.last_turn_at(), Some(second));
}

#[test]
fn given_expired_session_when_expired_again_then_status_is_expired() {
    let now = Utc::now();
    let mut session = Session::new_at(DeviceId::new("doll-001"), now);

    session.expire(now);

    assert_eq!(session.status, SessionStatus::Expired);
    assert_eq!(session.status.to_string(), "EXPIRED");
}
