//! Unit tests for the analytics log.

use relay_types::UserKey;
use rusqlite::Connection;

use crate::event::{EventDomain, EventPayload};
use crate::store::{emit_event, next_seq, query_events, EventFilter};

/// Creates an in-memory SQLite database with migrations applied.
fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    relay_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

#[test]
fn emit_event_inserts_row() {
    let conn = test_db();

    let event = emit_event(&conn, UserKey(10), &EventPayload::ValuesSaved { count: 3 })
        .expect("emit should succeed");

    assert!(event.id > 0);
    assert_eq!(event.seq, 1);
    assert_eq!(event.domain, "DIALOGUE");
    assert_eq!(event.event_type, "VALUES_SAVED");

    let (user_key, domain, event_type): (i64, String, String) = conn
        .query_row(
            "SELECT user_key, domain, event_type FROM analytics_events WHERE id = ?1",
            [event.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("should query inserted row");
    assert_eq!(user_key, 10);
    assert_eq!(domain, "DIALOGUE");
    assert_eq!(event_type, "VALUES_SAVED");
}

#[test]
fn payload_round_trips_through_json() {
    let conn = test_db();
    let payload = EventPayload::FollowUpAsked {
        attempt: 2,
        fallback: true,
    };

    let event = emit_event(&conn, UserKey(1), &payload).unwrap();
    assert!(event.payload_json.contains("\"event\":\"FOLLOW_UP_ASKED\""));
    assert_eq!(event.payload().unwrap(), payload);
}

#[test]
fn seq_increases_across_users() {
    let conn = test_db();
    assert_eq!(next_seq(&conn).unwrap(), 1);

    let a = emit_event(&conn, UserKey(1), &EventPayload::StartCommand).unwrap();
    let b = emit_event(&conn, UserKey(2), &EventPayload::VoiceReceived { duration_secs: 4 }).unwrap();
    let c = emit_event(&conn, UserKey(1), &EventPayload::ElicitationStarted).unwrap();

    assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
    assert_eq!(next_seq(&conn).unwrap(), 4);
}

#[test]
fn query_filters_by_user_domain_and_type() {
    let conn = test_db();
    emit_event(&conn, UserKey(1), &EventPayload::StartCommand).unwrap();
    emit_event(&conn, UserKey(1), &EventPayload::ElicitationStarted).unwrap();
    emit_event(&conn, UserKey(2), &EventPayload::ElicitationStarted).unwrap();
    emit_event(
        &conn,
        UserKey(1),
        &EventPayload::ElicitationFailed {
            kind: "oracle_unavailable".to_string(),
        },
    )
    .unwrap();

    let mine = query_events(
        &conn,
        &EventFilter {
            user_key: Some(UserKey(1)),
            ..EventFilter::default()
        },
    )
    .unwrap();
    assert_eq!(mine.len(), 3);
    assert!(mine.windows(2).all(|w| w[0].seq < w[1].seq));

    let dialogue = query_events(
        &conn,
        &EventFilter {
            user_key: Some(UserKey(1)),
            domain: Some(EventDomain::Dialogue),
            ..EventFilter::default()
        },
    )
    .unwrap();
    assert_eq!(dialogue.len(), 2);

    let started = query_events(
        &conn,
        &EventFilter {
            event_type: Some("ELICITATION_STARTED".to_string()),
            ..EventFilter::default()
        },
    )
    .unwrap();
    assert_eq!(started.len(), 2);
    assert_eq!(started[1].user_key, UserKey(2));
}

#[test]
fn query_respects_limit_and_cursor() {
    let conn = test_db();
    for _ in 0..5 {
        emit_event(&conn, UserKey(7), &EventPayload::StartCommand).unwrap();
    }

    let page = query_events(
        &conn,
        &EventFilter {
            limit: Some(2),
            ..EventFilter::default()
        },
    )
    .unwrap();
    assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);

    let next = query_events(
        &conn,
        &EventFilter {
            after_seq: Some(2),
            limit: Some(2),
            ..EventFilter::default()
        },
    )
    .unwrap();
    assert_eq!(next.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn domain_labels_parse_back() {
    for domain in [
        EventDomain::Transport,
        EventDomain::Speech,
        EventDomain::Assistant,
        EventDomain::Dialogue,
        EventDomain::Vision,
    ] {
        assert_eq!(domain.as_str().parse::<EventDomain>().unwrap(), domain);
    }
    assert!("AUDIT".parse::<EventDomain>().is_err());
}

#[test]
fn every_payload_maps_to_its_domain() {
    assert_eq!(EventPayload::StartCommand.domain(), EventDomain::Transport);
    assert_eq!(
        EventPayload::SpeechFailed { reason: "x".into() }.domain(),
        EventDomain::Speech
    );
    assert_eq!(
        EventPayload::AnswerSent {
            question_chars: 1,
            answer_chars: 2
        }
        .domain(),
        EventDomain::Assistant
    );
    assert_eq!(
        EventPayload::PhotoAnalyzed { face_found: false }.domain(),
        EventDomain::Vision
    );
}
