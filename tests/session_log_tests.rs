// Tests for the bounded session history

use chrono::{TimeZone, Utc};
use mic_guardian::{SessionLog, SessionRecord};
use std::sync::Arc;

fn record(id: u64) -> SessionRecord {
    let started_at = Utc.timestamp_millis_opt(1_760_000_000_000 + id as i64 * 1000).unwrap();
    SessionRecord {
        id,
        app_name: format!("app-{}", id),
        started_at,
        ended_at: started_at,
        duration_ms: 0,
        participants: Vec::new(),
        attribution_samples: 0,
        last_attribution: Vec::new(),
    }
}

#[test]
fn test_append_inserts_at_front() {
    let log = SessionLog::default();
    log.append(record(1));
    log.append(record(2));

    let ids: Vec<u64> = log.snapshot().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(log.latest().map(|r| r.id), Some(2));
}

#[test]
fn test_keeps_only_the_newest_hundred() {
    let log = SessionLog::default();
    assert_eq!(log.capacity(), 100);

    for id in 1..=250 {
        log.append(record(id));
    }

    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 100);
    assert_eq!(snapshot.first().map(|r| r.id), Some(250));
    assert_eq!(snapshot.last().map(|r| r.id), Some(151));
    assert!(snapshot.windows(2).all(|pair| pair[0].id == pair[1].id + 1));
}

#[test]
fn test_custom_capacity() {
    let log = SessionLog::new(3);
    for id in 1..=5 {
        log.append(record(id));
    }
    let ids: Vec<u64> = log.snapshot().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![5, 4, 3]);
}

#[test]
fn test_clear_then_snapshot_is_empty() {
    let log = SessionLog::default();
    for id in 1..=10 {
        log.append(record(id));
    }

    log.clear();
    assert!(log.snapshot().is_empty());
    assert!(log.is_empty());
    assert_eq!(log.latest(), None);

    log.append(record(11));
    assert_eq!(log.len(), 1);
}

#[test]
fn test_snapshot_is_a_copy() {
    let log = SessionLog::default();
    log.append(record(1));

    let before = log.snapshot();
    log.append(record(2));
    log.clear();

    assert_eq!(before.len(), 1);
    assert_eq!(before[0].id, 1);
}

#[test]
fn test_clear_after_concurrent_appends() {
    let log = Arc::new(SessionLog::default());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..100 {
                    log.append(record(t * 1000 + i));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(log.len(), 100);
    log.clear();
    assert!(log.snapshot().is_empty());
}

#[test]
fn test_clear_racing_appends_never_exceeds_capacity() {
    let log = Arc::new(SessionLog::new(10));

    let writer = {
        let log = Arc::clone(&log);
        std::thread::spawn(move || {
            for i in 0..1000 {
                log.append(record(i));
            }
        })
    };
    let clearer = {
        let log = Arc::clone(&log);
        std::thread::spawn(move || {
            for _ in 0..100 {
                log.clear();
                let snapshot = log.snapshot();
                assert!(snapshot.len() <= 10);
                assert!(snapshot.windows(2).all(|pair| pair[0].id > pair[1].id));
            }
        })
    };

    writer.join().unwrap();
    clearer.join().unwrap();
    assert!(log.len() <= 10);
}
