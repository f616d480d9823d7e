use chrono::Duration;
use fieldtrack_services::{AttendanceState, OverrideConsent, TrackError};

use crate::fixtures::seed::{day, planned_task, started_task};
use crate::fixtures::test_engine::TestEngine;

fn crew() -> Vec<String> {
    vec!["ana".to_string(), "budi".to_string()]
}

#[tokio::test]
async fn check_in_then_out_records_hours_and_overtime() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Pole install", 40.0, day(2026, 5, 1)));

    let recorded = engine
        .achievements
        .check_in(task_id, today, crew())
        .await
        .unwrap();
    let entry = recorded.task.achievement(today).unwrap();
    assert_eq!(entry.participants, crew());
    assert_eq!(
        entry.check_in.as_ref().unwrap().location,
        engine.geolocation.position()
    );
    assert_eq!(
        engine.achievements.attendance_state(task_id, today).unwrap(),
        AttendanceState::CheckedIn
    );

    engine.clock.advance(Duration::minutes(9 * 60 + 30));
    let checked_out = engine.achievements.check_out(task_id, today).await.unwrap();
    assert_eq!(checked_out.summary.work_hours, 9.5);
    assert_eq!(checked_out.summary.overtime_hours, 1.5);

    let stored = engine.remote.record_for(task_id, today).unwrap();
    assert!(stored.check_in.is_some());
    assert!(stored.check_out.is_some());
    assert_eq!(stored.work_hours, Some(9.5));
    assert_eq!(stored.overtime_hours, Some(1.5));
    // Attendance never touches the achieved value.
    assert_eq!(stored.value, 0.0);
    assert_eq!(engine.remote.records().len(), 1);
    assert_eq!(
        engine.achievements.attendance_state(task_id, today).unwrap(),
        AttendanceState::CheckedOut
    );
}

#[tokio::test]
async fn task_planned_hours_override_the_default() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let mut task = started_task("Pole install", 40.0, day(2026, 5, 1));
    task.planned_hours_per_day = Some(6.0);
    let task_id = engine.seed(task);

    engine.achievements.check_in(task_id, today, crew()).await.unwrap();
    engine.clock.advance(Duration::hours(7));
    let checked_out = engine.achievements.check_out(task_id, today).await.unwrap();
    assert_eq!(checked_out.summary.work_hours, 7.0);
    assert_eq!(checked_out.summary.overtime_hours, 1.0);
}

#[tokio::test]
async fn check_in_keeps_the_value_recorded_earlier() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Pole install", 40.0, day(2026, 5, 1)));

    engine
        .achievements
        .record_value(task_id, today, 12.0, OverrideConsent::NotGiven)
        .await
        .unwrap();
    engine.achievements.check_in(task_id, today, crew()).await.unwrap();

    let stored = engine.remote.record_for(task_id, today).unwrap();
    assert_eq!(stored.value, 12.0);
    assert!(stored.check_in.is_some());
}

#[tokio::test]
async fn check_in_preconditions() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let unstarted = engine.seed(planned_task("Fit-out", 10.0, day(2026, 5, 1), day(2026, 6, 1)));
    let started = engine.seed(started_task("Pole install", 40.0, day(2026, 5, 1)));

    let err = engine
        .achievements
        .check_in(unstarted, today, crew())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));

    let err = engine
        .achievements
        .check_in(started, today, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));

    let err = engine
        .achievements
        .check_in(started, day(2026, 5, 3), crew())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));

    // Guards run before the device is asked for a position.
    assert_eq!(
        engine
            .geolocation
            .reads
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert!(engine.remote.records().is_empty());
}

#[tokio::test]
async fn one_session_per_day() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Pole install", 40.0, day(2026, 5, 1)));

    let err = engine.achievements.check_out(task_id, today).await.unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));

    engine.achievements.check_in(task_id, today, crew()).await.unwrap();
    let err = engine
        .achievements
        .check_in(task_id, today, crew())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));

    engine.clock.advance(Duration::hours(8));
    engine.achievements.check_out(task_id, today).await.unwrap();
    assert!(engine.achievements.check_out(task_id, today).await.is_err());
    assert!(engine.achievements.check_in(task_id, today, crew()).await.is_err());
}

#[tokio::test]
async fn geolocation_failure_leaves_no_session() {
    let today = day(2026, 5, 4);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Pole install", 40.0, day(2026, 5, 1)));
    engine.geolocation.set_failing(true);

    let err = engine
        .achievements
        .check_in(task_id, today, crew())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Geolocation(ref m) if m.contains("permission denied")));
    assert_eq!(
        engine.achievements.attendance_state(task_id, today).unwrap(),
        AttendanceState::NoSession
    );
    assert!(engine.task(task_id).achievement(today).is_none());
    assert!(engine.remote.records().is_empty());

    engine.geolocation.set_failing(false);
    engine.achievements.check_in(task_id, today, crew()).await.unwrap();
    engine.geolocation.set_failing(true);
    engine.clock.advance(Duration::hours(4));

    let err = engine.achievements.check_out(task_id, today).await.unwrap_err();
    assert!(matches!(err, TrackError::Geolocation(_)));
    assert_eq!(
        engine.achievements.attendance_state(task_id, today).unwrap(),
        AttendanceState::CheckedIn
    );
    assert!(engine.remote.record_for(task_id, today).unwrap().check_out.is_none());
}
