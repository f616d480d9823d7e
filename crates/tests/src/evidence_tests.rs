use chrono::Duration;
use fieldtrack_db::models::MediaType;
use fieldtrack_services::{MediaUpload, OverrideConsent, SyncEvent, TrackError};

use crate::fixtures::seed::{day, started_task};
use crate::fixtures::test_engine::{TestEngine, drain};

fn photo(name: &str) -> MediaUpload {
    MediaUpload {
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        file_name: name.to_string(),
        content_type: "image/jpeg".to_string(),
    }
}

#[tokio::test]
async fn attach_media_uploads_and_persists() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    let recorded = engine
        .evidence
        .attach_media(task_id, today, photo("span 4.jpg"))
        .await
        .unwrap();

    let uploads = engine.media.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].path.starts_with(&format!("achievements/{}/2026-07-15/", task_id.to_hex())));
    assert_eq!(uploads[0].content_type, "image/jpeg");

    let media = &recorded.task.achievement(today).unwrap().media;
    assert_eq!(media.len(), 1);
    assert!(!media[0].preview);
    assert_eq!(media[0].media_type, MediaType::Image);
    assert_eq!(media[0].size, 7);
    assert!(media[0].url.starts_with("https://media.test/"));

    let stored = engine.remote.record_for(task_id, today).unwrap();
    assert_eq!(stored.media, *media);
    assert_eq!(stored.value, 0.0);
}

#[tokio::test]
async fn preview_is_shown_before_upload_completes() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));
    let mut rx = engine.events();

    engine
        .evidence
        .attach_media(task_id, today, photo("a.jpg"))
        .await
        .unwrap();

    let first = drain(&mut rx).into_iter().next().unwrap();
    let SyncEvent::TaskUpdated(task) = first else {
        panic!("expected an optimistic task update first");
    };
    let media = &task.achievement(today).unwrap().media;
    assert_eq!(media.len(), 1);
    assert!(media[0].preview);
}

#[tokio::test]
async fn upload_failure_keeps_preview_locally_only() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));
    engine.media.set_failing(true);
    let mut rx = engine.events();

    let err = engine
        .evidence
        .attach_media(task_id, today, photo("a.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Upload(_)));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SyncEvent::UploadFailed { .. }))
    );
    assert_eq!(engine.remote.count(&engine.remote.inserts), 0);

    let local = engine.task(task_id);
    assert!(local.achievement(today).unwrap().media[0].preview);

    // A later save of the same day must not leak the preview.
    engine
        .achievements
        .record_value(task_id, today, 2.0, OverrideConsent::NotGiven)
        .await
        .unwrap();
    let stored = engine.remote.record_for(task_id, today).unwrap();
    assert_eq!(stored.value, 2.0);
    assert!(stored.media.is_empty());
}

#[tokio::test]
async fn detach_removes_exactly_one_item() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    engine
        .evidence
        .attach_media(task_id, today, photo("first.jpg"))
        .await
        .unwrap();
    engine.clock.advance(Duration::minutes(5));
    engine
        .evidence
        .attach_media(task_id, today, photo("second.jpg"))
        .await
        .unwrap();
    engine.clock.advance(Duration::minutes(5));
    engine
        .evidence
        .attach_media(task_id, today, photo("third.jpg"))
        .await
        .unwrap();

    let media = engine.task(task_id).achievement(today).unwrap().media.clone();
    assert_eq!(media.len(), 3);

    let recorded = engine
        .evidence
        .detach_media(task_id, today, media[1].timestamp)
        .await
        .unwrap();
    let remaining = &recorded.task.achievement(today).unwrap().media;
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].url, media[0].url);
    assert_eq!(remaining[1].url, media[2].url);
    assert_eq!(engine.remote.record_for(task_id, today).unwrap().media, *remaining);

    let err = engine
        .evidence
        .detach_media(task_id, today, media[1].timestamp)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Precondition(_)));
}

#[tokio::test]
async fn failed_detach_warns_it_may_reappear() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    let recorded = engine
        .evidence
        .attach_media(task_id, today, photo("a.jpg"))
        .await
        .unwrap();
    let timestamp = recorded.task.achievement(today).unwrap().media[0].timestamp;

    engine.remote.set_forbidden(true);
    let mut rx = engine.events();
    let err = engine
        .evidence
        .detach_media(task_id, today, timestamp)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Authorization(_)));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SyncEvent::DeletionMayReappear { .. }))
    );
    assert_eq!(engine.remote.record_for(task_id, today).unwrap().media.len(), 1);
    assert_eq!(engine.task(task_id).achievement(today).unwrap().media.len(), 1);
}

#[tokio::test]
async fn unsupported_files_are_rejected_before_upload() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    let err = engine
        .evidence
        .attach_media(
            task_id,
            today,
            MediaUpload {
                bytes: b"%PDF-1.7".to_vec(),
                file_name: "permit.pdf".to_string(),
                content_type: "application/pdf".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Validation(_)));

    let err = engine
        .evidence
        .attach_media(
            task_id,
            today,
            MediaUpload {
                bytes: Vec::new(),
                ..photo("empty.jpg")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Validation(_)));
    assert!(engine.media.uploads().is_empty());
    assert!(engine.task(task_id).achievements.is_empty());
}

#[tokio::test]
async fn voice_note_is_assembled_uploaded_and_saved() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    engine.evidence.start_voice_note(task_id, today).unwrap();
    assert_eq!(engine.evidence.push_voice_chunk(task_id, today, vec![1, 2, 3]).unwrap(), 3);
    assert_eq!(engine.evidence.push_voice_chunk(task_id, today, vec![4, 5]).unwrap(), 5);

    let recorded = engine.evidence.finish_voice_note(task_id, today).await.unwrap();

    let uploads = engine.media.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].bytes, vec![1, 2, 3, 4, 5]);
    assert_eq!(uploads[0].content_type, "audio/webm");

    let notes = &recorded.task.achievement(today).unwrap().voice_notes;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].size, 5);
    assert_eq!(engine.remote.record_for(task_id, today).unwrap().voice_notes, *notes);
    assert!(engine.evidence.sessions().is_empty());

    let recorded = engine
        .evidence
        .detach_voice_note(task_id, today, notes[0].timestamp)
        .await
        .unwrap();
    assert!(recorded.task.achievement(today).unwrap().voice_notes.is_empty());
}

#[tokio::test]
async fn voice_upload_failure_allows_retrying_finish() {
    let today = day(2026, 7, 15);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    engine.evidence.start_voice_note(task_id, today).unwrap();
    engine.evidence.push_voice_chunk(task_id, today, vec![9; 16]).unwrap();
    engine.media.set_failing(true);

    let err = engine
        .evidence
        .finish_voice_note(task_id, today)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Upload(_)));
    assert_eq!(engine.evidence.sessions().len(), 1);

    engine.media.set_failing(false);
    let recorded = engine.evidence.finish_voice_note(task_id, today).await.unwrap();
    assert_eq!(recorded.task.achievement(today).unwrap().voice_notes[0].size, 16);
}

#[tokio::test]
async fn voice_sessions_are_per_day() {
    let today = day(2026, 7, 15);
    let yesterday = day(2026, 7, 14);
    let engine = TestEngine::new(today);
    let task_id = engine.seed(started_task("Substation", 10.0, day(2026, 7, 1)));

    engine.evidence.start_voice_note(task_id, today).unwrap();
    engine.evidence.start_voice_note(task_id, yesterday).unwrap();
    assert!(engine.evidence.start_voice_note(task_id, today).is_err());

    engine.evidence.push_voice_chunk(task_id, today, vec![1]).unwrap();
    engine.evidence.push_voice_chunk(task_id, yesterday, vec![2, 2]).unwrap();

    assert!(engine.evidence.cancel_voice_note(task_id, yesterday));
    assert!(!engine.evidence.cancel_voice_note(task_id, yesterday));

    engine.evidence.finish_voice_note(task_id, today).await.unwrap();
    assert_eq!(engine.media.uploads()[0].bytes, vec![1]);
    assert!(engine.task(task_id).achievement(yesterday).is_none());
}
