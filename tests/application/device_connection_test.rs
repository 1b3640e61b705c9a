use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;

use arunika::application::realtime::{ConnectionPhase, ErrorCode, OutboundFrame, OutboundMessage};
use arunika::application::saga::{SagaEventType, SagaState};
use arunika::domain::{DEFAULT_LANGUAGE, DeviceId, Session, SessionStatus, Turn, TurnRole};
use arunika::infrastructure::moderation::KeywordContentModerator;

use crate::helpers::{
    FRAME_BYTES, FailingSynthesizer, FlakySessionStore, FlakySynthesizer, HangingRecognizer,
    HarnessOptions, LISTENING_END, LISTENING_START, RecordingConversationModel, SlowSynthesizer,
    TEST_DEVICE, UnavailableRecognizer, drain, drain_events, harness, labels, messages,
};

fn frame() -> Bytes {
    Bytes::from(vec![0u8; FRAME_BYTES])
}

fn error_code(message: &OutboundMessage) -> Option<ErrorCode> {
    match message {
        OutboundMessage::Error { code, .. } => Some(*code),
        _ => None,
    }
}

#[tokio::test]
async fn given_three_frames_when_utterance_completes_then_reply_is_spoken_and_turns_recorded() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    for _ in 0..3 {
        h.connection.handle_binary(frame()).await.unwrap();
    }
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    let labels = labels(&frames);
    assert_eq!(
        &labels[..3],
        &["listening_start", "listening_end", "speaking_start"]
    );
    assert_eq!(labels.last(), Some(&"speaking_end"));
    let audio_frames = labels.iter().filter(|l| **l == "audio").count();
    assert!(audio_frames >= 1);
    assert_eq!(audio_frames, labels.len() - 4);

    let messages = messages(&frames);
    match &messages[1] {
        OutboundMessage::ListeningEnd { transcript, .. } => {
            assert_eq!(
                transcript,
                "Halo Arunika, apa kabar? Saya ingin bercerita tentang hari ini."
            );
        }
        other => panic!("expected listening_end, got {:?}", other),
    }

    let session = h.connection.session().await.unwrap();
    let roles: Vec<TurnRole> = session.turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![TurnRole::User, TurnRole::Assistant]);
    assert!(session.turns[0].timestamp <= session.turns[1].timestamp);

    let persisted = h.session_store.get(session.id).await.unwrap().unwrap();
    assert_eq!(persisted.turns.len(), 2);
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_no_frames_when_listening_ends_then_single_error_and_pipeline_not_invoked() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    assert_eq!(labels(&frames), vec!["listening_start", "error"]);
    match &messages(&frames)[1] {
        OutboundMessage::Error { code, message, .. } => {
            assert_eq!(*code, ErrorCode::StreamError);
            assert_eq!(message, "no audio data received");
        }
        other => panic!("expected error, got {:?}", other),
    }

    assert_eq!(h.saga_manager.instance_count().await, 0);
    assert!(h.connection.session().await.unwrap().turns.is_empty());
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_synthesis_failure_when_pipeline_runs_then_completed_steps_compensated_and_error_sent()
{
    let mut h = harness(HarnessOptions {
        synthesizer: Arc::new(FailingSynthesizer),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    assert_eq!(
        labels(&frames),
        vec!["listening_start", "listening_end", "error"]
    );
    assert_eq!(
        error_code(&messages(&frames)[2]),
        Some(ErrorCode::StreamError)
    );

    let events = drain_events(&mut h.events);
    let compensated: Vec<String> = events
        .iter()
        .filter(|e| e.event_type == SagaEventType::StepCompensated)
        .filter_map(|e| e.step_id.as_ref().map(|s| s.to_string()))
        .collect();
    assert_eq!(
        compensated,
        vec!["generate_reply", "validate_content", "transcribe"]
    );

    let saga_id = events
        .iter()
        .find(|e| e.event_type == SagaEventType::StepFailed)
        .map(|e| e.saga_id.clone())
        .unwrap();
    let instance = h.saga_manager.get(&saga_id).await.unwrap();
    assert_eq!(instance.state, SagaState::Compensated);

    assert!(h.connection.session().await.unwrap().turns.is_empty());
}

#[tokio::test]
async fn given_lapsed_session_when_listening_starts_then_old_session_terminated_and_new_one_created()
{
    let mut h = harness(HarnessOptions::default()).await;
    let now = Utc::now();
    let mut stale = Session::new_at(DeviceId::new(TEST_DEVICE), now - chrono::Duration::hours(3));
    stale.set_language("en-US".to_string(), now - chrono::Duration::hours(3));
    let last_turn_at = now - chrono::Duration::hours(2);
    stale
        .append_turn(Turn::user(last_turn_at, "hello".to_string(), 800), last_turn_at)
        .unwrap();
    h.session_store.create(&stale).await.unwrap();

    h.connection
        .handle_text(r#"{"type":"listening_start"}"#)
        .await
        .unwrap();

    let frames = drain(&mut h.outbound);
    let new_id = match &messages(&frames)[0] {
        OutboundMessage::ListeningStart {
            session_id, status, ..
        } => {
            assert_eq!(status, "ready");
            session_id.clone()
        }
        other => panic!("expected listening_start, got {:?}", other),
    };
    assert_ne!(new_id, stale.id.to_string());

    let old = h.session_store.get(stale.id).await.unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Terminated);

    let active = h
        .session_store
        .get_active(&DeviceId::new(TEST_DEVICE))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id.to_string(), new_id);
    assert_eq!(active.metadata.language, DEFAULT_LANGUAGE);
    assert!(active.turns.is_empty());
}

#[tokio::test]
async fn given_listening_when_second_listening_start_then_rejected_and_stream_unaffected() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_START).await.unwrap();

    assert_eq!(h.connection.phase().await, ConnectionPhase::Listening);

    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    let messages = messages(&frames);
    assert_eq!(error_code(&messages[1]), Some(ErrorCode::StateError));
    match &messages[2] {
        OutboundMessage::ListeningEnd { transcript, .. } => {
            assert_eq!(
                transcript,
                "Halo Arunika, apa kabar? Saya ingin bercerita tentang hari ini."
            );
        }
        other => panic!("expected listening_end, got {:?}", other),
    }
    assert_eq!(h.connection.session().await.unwrap().turns.len(), 2);
}

#[tokio::test]
async fn given_two_utterances_when_within_window_then_same_session_continues() {
    let mut h = harness(HarnessOptions::default()).await;

    for _ in 0..2 {
        h.connection.handle_text(LISTENING_START).await.unwrap();
        h.connection.handle_binary(frame()).await.unwrap();
        h.connection.handle_text(LISTENING_END).await.unwrap();
        h.connection.await_pending_reply().await;
    }

    let frames = drain(&mut h.outbound);
    let session_ids: Vec<String> = messages(&frames)
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::ListeningStart { session_id, .. } => Some(session_id),
            _ => None,
        })
        .collect();
    assert_eq!(session_ids.len(), 2);
    assert_eq!(session_ids[0], session_ids[1]);

    let session = h.connection.session().await.unwrap();
    assert_eq!(session.turns.len(), 4);
    let stored = h.session_store.get(session.id).await.unwrap().unwrap();
    assert_eq!(stored.turns.len(), 4);
}

#[tokio::test]
async fn given_blocked_words_when_transcript_matches_then_content_rejected() {
    let mut h = harness(HarnessOptions {
        moderator: Arc::new(KeywordContentModerator::new(["arunika"])),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    let messages = messages(&frames);
    assert_eq!(
        error_code(messages.last().unwrap()),
        Some(ErrorCode::ContentRejected)
    );
    assert!(!frames.iter().any(|f| matches!(f, OutboundFrame::Binary(_))));
}

#[tokio::test]
async fn given_slow_synthesis_when_deadline_passes_then_timeout_error_sent() {
    let mut h = harness(HarnessOptions {
        synthesizer: Arc::new(SlowSynthesizer {
            delay: Duration::from_millis(500),
        }),
        pipeline_timeout: Duration::from_millis(50),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    assert_eq!(
        error_code(messages(&frames).last().unwrap()),
        Some(ErrorCode::TimeoutError)
    );
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_malformed_messages_when_received_then_validation_errors_and_state_unchanged() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text("not json").await.unwrap();
    h.connection
        .handle_text(r#"{"type":"listening_start","sample_rate":100}"#)
        .await
        .unwrap();
    h.connection
        .handle_text(r#"{"type":"dance"}"#)
        .await
        .unwrap();

    let frames = drain(&mut h.outbound);
    let codes: Vec<Option<ErrorCode>> = messages(&frames).iter().map(error_code).collect();
    assert_eq!(codes, vec![Some(ErrorCode::ValidationError); 3]);
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
    assert!(h.connection.session().await.is_none());
}

#[tokio::test]
async fn given_idle_when_listening_end_then_state_error() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text(LISTENING_END).await.unwrap();

    let frames = drain(&mut h.outbound);
    assert_eq!(
        error_code(&messages(&frames)[0]),
        Some(ErrorCode::StateError)
    );
}

#[tokio::test]
async fn given_ping_when_received_then_pong_sent() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection
        .handle_text(r#"{"type":"ping","timestamp":1}"#)
        .await
        .unwrap();

    assert_eq!(labels(&drain(&mut h.outbound)), vec!["pong"]);
}

#[tokio::test]
async fn given_idle_when_audio_frame_arrives_then_dropped_without_reply() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_binary(frame()).await.unwrap();

    assert!(drain(&mut h.outbound).is_empty());
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_store_unavailable_when_listening_starts_then_resource_error_and_idle() {
    let mut h = harness(HarnessOptions {
        session_store: Arc::new(FlakySessionStore {
            fail_lookups: true,
            ..FlakySessionStore::default()
        }),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();

    let frames = drain(&mut h.outbound);
    assert_eq!(
        error_code(&messages(&frames)[0]),
        Some(ErrorCode::ResourceError)
    );
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_store_rejects_writes_when_reply_delivered_then_turns_kept_in_memory() {
    let mut h = harness(HarnessOptions {
        session_store: Arc::new(FlakySessionStore {
            fail_updates: true,
            ..FlakySessionStore::default()
        }),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();
    h.connection.await_pending_reply().await;

    let frames = drain(&mut h.outbound);
    assert_eq!(labels(&frames).last(), Some(&"speaking_end"));
    assert!(!labels(&frames).contains(&"error"));

    let session = h.connection.session().await.unwrap();
    assert_eq!(session.turns.len(), 2);
    let stored = h.session_store.get(session.id).await.unwrap().unwrap();
    assert!(stored.turns.is_empty());
}

#[tokio::test]
async fn given_device_gone_when_reply_ready_then_turns_not_appended() {
    let h = harness(HarnessOptions {
        synthesizer: Arc::new(SlowSynthesizer {
            delay: Duration::from_millis(50),
        }),
        ..HarnessOptions::default()
    })
    .await;
    let mut connection = h.connection;
    let outbound = h.outbound;

    connection.handle_text(LISTENING_START).await.unwrap();
    connection.handle_binary(frame()).await.unwrap();
    connection.handle_text(LISTENING_END).await.unwrap();
    drop(outbound);
    connection.await_pending_reply().await;

    assert!(connection.session().await.unwrap().turns.is_empty());
    assert_eq!(connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_listening_when_torn_down_then_back_to_idle() {
    let mut h = harness(HarnessOptions::default()).await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.teardown().await;

    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
    h.connection.handle_binary(frame()).await.unwrap();
    assert_eq!(labels(&drain(&mut h.outbound)), vec!["listening_start"]);
}

#[tokio::test]
async fn given_failed_reply_when_next_utterance_starts_then_conversation_reseeded_from_session() {
    let model = RecordingConversationModel::default();
    let seeded_turns = Arc::clone(&model.seeded_turns);
    let history_at_send = Arc::clone(&model.history_at_send);
    let mut h = harness(HarnessOptions {
        synthesizer: Arc::new(FlakySynthesizer::default()),
        conversation_model: Arc::new(model),
        ..HarnessOptions::default()
    })
    .await;

    for _ in 0..2 {
        h.connection.handle_text(LISTENING_START).await.unwrap();
        h.connection.handle_binary(frame()).await.unwrap();
        h.connection.handle_text(LISTENING_END).await.unwrap();
        h.connection.await_pending_reply().await;
    }

    let frames = drain(&mut h.outbound);
    assert_eq!(labels(&frames).iter().filter(|l| **l == "error").count(), 1);
    assert_eq!(labels(&frames).last(), Some(&"speaking_end"));

    assert_eq!(*seeded_turns.lock().unwrap(), vec![0, 0]);
    assert_eq!(*history_at_send.lock().unwrap(), vec![0, 0]);
    assert_eq!(h.connection.session().await.unwrap().turns.len(), 2);
}

#[tokio::test]
async fn given_reply_streaming_when_connection_turns_idle_then_speaking_end_already_queued() {
    let mut h = harness(HarnessOptions {
        outbound_capacity: 1,
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    drain(&mut h.outbound);
    h.connection.handle_binary(frame()).await.unwrap();
    h.connection.handle_text(LISTENING_END).await.unwrap();

    let mut received = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), h.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(frame);
        if h.connection.phase().await == ConnectionPhase::Idle {
            break;
        }
    }
    received.extend(drain(&mut h.outbound));
    h.connection.await_pending_reply().await;

    assert_eq!(labels(&received).first(), Some(&"listening_end"));
    assert_eq!(labels(&received).last(), Some(&"speaking_end"));
    assert_eq!(h.connection.session().await.unwrap().turns.len(), 2);
}

#[tokio::test]
async fn given_recognizer_stuck_when_torn_down_then_close_bounded_by_recognition_timeout() {
    let mut h = harness(HarnessOptions {
        recognizer: Arc::new(HangingRecognizer),
        recognition_close_timeout: Duration::from_millis(20),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();
    h.connection.handle_binary(frame()).await.unwrap();

    tokio::time::timeout(Duration::from_millis(500), h.connection.teardown())
        .await
        .expect("teardown waited past the recognition close timeout");
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);
}

#[tokio::test]
async fn given_recognizer_unavailable_when_listening_starts_then_error_ack_carries_session_id() {
    let mut h = harness(HarnessOptions {
        recognizer: Arc::new(UnavailableRecognizer),
        ..HarnessOptions::default()
    })
    .await;

    h.connection.handle_text(LISTENING_START).await.unwrap();

    let frames = drain(&mut h.outbound);
    assert_eq!(labels(&frames), vec!["listening_start", "error"]);
    let messages = messages(&frames);
    let session_id = match &messages[0] {
        OutboundMessage::ListeningStart {
            session_id, status, ..
        } => {
            assert_eq!(status, "error");
            session_id.clone()
        }
        other => panic!("expected listening_start, got {:?}", other),
    };
    assert_eq!(error_code(&messages[1]), Some(ErrorCode::StreamError));
    assert_eq!(h.connection.phase().await, ConnectionPhase::Idle);

    let active = h
        .session_store
        .get_active(&DeviceId::new(TEST_DEVICE))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id.to_string(), session_id);
}
