// ABOUTME: Integration tests for the discussion control turn loop
// ABOUTME: Covers speaker routing, round limits, actions, run state and queued processing

mod common;

use common::*;
use roundtable_agent::backends::mock::MockBackend;
use roundtable_core::{
    ActionStatus, AgentDef, AgentRole, DiscussionEvent, ErrorKind, Member, Message, MessageDraft,
    MessageStatus, MessageStore, RunState, Settings, SYSTEM_AGENT_ID,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn limit_notices(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter_map(|m| m.as_text())
        .filter(|m| m.agent_id == SYSTEM_AGENT_ID && m.content.contains("limit"))
        .count()
}

#[tokio::test]
async fn test_mention_beats_auto_reply_moderator() {
    let mock = MockBackend::new()
        .on_prompt("You are Expert A")
        .respond_text("Expert take.")
        .on_prompt("You are Mia")
        .respond_text("Thanks, wrapping up.");
    let h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", false)],
        Settings::default(),
        mock,
    );

    let trigger = h.say("hello @expertA").await;
    h.control.process(trigger).await.unwrap();

    // Mentioned expert first, then the auto-reply moderator reacts to it
    assert_eq!(h.speakers(1).await, vec!["ea", "mod"]);
    let snapshot = h.control.snapshot();
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.current_speaker_id, None);
    assert!(snapshot.is_running);
}

#[tokio::test]
async fn test_participant_actions_skipped_without_permission() {
    let agent_x = AgentDef::new("x", "Agent X", "agentX", AgentRole::Participant);
    let mock = MockBackend::new().on_prompt("You are Agent X").respond_text(
        r#"Checking. <action>{"capability": "lookup", "params": {"term": "rust"}}</action>"#,
    );
    let h = harness(
        vec![agent_x],
        vec![Member::new("x", true)],
        Settings::default(),
        mock,
    );

    let trigger = h.say("go").await;
    h.control.process(trigger).await.unwrap();

    let transcript = h.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert!(transcript.iter().all(|m| m.is_text()));
    assert_eq!(transcript[1].agent_id(), "x");
    assert_eq!(h.control.snapshot().processed, 1);
}

#[tokio::test]
async fn test_action_result_routes_back_to_actor() {
    let mock = MockBackend::new()
        .on_prompt("You are Mia")
        .respond_text(r#"Let me check. <action>{"capability": "lookup", "params": {"term": "tokio"}}</action>"#)
        .on_prompt("[Action results]")
        .respond_text("Found it, over to the experts.")
        .on_prompt("You are Expert A")
        .respond_text("Agreed.");
    let h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", true)],
        Settings::default().with_max_rounds(3.0),
        mock,
    );

    let trigger = h.say("what is tokio?").await;
    h.control.process(trigger).await.unwrap();

    let transcript = h.transcript().await;
    let speakers: Vec<&str> = transcript.iter().map(|m| m.agent_id()).collect();
    assert_eq!(
        speakers,
        vec!["user", "mod", SYSTEM_AGENT_ID, "mod", "ea", SYSTEM_AGENT_ID]
    );

    let Message::ActionResult(report) = &transcript[2] else {
        panic!("expected action result, got {:?}", transcript[2]);
    };
    assert_eq!(report.origin_message_id, transcript[1].id());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].operation_id, "op-0");
    assert_eq!(report.results[0].description, "lookup");
    assert_eq!(report.results[0].status, ActionStatus::Success);
    assert_eq!(
        report.results[0].result,
        Some(serde_json::json!({"found": "tokio"}))
    );

    // The action turn counts once
    assert_eq!(limit_notices(&transcript), 1);
    assert_eq!(h.control.snapshot().state, RunState::Paused);
    assert_eq!(h.control.snapshot().processed, 3);
}

#[tokio::test]
async fn test_failed_action_reported_as_error_result() {
    let mock = MockBackend::new()
        .on_prompt("You are Mia")
        .respond_text(r#"<action>{"capability": "teleport", "operationId": "jump", "description": "Go"}</action>"#)
        .on_prompt("[Action results]")
        .respond_text("That did not work.");
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        mock,
    );

    let trigger = h.say("try it").await;
    h.control.process(trigger).await.unwrap();

    let transcript = h.transcript().await;
    let Message::ActionResult(report) = &transcript[2] else {
        panic!("expected action result");
    };
    assert_eq!(report.results[0].operation_id, "jump");
    assert_eq!(report.results[0].description, "Go");
    assert_eq!(report.results[0].status, ActionStatus::Error);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("Unknown capability"));
    assert_eq!(transcript[3].agent_id(), "mod");
}

#[tokio::test]
async fn test_explicit_permission_enables_participant_actions() {
    let mock = MockBackend::new()
        .on_prompt("You are Expert A")
        .respond_text(r#"<action>{"capability": "lookup", "params": {"term": "x"}}</action>"#)
        .on_prompt("[Action results]")
        .respond_text("Done.");
    let h = harness(
        vec![expert_a()],
        vec![Member::new("ea", true)],
        Settings::default().with_tool_permission(AgentRole::Participant, true),
        mock,
    );

    let trigger = h.say("look it up").await;
    h.control.process(trigger).await.unwrap();

    assert_eq!(h.speakers(1).await, vec!["ea", SYSTEM_AGENT_ID, "ea"]);
}

#[tokio::test]
async fn test_round_limit_posts_one_notice_and_pauses() {
    let mut h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", true)],
        Settings::default().with_max_rounds(2.0),
        MockBackend::new(),
    );

    let trigger = h.say("debate").await;
    h.control.process(trigger).await.unwrap();

    let transcript = h.transcript().await;
    assert_eq!(h.speakers(1).await, vec!["mod", "ea", SYSTEM_AGENT_ID]);
    assert_eq!(limit_notices(&transcript), 1);

    let snapshot = h.control.snapshot();
    assert_eq!(snapshot.state, RunState::Paused);
    assert_eq!(snapshot.processed, 2);

    let events = h.drain_events();
    let completed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            DiscussionEvent::TurnCompleted { processed, .. } => Some(*processed),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![1, 2]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, DiscussionEvent::RoundLimitReached { limit: 2 }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_new_message_after_limit_restarts_count() {
    let h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", true)],
        Settings::default().with_max_rounds(1.0),
        MockBackend::new(),
    );

    let first = h.say("one").await;
    h.control.process(first).await.unwrap();
    assert_eq!(h.control.snapshot().state, RunState::Paused);

    let second = h.say("two").await;
    h.control.process(second).await.unwrap();

    let transcript = h.transcript().await;
    assert_eq!(limit_notices(&transcript), 2);
    assert_eq!(h.control.snapshot().processed, 1);
}

#[tokio::test]
async fn test_round_limit_coercion() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new(),
    );

    h.control.set_settings(Settings::default().with_max_rounds(0.0));
    assert_eq!(h.control.snapshot().round_limit, 1);

    h.control.set_settings(Settings::default().with_max_rounds(3.7));
    assert_eq!(h.control.snapshot().round_limit, 3);
}

#[tokio::test]
async fn test_mentions_fan_out_one_per_turn() {
    let h = harness(
        vec![moderator(), expert_a(), expert_b()],
        vec![
            Member::new("mod", true),
            Member::new("ea", false),
            Member::new("eb", false),
        ],
        Settings::default(),
        MockBackend::new()
            .on_prompt("You are Expert A")
            .respond_text("A here.")
            .on_prompt("You are Expert B")
            .respond_text("B here.")
            .on_prompt("You are Mia")
            .respond_text("Summary."),
    );

    let trigger = h.say("@expertA and @expertB, thoughts?").await;
    h.control.process(trigger).await.unwrap();

    assert_eq!(h.speakers(1).await, vec!["ea", "eb", "mod"]);
}

#[tokio::test]
async fn test_empty_roster_does_not_start() {
    let h = harness(vec![moderator()], vec![], Settings::default(), MockBackend::new());

    let trigger = h.say("anyone?").await;
    h.control.process(trigger).await.unwrap();

    assert_eq!(h.transcript().await.len(), 1);
    assert_eq!(h.control.snapshot().state, RunState::Idle);
    assert!(h.mock.received().is_empty());
}

#[tokio::test]
async fn test_process_without_discussion_fails_and_pauses() {
    let mut h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new(),
    );
    h.control.set_current_discussion_id(None);
    let trigger = h.say("hello").await;

    let err = h.control.process(trigger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDiscussion);
    assert_eq!(h.control.snapshot().state, RunState::Paused);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, DiscussionEvent::Error(r) if r.kind == ErrorKind::NoDiscussion)));
}

#[tokio::test]
async fn test_trigger_from_other_discussion_is_ignored() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new(),
    );
    let stray = h
        .store
        .create_message(MessageDraft::user("elsewhere", "hi"))
        .await
        .unwrap();

    h.control.process(stray).await.unwrap();

    assert!(h.mock.received().is_empty());
    assert!(h.transcript().await.is_empty());
}

#[tokio::test]
async fn test_switching_discussion_resets_and_notifies() {
    let mut h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default().with_max_rounds(5.0),
        MockBackend::new(),
    );
    let trigger = h.say("hi").await;
    h.control.process(trigger).await.unwrap();
    assert_eq!(h.control.snapshot().processed, 1);
    h.drain_events();

    h.control.set_current_discussion_id(Some(DISCUSSION.to_string()));
    assert!(h.drain_events().is_empty());

    h.control.set_current_discussion_id(Some("d2".to_string()));
    let snapshot = h.control.snapshot();
    assert_eq!(snapshot.discussion_id.as_deref(), Some("d2"));
    assert_eq!(snapshot.processed, 0);
    assert_eq!(snapshot.round_limit, 5);
    assert_eq!(snapshot.state, RunState::Idle);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        DiscussionEvent::DiscussionChanged { discussion_id: Some(id) } if id == "d2"
    )));
}

#[tokio::test]
async fn test_switching_discussion_mid_stream_does_not_count_old_turn() {
    let mut h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", true)],
        Settings::default().with_max_rounds(5.0),
        MockBackend::new()
            .on_prompt("You are Mia")
            .with_chunk_delay(Duration::from_millis(50))
            .respond_chunks(&["slow ", "steady ", "reply"]),
    );
    let trigger = h.say("take your time").await;

    let control = Arc::clone(&h.control);
    let task = tokio::spawn(async move { control.process(trigger).await });

    let store = Arc::clone(&h.store);
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.list_messages(DISCUSSION).await.unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reply never started");

    h.control.set_current_discussion_id(Some("d2".to_string()));
    h.drain_events();
    task.await.unwrap().unwrap();

    let snapshot = h.control.snapshot();
    assert_eq!(snapshot.discussion_id.as_deref(), Some("d2"));
    assert_eq!(snapshot.state, RunState::Idle);
    assert_eq!(snapshot.processed, 0);
    assert!(!h
        .drain_events()
        .iter()
        .any(|e| matches!(e, DiscussionEvent::TurnCompleted { .. })));

    // The old discussion keeps its reply but no further speaker is scheduled
    assert_eq!(h.speakers(1).await, vec!["mod"]);
}

#[tokio::test]
async fn test_resume_from_action_result_returns_to_actor() {
    let h = harness(
        vec![moderator(), expert_a()],
        vec![Member::new("mod", true), Member::new("ea", true)],
        Settings::default()
            .with_max_rounds(1.0)
            .with_tool_permission(AgentRole::Participant, true),
        MockBackend::new()
            .on_prompt("[Action results]")
            .respond_text("Thanks, that settles it."),
    );
    h.say("look something up").await;
    let reply = h
        .store
        .create_message(MessageDraft::Normal {
            discussion_id: DISCUSSION.to_string(),
            agent_id: "ea".to_string(),
            content: r#"<action>{"capability": "lookup"}</action>"#.to_string(),
            status: Some(MessageStatus::Completed),
        })
        .await
        .unwrap();
    h.store
        .create_message(MessageDraft::ActionResult {
            discussion_id: DISCUSSION.to_string(),
            origin_message_id: reply.id().to_string(),
            results: vec![],
        })
        .await
        .unwrap();
    h.control.pause();

    h.control.resume_and_continue().await.unwrap();

    assert_eq!(h.speakers(3).await, vec!["ea", SYSTEM_AGENT_ID]);
}

#[tokio::test]
async fn test_pause_and_resume_transitions() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new(),
    );

    assert!(h.control.start_if_eligible());
    assert!(!h.control.start_if_eligible());
    h.control.pause();
    assert_eq!(h.control.snapshot().state, RunState::Paused);
    assert!(!h.control.is_running());

    h.control.resume();
    assert!(h.control.is_running());
    h.control.pause();
    h.control.run();
    assert_eq!(h.control.snapshot().processed, 0);
    assert!(h.control.snapshot().is_running);
}

#[tokio::test]
async fn test_resume_and_continue_picks_up_latest_message() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new()
            .on_prompt("You are Mia")
            .respond_text("Picking up."),
    );
    h.say("where were we").await;
    h.control.pause();

    h.control.resume_and_continue().await.unwrap();

    assert_eq!(h.speakers(1).await, vec!["mod"]);
}

#[tokio::test]
async fn test_concurrent_process_calls_do_not_interleave() {
    let mut h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new()
            .on_prompt("first")
            .with_chunk_delay(Duration::from_millis(20))
            .respond_chunks(&["reply ", "one"])
            .on_prompt("second")
            .respond_text("reply two"),
    );
    let first = h.say("first").await;
    let second = h.say("second").await;

    let (a, b) = tokio::join!(h.control.process(first), h.control.process(second));
    a.unwrap();
    b.unwrap();

    // Turns are strictly sequential
    let mut in_turn = false;
    for event in h.drain_events() {
        match event {
            DiscussionEvent::SpeakerStarted { .. } => {
                assert!(!in_turn, "turn started while another was active");
                in_turn = true;
            }
            DiscussionEvent::TurnCompleted { .. } => in_turn = false,
            _ => {}
        }
    }

    // The second call saw the settled reply of the first
    let received = h.mock.received();
    assert_eq!(received.len(), 2);
    assert!(received[1].prompt_text().contains("reply one"));

    let replies: Vec<String> = h
        .transcript()
        .await
        .iter()
        .skip(2)
        .filter_map(|m| m.as_text().map(|t| t.content.clone()))
        .collect();
    assert_eq!(replies, vec!["reply one", "reply two"]);
}

#[tokio::test]
async fn test_stream_error_marks_message_and_pauses() {
    let mut h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new().on_prompt("You are Mia").respond_partial_then_error(
            &["half "],
            roundtable_agent::ErrorCode::BackendError,
            "model crashed",
        ),
    );
    let trigger = h.say("go").await;

    let err = h.control.process(trigger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(err.detail().contains("model crashed"));

    let transcript = h.transcript().await;
    let reply = transcript[1].as_text().unwrap();
    assert_eq!(reply.status, Some(MessageStatus::Error));
    assert_eq!(reply.content, "half ");

    let snapshot = h.control.snapshot();
    assert_eq!(snapshot.state, RunState::Paused);
    assert_eq!(snapshot.processed, 0);
    assert_eq!(snapshot.current_speaker_id, None);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, DiscussionEvent::Error(r) if r.kind == ErrorKind::Generation)));
}

#[tokio::test]
async fn test_chunk_persistence_failure_marks_error_and_pauses() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new()
            .on_prompt("You are Mia")
            .respond_chunks(&["a", "b", "c"]),
    );
    h.store.fail_content_updates_after(1);
    let trigger = h.say("go").await;

    let err = h.control.process(trigger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);

    let transcript = h.transcript().await;
    let reply = transcript[1].as_text().unwrap();
    assert_eq!(reply.status, Some(MessageStatus::Error));
    assert_eq!(reply.content, "a");
    assert_eq!(h.control.snapshot().state, RunState::Paused);
}

#[tokio::test]
async fn test_reload_fires_for_every_write() {
    let h = harness(
        vec![moderator()],
        vec![Member::new("mod", true)],
        Settings::default(),
        MockBackend::new()
            .on_prompt("You are Mia")
            .respond_chunks(&["x", "y", "z"]),
    );
    let trigger = h.say("go").await;
    h.control.process(trigger).await.unwrap();

    // create + 3 chunks + finalize + end of process
    assert!(h.reloads.load(Ordering::SeqCst) >= 6);
}
