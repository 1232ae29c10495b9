use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ember_types::{FULFILLMENT_FAILED_TEXT, IMAGE_GENERATED_TEXT};
use tracing_test::traced_test;

use super::*;
use crate::backend::fake::FakeBackend;
use crate::entities::{ChannelRecord, ImageRecord};

const DRAIN: Duration = Duration::from_secs(5);

async fn setup(backend: FakeBackend) -> (Orchestrator, Arc<SqliteStore>, Arc<FakeBackend>, String) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let channel = ChannelRecord::new("general");
    let channel_id = channel.id.clone();
    store.create_channel(channel).await.unwrap();
    let backend = Arc::new(backend);
    let orch =
        Orchestrator::new(Arc::clone(&store), backend.clone(), OrchestratorSettings::default());
    (orch, store, backend, channel_id)
}

async fn reload(store: &SqliteStore, id: &str) -> MessageRecord {
    store.get_message(id).await.unwrap().expect("message exists")
}

#[tokio::test]
async fn placeholder_is_pending_and_empty_until_backend_returns() {
    let (backend, gate) = FakeBackend::replying("Hello there").gated();
    let (orch, store, _backend, channel_id) = setup(backend).await;

    let turn = orch
        .submit_turn(&channel_id, Some("Hi".into()), None)
        .await
        .unwrap();
    assert!(turn.placeholder.pending);
    assert!(turn.placeholder.text.is_empty());
    assert_eq!(turn.placeholder.role, ember_types::Role::Assistant);
    assert_eq!(turn.user_message.text, "Hi");

    let stored = reload(&store, &turn.placeholder.id).await;
    assert!(stored.pending);
    assert!(stored.text.is_empty());
    assert_eq!(orch.in_flight(), 1);

    gate.add_permits(1);
    orch.drain(DRAIN).await;

    let done = reload(&store, &turn.placeholder.id).await;
    assert!(!done.pending);
    assert_eq!(done.text, "Hello there");
    assert!(done.image_ref.is_none());
}

#[tokio::test]
async fn text_reply_is_sanitized() {
    let (orch, store, backend, channel_id) =
        setup(FakeBackend::replying("  Sure... here -- it is\r\n")).await;

    let turn = orch
        .submit_turn(&channel_id, Some("go on".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    assert_eq!(reload(&store, &turn.placeholder.id).await.text, "Sure… here — it is");
    assert_eq!(backend.text_calls(), 1);
    assert_eq!(backend.image_calls(), 0);
}

#[tokio::test]
async fn directive_routes_to_image_branch() {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("unused")).await;

    let turn = orch
        .submit_turn(&channel_id, Some("/IMAGINE a red fox".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    let done = reload(&store, &turn.placeholder.id).await;
    assert!(!done.pending);
    assert_eq!(done.text, IMAGE_GENERATED_TEXT);
    let image_id = done.image_ref.expect("image reference written");
    assert!(store.image_exists(&image_id).await.unwrap());
    assert_eq!(backend.prompts(), vec!["a red fox".to_owned()]);
    assert_eq!(backend.text_calls(), 0);
}

#[tokio::test]
async fn bare_directive_uses_default_prompt() {
    let (orch, _store, backend, channel_id) = setup(FakeBackend::replying("unused")).await;

    orch.submit_turn(&channel_id, Some("/imagine".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    assert_eq!(
        backend.prompts(),
        vec![directive::DEFAULT_IMAGE_PROMPT.to_owned()]
    );
}

#[tokio::test]
#[traced_test]
async fn backend_failure_writes_fallback_text() {
    let (orch, store, _backend, channel_id) = setup(FakeBackend::failing()).await;

    let text_turn = orch
        .submit_turn(&channel_id, Some("hello".into()), None)
        .await
        .unwrap();
    let image_turn = orch
        .submit_turn(&channel_id, Some("/imagine a boat".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    for id in [&text_turn.placeholder.id, &image_turn.placeholder.id] {
        let done = reload(&store, id).await;
        assert!(!done.pending);
        assert_eq!(done.text, FULFILLMENT_FAILED_TEXT);
        assert!(done.image_ref.is_none());
    }
    assert!(logs_contain("fulfillment failed"));
}

#[tokio::test]
async fn panicking_worker_still_resolves_placeholder() {
    let (orch, store, _backend, channel_id) = setup(FakeBackend::panicking()).await;

    let turn = orch
        .submit_turn(&channel_id, Some("boom".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    let done = reload(&store, &turn.placeholder.id).await;
    assert!(!done.pending);
    assert_eq!(done.text, FULFILLMENT_FAILED_TEXT);
}

#[tokio::test]
async fn second_schedule_for_same_placeholder_is_ignored() {
    let (backend, gate) = FakeBackend::replying("once").gated();
    let (orch, store, backend, channel_id) = setup(backend).await;

    let turn = orch
        .submit_turn(&channel_id, Some("hi".into()), None)
        .await
        .unwrap();
    let again = Job::for_turn(&turn.user_message, &turn.placeholder);
    assert!(!orch.schedule(again));

    gate.add_permits(2);
    orch.drain(DRAIN).await;

    assert_eq!(backend.text_calls(), 1);
    assert_eq!(reload(&store, &turn.placeholder.id).await.text, "once");
}

async fn prompt_with_history(prior: usize) -> String {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("ok")).await;
    for i in 0..prior {
        let mut msg = MessageRecord::user(&channel_id, Some(format!("m{i}")), None);
        msg.created_at = Utc::now() - chrono::Duration::seconds((prior - i) as i64 + 60);
        store.insert_message(msg).await.unwrap();
    }
    orch.submit_turn(&channel_id, Some("latest".into()), None)
        .await
        .unwrap();
    orch.drain(DRAIN).await;
    backend.prompts().pop().expect("one text call")
}

#[tokio::test]
async fn short_history_is_sent_whole() {
    let prompt = prompt_with_history(3).await;
    assert_eq!(prompt, "User: m0\nUser: m1\nUser: m2\nUser: latest\nAssistant:");
}

#[tokio::test]
async fn long_history_is_cut_to_window() {
    for prior in [10, 15] {
        let prompt = prompt_with_history(prior).await;
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines.len(), 11, "{prior} prior messages");
        assert_eq!(lines[9], "User: latest");
        assert_eq!(lines[10], "Assistant:");
        assert_eq!(lines[0], format!("User: m{}", prior - 9));
    }
}

async fn store_upload(store: &SqliteStore, id: &str) {
    store
        .insert_image(ImageRecord {
            id: id.into(),
            filename: Some("cat.png".into()),
            content_type: "image/png".into(),
            data: vec![1, 2, 3],
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn attachment_is_referenced_by_id() {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("nice photo")).await;
    store_upload(&store, "img-1").await;

    let turn = orch
        .submit_turn(&channel_id, None, Some("img-1".into()))
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    assert_eq!(
        backend.prompts(),
        vec!["User: [image]\nAssistant:\nUser attached image: img-1".to_owned()]
    );
    assert_eq!(reload(&store, &turn.placeholder.id).await.text, "nice photo");
}

#[tokio::test]
async fn directive_wins_over_attached_image() {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("unused")).await;
    store_upload(&store, "img-1").await;

    let turn = orch
        .submit_turn(&channel_id, Some("/imagine a fox".into()), Some("img-1".into()))
        .await
        .unwrap();
    orch.drain(DRAIN).await;

    assert_eq!(backend.image_calls(), 1);
    assert_eq!(backend.text_calls(), 0);
    assert_eq!(backend.prompts(), vec!["a fox".to_owned()]);

    let user = reload(&store, &turn.user_message.id).await;
    assert_eq!(user.image_ref.as_deref(), Some("img-1"));

    let reply = reload(&store, &turn.placeholder.id).await;
    assert!(!reply.pending);
    assert_eq!(reply.text, IMAGE_GENERATED_TEXT);
    let generated = reply.image_ref.expect("generated image id");
    assert_ne!(generated, "img-1");
    assert!(store.image_exists(&generated).await.unwrap());
}

#[tokio::test]
async fn drain_deadline_stops_the_worker_too() {
    let (backend, gate) = FakeBackend::replying("too late").gated();
    let (orch, store, backend, channel_id) = setup(backend).await;

    let turn = orch
        .submit_turn(&channel_id, Some("hi".into()), None)
        .await
        .unwrap();
    while backend.text_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    orch.drain(Duration::from_millis(50)).await;
    assert_eq!(orch.in_flight(), 0);

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stored = reload(&store, &turn.placeholder.id).await;
    assert!(stored.pending);
    assert!(stored.text.is_empty());
    assert_eq!(backend.text_calls(), 1);
}

#[tokio::test]
async fn failed_placeholder_insert_leaves_no_user_turn() {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("x")).await;
    sqlx::query(
        "CREATE TRIGGER reject_assistant BEFORE INSERT ON messages \
         WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    assert!(orch.submit_turn(&channel_id, Some("hi".into()), None).await.is_err());
    assert!(store.list_messages(&channel_id).await.unwrap().is_empty());
    assert_eq!(orch.in_flight(), 0);
    assert_eq!(backend.text_calls(), 0);
}

#[tokio::test]
async fn concurrent_turns_resolve_independently() {
    let (orch, store, backend, channel_id) = setup(FakeBackend::replying("ack")).await;

    let first = orch
        .submit_turn(&channel_id, Some("one".into()), None)
        .await
        .unwrap();
    let second = orch
        .submit_turn(&channel_id, Some("two".into()), None)
        .await
        .unwrap();
    assert_ne!(first.placeholder.id, second.placeholder.id);
    orch.drain(DRAIN).await;

    for id in [&first.placeholder.id, &second.placeholder.id] {
        assert_eq!(reload(&store, id).await.text, "ack");
    }
    assert_eq!(backend.text_calls(), 2);
    assert_eq!(store.list_messages(&channel_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn rejects_bad_submissions() {
    let (orch, _store, backend, channel_id) = setup(FakeBackend::replying("x")).await;

    assert!(matches!(
        orch.submit_turn("", Some("hi".into()), None).await,
        Err(ServerError::BadRequest(_))
    ));
    assert!(matches!(
        orch.submit_turn("nope", Some("hi".into()), None).await,
        Err(ServerError::NotFound(_))
    ));
    assert!(matches!(
        orch.submit_turn(&channel_id, None, Some("ghost".into())).await,
        Err(ServerError::NotFound(_))
    ));
    assert_eq!(orch.in_flight(), 0);
    assert_eq!(backend.text_calls(), 0);
}

#[tokio::test]
async fn stale_placeholders_are_recovered() {
    let (orch, store, _backend, channel_id) = setup(FakeBackend::replying("x")).await;
    let stale = MessageRecord::placeholder(&channel_id);
    store.insert_message(stale.clone()).await.unwrap();

    assert_eq!(orch.recover_stale_placeholders().await.unwrap(), 1);
    let done = reload(&store, &stale.id).await;
    assert!(!done.pending);
    assert_eq!(done.text, FULFILLMENT_FAILED_TEXT);
    assert_eq!(orch.recover_stale_placeholders().await.unwrap(), 0);
}
