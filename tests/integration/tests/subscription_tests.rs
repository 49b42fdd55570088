//! Live subscription tests
//!
//! Run with: cargo test -p integration-tests --test subscription_tests

use circle_core::{ChangeFeed, ConversationId, NotificationKind};
use circle_service::dto::{SendDirectRequest, SendGroupRequest};
use circle_service::PresenceService;
use integration_tests::{next_snapshot, wait_for_snapshot, TestEngine, U1, U2, U3};
use tokio::sync::mpsc::unbounded_channel;

#[tokio::test]
async fn test_direct_conversation_snapshots() {
    let engine = TestEngine::start().unwrap();
    let conversation_id = ConversationId::direct(U1, U2).unwrap();
    let (tx, mut rx) = unbounded_channel();

    let handle = engine
        .subscriptions()
        .subscribe(conversation_id, U2, move |messages| {
            let _ = tx.send(messages);
        })
        .await
        .unwrap();

    // Initial snapshot arrives before any write
    assert!(next_snapshot(&mut rx).await.unwrap().is_empty());

    for text in ["a", "b", "c"] {
        engine
            .messages()
            .send_direct(U1, SendDirectRequest::text(U2, text))
            .await
            .unwrap();
    }

    // Every snapshot is the full list, so the last one carries all three in order
    let full = wait_for_snapshot(&mut rx, |m| m.len() == 3).await.unwrap();
    let texts: Vec<_> = full.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    engine.conversations().mark_read(&conversation_id, U2).await.unwrap();
    let read = wait_for_snapshot(&mut rx, |m| m.iter().all(|m| m.is_read)).await.unwrap();
    assert_eq!(read.len(), 3);

    handle.cancel();
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_releases_watchers() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    let (tx, mut rx) = unbounded_channel();

    let handle = engine
        .subscriptions()
        .subscribe(ConversationId::community(community.id), U1, move |messages| {
            let _ = tx.send(messages.len());
        })
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut rx).await, Some(0));
    assert_eq!(engine.store.hub.watcher_count(), 1);

    handle.cancel();
    handle.cancel();
    assert!(!handle.is_active());
    assert_eq!(engine.store.hub.watcher_count(), 0);

    engine
        .messages()
        .send_group(U1, community.id, SendGroupRequest::text("after cancel"))
        .await
        .unwrap();
    // No further snapshots; the sender half is dropped with the task
    assert_eq!(next_snapshot(&mut rx).await, None);
}

#[tokio::test]
async fn test_many_subscriptions_do_not_leak() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine.membership().join(community.id, U2).await.unwrap();

    for _ in 0..32 {
        let handles = vec![
            engine
                .subscriptions()
                .subscribe(ConversationId::community(community.id), U2, |_| {})
                .await
                .unwrap(),
            engine
                .subscriptions()
                .subscribe_presence(U2, |_| {})
                .await
                .unwrap(),
            engine
                .subscriptions()
                .subscribe_notifications(U2, |_| {})
                .await
                .unwrap(),
        ];
        assert_eq!(engine.store.hub.watcher_count(), 3);
        drop(handles);
        assert_eq!(engine.store.hub.watcher_count(), 0);
    }
}

#[tokio::test]
async fn test_presence_and_notification_streams() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, false).await.unwrap();

    let (presence_tx, mut presence_rx) = unbounded_channel();
    let _presence = engine
        .subscriptions()
        .subscribe_presence(U3, move |presence| {
            let _ = presence_tx.send(presence.map(|p| p.online));
        })
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut presence_rx).await, Some(None));

    PresenceService::new(&engine.ctx).set_online(U3).await.unwrap();
    assert!(wait_for_snapshot(&mut presence_rx, |p| *p == Some(true)).await.is_some());

    let (inbox_tx, mut inbox_rx) = unbounded_channel();
    let _inbox = engine
        .subscriptions()
        .subscribe_notifications(U1, move |unread| {
            let _ = inbox_tx.send(unread);
        })
        .await
        .unwrap();
    assert!(next_snapshot(&mut inbox_rx).await.unwrap().is_empty());

    engine.membership().join(community.id, U3).await.unwrap();
    let unread = wait_for_snapshot(&mut inbox_rx, |n| !n.is_empty()).await.unwrap();
    assert_eq!(unread[0].kind, NotificationKind::JoinRequest);
}

#[tokio::test]
async fn test_outsider_subscription_is_refused_without_watching() {
    let engine = TestEngine::start().unwrap();
    let conversation_id = ConversationId::direct(U1, U2).unwrap();

    let err = engine
        .subscriptions()
        .subscribe(conversation_id, U3, |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), circle_service::ErrorKind::NotAuthorized);
    assert_eq!(engine.store.hub.watcher_count(), 0);
}
