//! End-to-end scenarios over the services and the in-memory store
//!
//! Run with: cargo test -p integration-tests --test scenario_tests

use chrono::Duration;
use circle_core::entities::is_well_formed_invite_code;
use circle_core::{ConversationId, DomainError, MemberRole, MessageStatus, NotificationKind};
use circle_service::dto::{
    BanRequest, GenerateInviteRequest, HistoryQuery, MuteRequest, SendDirectRequest,
    SendGroupRequest,
};
use circle_service::{ErrorKind, JoinOutcome};
use integration_tests::{TestEngine, U1, U2, U3, U4, U5};

// ============================================================================
// Membership Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_public_join_adds_member() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    assert_eq!(community.members.iter().copied().collect::<Vec<_>>(), vec![U1]);
    assert_eq!(community.admins.iter().copied().collect::<Vec<_>>(), vec![U1]);

    let outcome = engine.membership().join(community.id, U2).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Joined);

    let community = engine.reload(community.id).await.unwrap();
    assert_eq!(community.members.iter().copied().collect::<Vec<_>>(), vec![U1, U2]);
    assert_eq!(community.members_count, 2);
    assert!(community.join_requests.is_empty());
}

#[tokio::test]
async fn test_scenario_b_private_join_goes_through_approval() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, false).await.unwrap();
    engine
        .membership()
        .bulk_add(community.id, &[U2], U1)
        .await
        .unwrap();

    let outcome = engine.membership().join(community.id, U3).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Requested);

    let pending = engine.reload(community.id).await.unwrap();
    assert_eq!(pending.members.iter().copied().collect::<Vec<_>>(), vec![U1, U2]);
    let requested: Vec<_> = pending.join_requests.iter().map(|r| r.user_id).collect();
    assert_eq!(requested, vec![U3]);

    // The creator hears about the request
    let inbox = engine.notifications().inbox(U1, true, 10).await.unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationKind::JoinRequest));

    engine.membership().approve(community.id, U3, U1).await.unwrap();

    let approved = engine.reload(community.id).await.unwrap();
    assert_eq!(approved.members.iter().copied().collect::<Vec<_>>(), vec![U1, U2, U3]);
    assert!(approved.join_requests.is_empty());
    assert_eq!(approved.members_count, 3);

    let inbox = engine.notifications().inbox(U3, true, 10).await.unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationKind::JoinApproved));
}

#[tokio::test]
async fn test_duplicate_join_request_is_rejected() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, false).await.unwrap();

    engine.membership().join(community.id, U2).await.unwrap();
    let err = engine.membership().join(community.id, U2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    engine.membership().cancel_request(community.id, U2).await.unwrap();
    assert_eq!(
        engine.membership().join(community.id, U2).await.unwrap(),
        JoinOutcome::Requested
    );
}

// ============================================================================
// Invite Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_c_single_use_invite() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, false).await.unwrap();

    let invite = engine
        .invites()
        .generate(
            community.id,
            U1,
            GenerateInviteRequest::default().expiring_in(60).limited_to(1),
        )
        .await
        .unwrap();
    assert_eq!(invite.code.len(), 8);
    assert!(is_well_formed_invite_code(&invite.code));

    let joined = engine.invites().redeem(&invite.code, U4).await.unwrap();
    assert_eq!(joined, community.id);
    assert!(engine.reload(community.id).await.unwrap().is_member(U4));

    let err = engine.invites().redeem(&invite.code, U5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InviteUsageExceeded);
    assert!(!engine.reload(community.id).await.unwrap().is_member(U5));
}

#[tokio::test]
async fn test_expired_invite_fails_below_usage_limit() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();

    let invite = engine
        .invites()
        .generate(
            community.id,
            U1,
            GenerateInviteRequest::default().expiring_in(60).limited_to(5),
        )
        .await
        .unwrap();

    engine.advance(Duration::minutes(61));

    let err = engine.invites().redeem(&invite.code, U2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InviteExpired);

    let preview = engine.invites().describe(&invite.code).await.unwrap_err();
    assert_eq!(preview.kind(), ErrorKind::InviteExpired);
}

#[tokio::test]
async fn test_revoked_invite_is_unknown() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    let invite = engine
        .invites()
        .generate(community.id, U1, GenerateInviteRequest::default())
        .await
        .unwrap();

    engine.invites().revoke(community.id, U1).await.unwrap();

    let err = engine.invites().redeem(&invite.code, U2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInviteCode);
}

// ============================================================================
// Moderation Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_e_admin_cannot_ban_admin() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine
        .membership()
        .bulk_add(community.id, &[U2, U3], U1)
        .await
        .unwrap();
    engine
        .membership()
        .bulk_promote(community.id, &[U2, U3], U1)
        .await
        .unwrap();

    let err = engine
        .moderation()
        .ban(community.id, U3, U2, BanRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAuthorized);

    let community = engine.reload(community.id).await.unwrap();
    assert!(community.is_admin(U3));
    assert!(community.ban_of(U3).is_none());
}

#[tokio::test]
async fn test_ban_evicts_until_unbanned() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine.membership().join(community.id, U2).await.unwrap();
    engine.membership().promote(community.id, U2, U1).await.unwrap();

    engine
        .moderation()
        .ban(community.id, U2, U1, BanRequest { reason: Some("spam".into()) })
        .await
        .unwrap();

    let banned = engine.reload(community.id).await.unwrap();
    assert!(!banned.is_member(U2));
    assert!(!banned.is_admin(U2));
    assert_eq!(engine.role(community.id, U2).await.unwrap(), MemberRole::Banned);

    let err = engine.membership().join(community.id, U2).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::UserBanned)));

    engine.moderation().unban(community.id, U2, U1).await.unwrap();
    assert_eq!(
        engine.membership().join(community.id, U2).await.unwrap(),
        JoinOutcome::Joined
    );
}

#[tokio::test]
async fn test_creator_cannot_be_banned_or_leave() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine.membership().join(community.id, U2).await.unwrap();
    engine.membership().promote(community.id, U2, U1).await.unwrap();

    let err = engine
        .moderation()
        .ban(community.id, U1, U2, BanRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = engine.membership().leave(community.id, U1).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::CreatorCannotLeave)));
    assert!(engine.reload(community.id).await.unwrap().invariants_hold());
}

#[tokio::test]
async fn test_mute_expires_with_the_clock() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine.membership().join(community.id, U2).await.unwrap();

    engine
        .moderation()
        .mute(community.id, U2, U1, MuteRequest::minutes(10))
        .await
        .unwrap();
    assert!(engine.moderation().is_muted(community.id, U2).await.unwrap());

    let err = engine
        .messages()
        .send_group(U2, community.id, SendGroupRequest::text("let me talk"))
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::UserMuted { .. })));

    engine.advance(Duration::minutes(11));
    assert!(!engine.moderation().is_muted(community.id, U2).await.unwrap());
    engine
        .messages()
        .send_group(U2, community.id, SendGroupRequest::text("thanks"))
        .await
        .unwrap();

    let err = engine
        .moderation()
        .mute(community.id, U2, U1, MuteRequest::minutes(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

// ============================================================================
// Messaging Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_d_direct_message_lifecycle() {
    let engine = TestEngine::start().unwrap();

    let sent = engine
        .messages()
        .send_direct(U1, SendDirectRequest::text(U2, "hi"))
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert!(!sent.is_delivered);
    assert!(!sent.is_read);

    let conversation_id = ConversationId::direct(U1, U2).unwrap();
    assert_eq!(sent.conversation_id, conversation_id);
    let conversation = engine.conversations().get(&conversation_id, U2).await.unwrap();
    assert_eq!(conversation.unread_for(U2), 1);

    assert_eq!(engine.conversations().mark_delivered(&conversation_id, U2).await.unwrap(), 1);
    let history = engine
        .messages()
        .fetch_history(&conversation_id, U2, HistoryQuery::default())
        .await
        .unwrap();
    assert!(history[0].is_delivered);
    assert_eq!(history[0].status, MessageStatus::Delivered);

    engine.conversations().mark_read(&conversation_id, U2).await.unwrap();
    let history = engine
        .messages()
        .fetch_history(&conversation_id, U1, HistoryQuery::default())
        .await
        .unwrap();
    assert!(history[0].is_read);
    assert!(history[0].is_delivered);
    assert_eq!(history[0].status, MessageStatus::Read);

    let conversation = engine.conversations().get(&conversation_id, U1).await.unwrap();
    assert_eq!(conversation.unread_for(U2), 0);
    assert_eq!(engine.conversations().total_unread(U2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_resolve_direct_is_commutative() {
    let engine = TestEngine::start().unwrap();

    let forward = engine.conversations().resolve_direct(U3, U1).await.unwrap();
    let backward = engine.conversations().resolve_direct(U1, U3).await.unwrap();
    assert_eq!(forward.id, backward.id);
    assert_eq!(forward.id.to_string(), "dm_1_3");

    let err = engine.conversations().resolve_direct(U2, U2).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::SelfConversation)));
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let engine = TestEngine::start().unwrap();
    let conversation_id = ConversationId::direct(U1, U2).unwrap();

    let first = engine
        .messages()
        .send_direct(U1, SendDirectRequest::text(U2, "first"))
        .await
        .unwrap();
    let second = engine
        .messages()
        .send_direct(U1, SendDirectRequest::text(U2, "second"))
        .await
        .unwrap();
    assert!(second.sequence > first.sequence);

    let failed = engine.messages().mark_failed(second.id, U1).await.unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);

    engine.conversations().mark_read(&conversation_id, U2).await.unwrap();
    // Delivery after read changes nothing
    assert_eq!(engine.conversations().mark_delivered(&conversation_id, U2).await.unwrap(), 0);

    let err = engine.messages().mark_failed(first.id, U1).await.unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidStatusTransition {
            from: MessageStatus::Read,
            ..
        })
    ));

    let history = engine
        .messages()
        .fetch_history(&conversation_id, U1, HistoryQuery::default())
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|m| m.status).collect();
    assert_eq!(statuses, vec![MessageStatus::Read, MessageStatus::Failed]);
    assert!(history[0].is_delivered);
}

#[tokio::test]
async fn test_group_history_follows_membership() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();
    engine.membership().join(community.id, U2).await.unwrap();

    for text in ["one", "two", "three"] {
        engine
            .messages()
            .send_group(U2, community.id, SendGroupRequest::text(text))
            .await
            .unwrap();
    }

    let conversation_id = ConversationId::community(community.id);
    let latest = engine
        .messages()
        .fetch_history(&conversation_id, U1, HistoryQuery::latest(2))
        .await
        .unwrap();
    let texts: Vec<_> = latest.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["two", "three"]);
    assert_eq!(latest[0].sender_name.as_deref(), Some("user2"));

    let summary = engine.reload(community.id).await.unwrap().last_message.unwrap();
    assert_eq!(summary.sender_id, U2);

    let err = engine
        .messages()
        .fetch_history(&conversation_id, U3, HistoryQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotMember(_))));
}
