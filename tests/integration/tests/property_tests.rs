//! Invariant checks over seeded random operation sequences
//!
//! Run with: cargo test -p integration-tests --test property_tests

use circle_core::{Community, Snowflake};
use circle_service::dto::{BanRequest, GenerateInviteRequest, MuteRequest};
use circle_service::{ErrorKind, JoinOutcome, ServiceContext, ServiceError};
use integration_tests::{TestEngine, U1, USERS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const SEEDS: [u64; 6] = [1, 7, 42, 1337, 2024, 90_210];
const STEPS: usize = 150;

#[derive(Debug, Clone, Copy)]
enum Op {
    Join,
    Leave,
    Approve,
    Reject,
    Promote,
    Demote,
    Remove,
    Ban,
    Unban,
    Mute,
    BulkAdd,
    Redeem,
}

const OPS: [Op; 12] = [
    Op::Join,
    Op::Leave,
    Op::Approve,
    Op::Reject,
    Op::Promote,
    Op::Demote,
    Op::Remove,
    Op::Ban,
    Op::Unban,
    Op::Mute,
    Op::BulkAdd,
    Op::Redeem,
];

fn pick(rng: &mut StdRng) -> Snowflake {
    *USERS.choose(rng).unwrap_or(&U1)
}

async fn apply(engine: &TestEngine, community: &Community, op: Op, rng: &mut StdRng) -> Result<(), ServiceError> {
    let id = community.id;
    let (actor, target) = (pick(rng), pick(rng));
    match op {
        Op::Join => engine.membership().join(id, target).await.map(|_| ()),
        Op::Leave => engine.membership().leave(id, target).await,
        Op::Approve => engine.membership().approve(id, target, actor).await,
        Op::Reject => engine.membership().reject(id, target, actor).await,
        Op::Promote => engine.membership().promote(id, target, actor).await,
        Op::Demote => engine.membership().demote(id, target, actor).await,
        Op::Remove => engine.membership().remove_member(id, target, actor).await,
        Op::Ban => engine
            .moderation()
            .ban(id, target, actor, BanRequest::default())
            .await
            .map(|_| ()),
        Op::Unban => engine.moderation().unban(id, target, actor).await,
        Op::Mute => engine
            .moderation()
            .mute(id, target, actor, MuteRequest::minutes(rng.gen_range(1..120)))
            .await
            .map(|_| ()),
        Op::BulkAdd => {
            let candidates: Vec<Snowflake> = (0..rng.gen_range(1..4)).map(|_| pick(rng)).collect();
            engine
                .membership()
                .bulk_add(id, &candidates, actor)
                .await
                .map(|_| ())
        }
        Op::Redeem => {
            let invite = engine
                .invites()
                .generate(id, U1, GenerateInviteRequest::default().limited_to(2))
                .await?;
            engine.invites().redeem(&invite.code, target).await.map(|_| ())
        }
    }
}

fn assert_invariants(community: &Community, seed: u64, step: usize, op: Op) {
    let context = format!("seed {seed}, step {step}, after {op:?}");
    assert!(community.is_member(community.creator_id), "creator left members: {context}");
    assert!(community.is_admin(community.creator_id), "creator lost admin: {context}");
    assert!(community.admins.is_subset(&community.members), "admin outside members: {context}");
    assert_eq!(
        community.members_count,
        community.members.len() as i64,
        "count drifted: {context}"
    );
    for ban in &community.bans {
        assert!(!community.is_member(ban.user_id), "banned member: {context}");
    }
    for request in &community.join_requests {
        assert!(!community.is_member(request.user_id), "member with request: {context}");
    }
}

#[tokio::test]
async fn test_creator_and_admin_invariants_hold_for_random_sequences() {
    for seed in SEEDS {
        let engine = TestEngine::start().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let public = rng.gen_bool(0.5);
        let community = engine.community(U1, public).await.unwrap();

        for step in 0..STEPS {
            let op = *OPS.choose(&mut rng).unwrap_or(&Op::Join);
            if let Err(e) = apply(&engine, &community, op, &mut rng).await {
                // Every rejection is a typed, non-retryable failure
                assert!(!e.is_retryable(), "seed {seed}, step {step}: {e}");
                assert_ne!(e.kind(), ErrorKind::StoreFailure);
            }
            let current = engine.reload(community.id).await.unwrap();
            assert_invariants(&current, seed, step, op);
        }
    }
}

#[tokio::test]
async fn test_private_join_never_adds_members() {
    let engine = TestEngine::start().unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let public = engine.community(U1, true).await.unwrap();
    let private = engine.community(U1, false).await.unwrap();

    let mut joiners: Vec<Snowflake> = USERS.iter().copied().filter(|u| *u != U1).collect();
    joiners.shuffle(&mut rng);

    for user in joiners {
        let before = engine.reload(private.id).await.unwrap();
        let outcome = engine.membership().join(private.id, user).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Requested);
        let after = engine.reload(private.id).await.unwrap();
        assert_eq!(before.members, after.members);
        assert!(after.pending_request(user).is_some());

        let before = engine.reload(public.id).await.unwrap();
        assert_eq!(engine.membership().join(public.id, user).await.unwrap(), JoinOutcome::Joined);
        let after = engine.reload(public.id).await.unwrap();
        let mut expected = before.members.clone();
        expected.insert(user);
        assert_eq!(after.members, expected);
        assert!(after.join_requests.is_empty());
    }
}

async fn join_from_task(ctx: ServiceContext, community_id: Snowflake, user_id: Snowflake) -> JoinOutcome {
    circle_service::MembershipService::new(&ctx)
        .join(community_id, user_id)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_converge() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, true).await.unwrap();

    let joiners: Vec<Snowflake> = (100..164).map(Snowflake::new).collect();
    let tasks: Vec<_> = joiners
        .iter()
        .map(|user| tokio::spawn(join_from_task(engine.ctx.clone(), community.id, *user)))
        .collect();
    for outcome in futures::future::join_all(tasks).await {
        assert_eq!(outcome.unwrap(), JoinOutcome::Joined);
    }

    let community = engine.reload(community.id).await.unwrap();
    assert_eq!(community.members_count, 65);
    assert!(joiners.iter().all(|u| community.is_member(*u)));
    assert!(community.invariants_hold());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_invite_redemptions_respect_limit() {
    let engine = TestEngine::start().unwrap();
    let community = engine.community(U1, false).await.unwrap();
    let invite = engine
        .invites()
        .generate(community.id, U1, GenerateInviteRequest::default().limited_to(3))
        .await
        .unwrap();

    let tasks: Vec<_> = (200..216)
        .map(Snowflake::new)
        .map(|user| {
            let ctx = engine.ctx.clone();
            let code = invite.code.clone();
            tokio::spawn(async move {
                circle_service::InviteService::new(&ctx)
                    .redeem(&code, user)
                    .await
                    .map_err(|e| e.kind())
            })
        })
        .collect();

    let mut joined = 0;
    for result in futures::future::join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => joined += 1,
            Err(kind) => assert_eq!(kind, ErrorKind::InviteUsageExceeded),
        }
    }
    assert_eq!(joined, 3);

    let community = engine.reload(community.id).await.unwrap();
    assert_eq!(community.members_count, 4);
    assert_eq!(community.invite.unwrap().usage_count, 3);
}
