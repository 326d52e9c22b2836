//! Integration tests against PostgreSQL
//!
//! Need a migrated database in `DATABASE_URL`. Every test truncates the
//! schema, so run them with `cargo test -- --ignored --test-threads=1`.

use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use ari::blob::ImagePayload;
use ari::domain::{EventType, LikeTarget, OperationContext};
use ari::handlers::{
    AlbumLikeCommand, CreateFantalkCommand, CreateFantalkHandler, CreatePlaylistCommand, LikeHandler,
    PlaylistHandler, SubscriptionEventCommand, SubscriptionEventHandler, SubscriptionPlanHandler,
    SubscriptionQueryHandler, TrackQueryHandler,
};
use ari::idempotency::LedgerOutcome;
use ari::store::{Database, PgDatabase};

mod common;

fn context() -> OperationContext {
    OperationContext::new().with_correlation_id(Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_subscription_event_recorded_once() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool.clone()));
    let ctx = context();

    SubscriptionPlanHandler::new(db.clone())
        .create_regular_plan(dec!(9.90), &ctx)
        .await
        .unwrap();

    let handler = SubscriptionEventHandler::new(db.clone());
    let first = handler
        .handle(SubscriptionEventCommand::regular("pg-evt-1", EventType::Subscribe, 42), &ctx)
        .await
        .unwrap();
    assert_eq!(first.outcome, LedgerOutcome::Recorded);
    assert!(first.subscription_id.is_some());

    let second = handler
        .handle(SubscriptionEventCommand::regular("pg-evt-1", EventType::Subscribe, 42), &ctx)
        .await
        .unwrap();
    assert_eq!(second.outcome, LedgerOutcome::Duplicate);

    let (events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscription_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(events, 1);

    let subscriptions = SubscriptionQueryHandler::new(db)
        .member_subscriptions(42)
        .await
        .unwrap();
    assert_eq!(subscriptions.len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_deliveries_record_one_event() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool.clone()));

    SubscriptionPlanHandler::new(db.clone())
        .create_regular_plan(dec!(9.90), &context())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            SubscriptionEventHandler::new(db)
                .handle(
                    SubscriptionEventCommand::regular("pg-evt-race", EventType::Subscribe, 42),
                    &context(),
                )
                .await
        }));
    }

    let mut recorded = 0;
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        if result.outcome == LedgerOutcome::Recorded {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM subscription_events WHERE subscription_event_id = 'pg-evt-race'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(events, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_subscribe_events_activate_once() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool.clone()));

    SubscriptionPlanHandler::new(db.clone())
        .create_regular_plan(dec!(9.90), &context())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for n in 0..4 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            SubscriptionEventHandler::new(db)
                .handle(
                    SubscriptionEventCommand::regular(format!("pg-sub-{n}"), EventType::Subscribe, 42),
                    &context(),
                )
                .await
        }));
    }
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.outcome, LedgerOutcome::Recorded);
    }

    let (active,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE member_id = 42 AND activate_yn")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_shares_all_counted() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool));
    let handler = Arc::new(PlaylistHandler::new(db));

    let created = handler
        .create_playlist(
            CreatePlaylistCommand {
                member_id: 1,
                playlist_title: "party".to_string(),
                public_yn: true,
                track_ids: vec![3],
            },
            &context(),
        )
        .await
        .unwrap();
    let playlist_id = created.playlist_id.unwrap();

    let mut tasks = Vec::new();
    for member_id in 40..46 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            handler.share_playlist(playlist_id, member_id, &context()).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let top = handler.top_shared(1).await.unwrap();
    assert_eq!(top[0].share_count, 6);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_album_like_upsert() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool.clone()));
    let handler = LikeHandler::new(db.clone());
    let ctx = context();

    handler
        .update_album_like(AlbumLikeCommand::new(5, 42, true), &ctx)
        .await
        .unwrap();
    handler
        .update_album_like(AlbumLikeCommand::new(5, 42, false), &ctx)
        .await
        .unwrap();

    let (rows, liked): (i64, bool) = sqlx::query_as(
        "SELECT COUNT(*), BOOL_OR(liked) FROM likes WHERE target_type = $1 AND target_id = 5 AND member_id = 42",
    )
    .bind(LikeTarget::Album.as_str())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);
    assert!(!liked);

    let detail = TrackQueryHandler::new(db).track(5, 3).await.unwrap();
    assert_eq!(detail.like_count, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_fantalk_persisted_with_image_url() {
    let pool = common::setup_test_db().await;
    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool));
    let blobs = Arc::new(common::RecordingBlobStore::default());

    let handler = CreateFantalkHandler::new(db.clone(), blobs.clone(), common::MAX_UPLOAD_BYTES);
    let command = CreateFantalkCommand::new(1, 42, "hello".to_string(), 3)
        .with_image(ImagePayload::new(common::PNG_BYTES.to_vec()).with_file_name("a.png"));
    let created = handler.execute(command, &context()).await.unwrap();
    assert!(created.fantalk_id.is_some());

    let stored = ari::handlers::FantalkQueryHandler::new(db)
        .channel_fantalks(1)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content.image_url(), Some("https://blobs.test/fantalk/1.png"));
    assert_eq!(blobs.calls(), 1);
}
