//! Database module
//!
//! Connection and schema checks run at startup. The schema itself lives in
//! raw SQL files under `migrations/`.

use sqlx::PgPool;

use crate::store::ACTIVE_SUBSCRIPTION_KEY;

/// Tables the service reads or writes
pub const REQUIRED_TABLES: &[&str] = &[
    "albums",
    "tracks",
    "fantalks",
    "likes",
    "subscription_plans",
    "subscriptions",
    "subscription_events",
    "playlists",
    "playlist_tracks",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    if !check_ledger_constraint(pool).await? {
        return Ok(false);
    }

    if !check_active_subscription_index(pool).await? {
        return Ok(false);
    }

    Ok(true)
}

/// The event ledger must carry its (id, type) primary key; without it
/// concurrent deliveries of one event could both be recorded.
async fn check_ledger_constraint(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.table_constraints
            WHERE table_schema = 'public'
              AND table_name = 'subscription_events'
              AND constraint_type IN ('PRIMARY KEY', 'UNIQUE')
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !exists {
        tracing::error!("subscription_events has no uniqueness constraint on (subscription_event_id, event_type)");
        return Ok(false);
    }

    tracing::info!("Subscription event ledger constraint verified");
    Ok(true)
}

/// Subscribe events racing for one member are settled by this partial
/// unique index
async fn check_active_subscription_index(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE schemaname = 'public'
              AND tablename = 'subscriptions'
              AND indexname = $1
        )
        "#,
    )
    .bind(ACTIVE_SUBSCRIPTION_KEY)
    .fetch_one(pool)
    .await?;

    if !exists {
        tracing::error!("subscriptions has no unique index '{}'", ACTIVE_SUBSCRIPTION_KEY);
    }
    Ok(exists)
}
