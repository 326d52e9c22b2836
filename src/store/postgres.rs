//! PostgreSQL backend
//!
//! Hand-written parameterised queries over a pooled `sqlx` transaction.
//! Schema: `migrations/0001_init.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};

use crate::domain::{
    Album, EventType, Fantalk, FantalkContent, Like, LikeTarget, PlanType, Playlist, Subscription,
    SubscriptionEventRecord, SubscriptionPlan, Track,
};

use super::{
    Database, FantalkRepository, LikeRepository, MusicRepository, PlaylistRepository,
    StorageError, StorageResult, SubscriptionEventRepository, SubscriptionPlanRepository,
    SubscriptionRepository, Transaction,
};

/// PostgreSQL [`Database`] over a connection pool
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// `sqlx` rolls the transaction back when it is dropped uncommitted.
struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Map a unique violation into [`StorageError::UniqueViolation`]
fn map_write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            };
        }
    }
    StorageError::Database(err)
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await.map_err(map_write_error)
    }
}

// =========================================================================
// Fan-talks
// =========================================================================

#[derive(sqlx::FromRow)]
struct FantalkRow {
    fantalk_id: i32,
    fantalk_channel_id: i32,
    member_id: i32,
    content: String,
    track_id: i32,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FantalkRow> for Fantalk {
    type Error = StorageError;

    fn try_from(row: FantalkRow) -> Result<Self, Self::Error> {
        let content = FantalkContent::new(row.content, row.track_id, row.image_url)
            .map_err(|e| StorageError::CorruptRow(format!("fantalk {}: {e}", row.fantalk_id)))?;
        Ok(Fantalk::new(row.fantalk_channel_id, row.member_id, content, row.created_at)
            .with_id(row.fantalk_id))
    }
}

#[async_trait]
impl FantalkRepository for PgTransaction {
    async fn save_fantalk(&mut self, fantalk: Fantalk) -> StorageResult<Fantalk> {
        let fantalk_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO fantalks (fantalk_channel_id, member_id, content, track_id, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING fantalk_id
            "#,
        )
        .bind(fantalk.fantalk_channel_id)
        .bind(fantalk.member_id)
        .bind(fantalk.content.content())
        .bind(fantalk.content.track_id())
        .bind(fantalk.content.image_url())
        .bind(fantalk.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(fantalk.with_id(fantalk_id))
    }

    async fn find_fantalks_by_channel(&mut self, fantalk_channel_id: i32) -> StorageResult<Vec<Fantalk>> {
        let rows: Vec<FantalkRow> = sqlx::query_as(
            r#"
            SELECT fantalk_id, fantalk_channel_id, member_id, content, track_id, image_url, created_at
            FROM fantalks
            WHERE fantalk_channel_id = $1
            ORDER BY created_at DESC, fantalk_id DESC
            "#,
        )
        .bind(fantalk_channel_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Fantalk::try_from).collect()
    }
}

// =========================================================================
// Likes
// =========================================================================

#[async_trait]
impl LikeRepository for PgTransaction {
    async fn save_like(&mut self, like: Like) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO likes (target_type, target_id, member_id, liked, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (target_type, target_id, member_id)
            DO UPDATE SET liked = EXCLUDED.liked, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(like.target.as_str())
        .bind(like.target_id)
        .bind(like.member_id)
        .bind(like.liked)
        .bind(like.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_like(
        &mut self,
        target: LikeTarget,
        target_id: i32,
        member_id: i32,
    ) -> StorageResult<Option<Like>> {
        let row: Option<(bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT liked, updated_at FROM likes
            WHERE target_type = $1 AND target_id = $2 AND member_id = $3
            "#,
        )
        .bind(target.as_str())
        .bind(target_id)
        .bind(member_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(liked, updated_at)| Like {
            target,
            target_id,
            member_id,
            liked,
            updated_at,
        }))
    }

    async fn count_active_likes(&mut self, target: LikeTarget, target_id: i32) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM likes WHERE target_type = $1 AND target_id = $2 AND liked",
        )
        .bind(target.as_str())
        .bind(target_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }
}

// =========================================================================
// Albums & tracks
// =========================================================================

#[derive(sqlx::FromRow)]
struct TrackRow {
    track_id: i32,
    album_id: i32,
    track_number: i32,
    track_title: String,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            track_id: row.track_id,
            album_id: row.album_id,
            track_number: row.track_number,
            track_title: row.track_title,
        }
    }
}

#[async_trait]
impl MusicRepository for PgTransaction {
    async fn find_album(&mut self, album_id: i32) -> StorageResult<Option<Album>> {
        let row: Option<(i32, String, i32)> =
            sqlx::query_as("SELECT album_id, album_title, member_id FROM albums WHERE album_id = $1")
                .bind(album_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(|(album_id, album_title, member_id)| Album {
            album_id,
            album_title,
            member_id,
        }))
    }

    async fn find_track(&mut self, album_id: i32, track_id: i32) -> StorageResult<Option<Track>> {
        let row: Option<TrackRow> = sqlx::query_as(
            r#"
            SELECT track_id, album_id, track_number, track_title
            FROM tracks
            WHERE album_id = $1 AND track_id = $2
            "#,
        )
        .bind(album_id)
        .bind(track_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Track::from))
    }

    async fn find_tracks_by_album(&mut self, album_id: i32) -> StorageResult<Vec<Track>> {
        let rows: Vec<TrackRow> = sqlx::query_as(
            r#"
            SELECT track_id, album_id, track_number, track_title
            FROM tracks
            WHERE album_id = $1
            ORDER BY track_number, track_id
            "#,
        )
        .bind(album_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn search_tracks_by_title(&mut self, keyword: &str) -> StorageResult<Vec<Track>> {
        // strpos keeps '%' and '_' in the keyword literal
        let rows: Vec<TrackRow> = sqlx::query_as(
            r#"
            SELECT track_id, album_id, track_number, track_title
            FROM tracks
            WHERE strpos(track_title, $1) > 0
            ORDER BY track_id
            "#,
        )
        .bind(keyword)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn count_tracks_by_album(&mut self, album_id: i32) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE album_id = $1")
            .bind(album_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }
}

// =========================================================================
// Subscription plans
// =========================================================================

#[derive(sqlx::FromRow)]
struct PlanRow {
    subscription_plan_id: i32,
    plan_type: String,
    artist_id: Option<i32>,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = StorageError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let plan_type: PlanType = row.plan_type.parse().map_err(StorageError::CorruptRow)?;
        Ok(SubscriptionPlan {
            subscription_plan_id: Some(row.subscription_plan_id),
            plan_type,
            artist_id: row.artist_id,
            price: row.price,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl SubscriptionPlanRepository for PgTransaction {
    async fn save_plan(&mut self, plan: SubscriptionPlan) -> StorageResult<SubscriptionPlan> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO subscription_plans (plan_type, artist_id, price, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING subscription_plan_id
            "#,
        )
        .bind(plan.plan_type.code())
        .bind(plan.artist_id)
        .bind(plan.price)
        .bind(plan.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(plan.with_id(id))
    }

    async fn find_regular_plan(&mut self) -> StorageResult<Option<SubscriptionPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT subscription_plan_id, plan_type, artist_id, price, created_at
            FROM subscription_plans
            WHERE plan_type = 'R'
            ORDER BY subscription_plan_id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(SubscriptionPlan::try_from).transpose()
    }

    async fn find_artist_plan(&mut self, artist_id: i32) -> StorageResult<Option<SubscriptionPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT subscription_plan_id, plan_type, artist_id, price, created_at
            FROM subscription_plans
            WHERE plan_type = 'A' AND artist_id = $1
            ORDER BY subscription_plan_id DESC
            LIMIT 1
            "#,
        )
        .bind(artist_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(SubscriptionPlan::try_from).transpose()
    }
}

// =========================================================================
// Subscriptions
// =========================================================================

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    subscription_id: i32,
    member_id: i32,
    subscription_plan_id: i32,
    subscribed_at: DateTime<Utc>,
    activate_yn: bool,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            subscription_id: Some(row.subscription_id),
            member_id: row.member_id,
            subscription_plan_id: row.subscription_plan_id,
            subscribed_at: row.subscribed_at,
            activate_yn: row.activate_yn,
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "subscription_id, member_id, subscription_plan_id, subscribed_at, activate_yn";

#[async_trait]
impl SubscriptionRepository for PgTransaction {
    async fn save_subscription(&mut self, subscription: Subscription) -> StorageResult<Subscription> {
        let id: i32 = match subscription.subscription_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET activate_yn = $2
                    WHERE subscription_id = $1
                    "#,
                )
                .bind(id)
                .bind(subscription.activate_yn)
                .execute(&mut *self.tx)
                .await
                .map_err(map_write_error)?;
                id
            }
            None => sqlx::query_scalar(
                r#"
                INSERT INTO subscriptions (member_id, subscription_plan_id, subscribed_at, activate_yn)
                VALUES ($1, $2, $3, $4)
                RETURNING subscription_id
                "#,
            )
            .bind(subscription.member_id)
            .bind(subscription.subscription_plan_id)
            .bind(subscription.subscribed_at)
            .bind(subscription.activate_yn)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_write_error)?,
        };

        Ok(subscription.with_id(id))
    }

    async fn find_subscriptions_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE member_id = $1 ORDER BY subscription_id"
        ))
        .bind(member_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn find_subscriptions_by_member_and_plan(
        &mut self,
        member_id: i32,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE member_id = $1 AND subscription_plan_id = $2
            ORDER BY subscription_id
            "#
        ))
        .bind(member_id)
        .bind(subscription_plan_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn count_active_subscriptions_by_plan(&mut self, subscription_plan_id: i32) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE subscription_plan_id = $1 AND activate_yn",
        )
        .bind(subscription_plan_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn find_active_subscriptions_by_plan(
        &mut self,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE subscription_plan_id = $1 AND activate_yn
            ORDER BY subscription_id
            "#
        ))
        .bind(subscription_plan_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn find_active_subscriptions_by_plan_between(
        &mut self,
        subscription_plan_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE subscription_plan_id = $1
              AND subscribed_at BETWEEN $2 AND $3
              AND activate_yn
            ORDER BY subscription_id
            "#
        ))
        .bind(subscription_plan_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }
}

// =========================================================================
// Subscription event ledger
// =========================================================================

#[async_trait]
impl SubscriptionEventRepository for PgTransaction {
    async fn exists_event(&mut self, subscription_event_id: &str) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM subscription_events WHERE subscription_event_id = $1)",
        )
        .bind(subscription_event_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn exists_event_with_type(
        &mut self,
        subscription_event_id: &str,
        event_type: EventType,
    ) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscription_events
                WHERE subscription_event_id = $1 AND event_type = $2
            )
            "#,
        )
        .bind(subscription_event_id)
        .bind(event_type.code())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn save_event(&mut self, record: SubscriptionEventRecord) -> StorageResult<()> {
        // The primary key on (subscription_event_id, event_type) is the
        // deduplication guarantee; a racing insert blocks, then fails here.
        sqlx::query(
            r#"
            INSERT INTO subscription_events (subscription_event_id, event_type, subscriber_id, plan_type, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.subscription_event_id)
        .bind(record.event_type.code())
        .bind(record.subscriber_id)
        .bind(record.plan_type.code())
        .bind(record.recorded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }
}

// =========================================================================
// Playlists
// =========================================================================

#[derive(sqlx::FromRow)]
struct PlaylistRow {
    playlist_id: i32,
    member_id: i32,
    playlist_title: String,
    public_yn: bool,
    share_count: i32,
    created_at: DateTime<Utc>,
    track_ids: Vec<i32>,
}

impl From<PlaylistRow> for Playlist {
    fn from(row: PlaylistRow) -> Self {
        Playlist {
            playlist_id: Some(row.playlist_id),
            member_id: row.member_id,
            playlist_title: row.playlist_title,
            public_yn: row.public_yn,
            share_count: row.share_count,
            created_at: row.created_at,
            track_ids: row.track_ids,
        }
    }
}

/// Playlist columns with the ordered track ids folded into an array
const PLAYLIST_SELECT: &str = r#"
    SELECT p.playlist_id, p.member_id, p.playlist_title, p.public_yn, p.share_count, p.created_at,
           COALESCE(
               ARRAY(SELECT pt.track_id FROM playlist_tracks pt
                     WHERE pt.playlist_id = p.playlist_id ORDER BY pt.track_order),
               '{}'
           ) AS track_ids
    FROM playlists p
"#;

impl PgTransaction {
    async fn fetch_playlists(&mut self, filter: &str, binds: &[i32]) -> StorageResult<Vec<Playlist>> {
        let sql = format!("{PLAYLIST_SELECT} {filter}");
        let mut query = sqlx::query_as::<_, PlaylistRow>(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(Playlist::from).collect())
    }

    async fn replace_playlist_tracks(&mut self, playlist_id: i32, track_ids: &[i32]) -> StorageResult<()> {
        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = $1")
            .bind(playlist_id)
            .execute(&mut *self.tx)
            .await?;

        for (order, track_id) in track_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO playlist_tracks (playlist_id, track_id, track_order) VALUES ($1, $2, $3)",
            )
            .bind(playlist_id)
            .bind(*track_id)
            .bind(order as i32)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl PlaylistRepository for PgTransaction {
    async fn find_playlist(&mut self, playlist_id: i32) -> StorageResult<Option<Playlist>> {
        let mut found = self
            .fetch_playlists("WHERE p.playlist_id = $1", &[playlist_id])
            .await?;
        Ok(found.pop())
    }

    async fn find_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>> {
        self.fetch_playlists(
            "WHERE p.member_id = $1 ORDER BY p.playlist_id",
            &[member_id],
        )
        .await
    }

    async fn find_public_playlists(&mut self) -> StorageResult<Vec<Playlist>> {
        self.fetch_playlists("WHERE p.public_yn ORDER BY p.playlist_id", &[])
            .await
    }

    async fn find_public_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>> {
        self.fetch_playlists(
            "WHERE p.public_yn AND p.member_id = $1 ORDER BY p.playlist_id",
            &[member_id],
        )
        .await
    }

    async fn find_top_shared_playlists(&mut self, limit: i64) -> StorageResult<Vec<Playlist>> {
        self.fetch_playlists(
            "WHERE p.public_yn ORDER BY p.share_count DESC, p.playlist_id LIMIT $1",
            &[i32::try_from(limit).unwrap_or(i32::MAX)],
        )
        .await
    }

    async fn save_playlist(&mut self, playlist: Playlist) -> StorageResult<Playlist> {
        let playlist_id: i32 = match playlist.playlist_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE playlists
                    SET playlist_title = $2, public_yn = $3
                    WHERE playlist_id = $1
                    "#,
                )
                .bind(id)
                .bind(&playlist.playlist_title)
                .bind(playlist.public_yn)
                .execute(&mut *self.tx)
                .await
                .map_err(map_write_error)?;
                id
            }
            None => sqlx::query_scalar(
                r#"
                INSERT INTO playlists (member_id, playlist_title, public_yn, share_count, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING playlist_id
                "#,
            )
            .bind(playlist.member_id)
            .bind(&playlist.playlist_title)
            .bind(playlist.public_yn)
            .bind(playlist.share_count)
            .bind(playlist.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_write_error)?,
        };

        self.replace_playlist_tracks(playlist_id, &playlist.track_ids)
            .await?;

        Ok(playlist.with_id(playlist_id))
    }

    async fn increment_share_count(&mut self, playlist_id: i32) -> StorageResult<Option<i32>> {
        let share_count = sqlx::query_scalar(
            r#"
            UPDATE playlists
            SET share_count = share_count + 1
            WHERE playlist_id = $1
            RETURNING share_count
            "#,
        )
        .bind(playlist_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(share_count)
    }

    async fn delete_playlist(&mut self, playlist_id: i32) -> StorageResult<bool> {
        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = $1")
            .bind(playlist_id)
            .execute(&mut *self.tx)
            .await?;

        let rows = sqlx::query("DELETE FROM playlists WHERE playlist_id = $1")
            .bind(playlist_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }
}
