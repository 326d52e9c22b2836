//! Persistence gateways
//!
//! Repository traits per aggregate plus the unit of work that groups them.
//! Every repository method runs inside a [`Transaction`]; a transaction that
//! is dropped without [`Transaction::commit`] rolls back.
//!
//! Two backends implement the traits: [`PgDatabase`] for PostgreSQL and
//! [`MemoryDatabase`] for tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Album, EventType, Fantalk, Like, LikeTarget, Playlist, Subscription, SubscriptionEventRecord,
    SubscriptionPlan, Track,
};

pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;

/// Primary key of the event ledger on (event id, event type)
pub const SUBSCRIPTION_EVENT_KEY: &str = "subscription_events_pkey";

/// At most one active subscription per (member, plan)
pub const ACTIVE_SUBSCRIPTION_KEY: &str = "subscriptions_active_member_plan_key";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A stored value could not be mapped back to a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    /// Whether the write broke the named uniqueness constraint
    pub fn violates(&self, name: &str) -> bool {
        match self {
            StorageError::UniqueViolation { constraint } => constraint == name,
            StorageError::Database(sqlx::Error::Database(db_err)) => {
                db_err.is_unique_violation() && db_err.constraint() == Some(name)
            }
            _ => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Entry point to a backend: hands out units of work.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>>;
}

/// Unit of work spanning every repository.
#[async_trait]
pub trait Transaction:
    FantalkRepository
    + LikeRepository
    + MusicRepository
    + SubscriptionPlanRepository
    + SubscriptionRepository
    + SubscriptionEventRepository
    + PlaylistRepository
    + Send
{
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

#[async_trait]
pub trait FantalkRepository: Send {
    /// Insert and return the fan-talk with its assigned id
    async fn save_fantalk(&mut self, fantalk: Fantalk) -> StorageResult<Fantalk>;

    /// Newest first
    async fn find_fantalks_by_channel(&mut self, fantalk_channel_id: i32) -> StorageResult<Vec<Fantalk>>;
}

#[async_trait]
pub trait LikeRepository: Send {
    /// Insert or replace the like for (target, target_id, member_id)
    async fn save_like(&mut self, like: Like) -> StorageResult<()>;

    async fn find_like(
        &mut self,
        target: LikeTarget,
        target_id: i32,
        member_id: i32,
    ) -> StorageResult<Option<Like>>;

    async fn count_active_likes(&mut self, target: LikeTarget, target_id: i32) -> StorageResult<i64>;
}

#[async_trait]
pub trait MusicRepository: Send {
    async fn find_album(&mut self, album_id: i32) -> StorageResult<Option<Album>>;

    async fn find_track(&mut self, album_id: i32, track_id: i32) -> StorageResult<Option<Track>>;

    /// Ordered by track number
    async fn find_tracks_by_album(&mut self, album_id: i32) -> StorageResult<Vec<Track>>;

    /// Case-sensitive substring match on the title
    async fn search_tracks_by_title(&mut self, keyword: &str) -> StorageResult<Vec<Track>>;

    async fn count_tracks_by_album(&mut self, album_id: i32) -> StorageResult<i64>;
}

#[async_trait]
pub trait SubscriptionPlanRepository: Send {
    async fn save_plan(&mut self, plan: SubscriptionPlan) -> StorageResult<SubscriptionPlan>;

    /// Most recently created regular plan
    async fn find_regular_plan(&mut self) -> StorageResult<Option<SubscriptionPlan>>;

    /// Most recently created plan of the artist
    async fn find_artist_plan(&mut self, artist_id: i32) -> StorageResult<Option<SubscriptionPlan>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send {
    async fn save_subscription(&mut self, subscription: Subscription) -> StorageResult<Subscription>;

    async fn find_subscriptions_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Subscription>>;

    async fn find_subscriptions_by_member_and_plan(
        &mut self,
        member_id: i32,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>>;

    async fn count_active_subscriptions_by_plan(&mut self, subscription_plan_id: i32) -> StorageResult<i64>;

    async fn find_active_subscriptions_by_plan(
        &mut self,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>>;

    /// Active subscriptions with `start <= subscribed_at <= end`
    async fn find_active_subscriptions_by_plan_between(
        &mut self,
        subscription_plan_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Subscription>>;
}

/// Append-only ledger of external subscription events.
#[async_trait]
pub trait SubscriptionEventRepository: Send {
    async fn exists_event(&mut self, subscription_event_id: &str) -> StorageResult<bool>;

    async fn exists_event_with_type(
        &mut self,
        subscription_event_id: &str,
        event_type: EventType,
    ) -> StorageResult<bool>;

    async fn exists_payment_event(&mut self, subscription_event_id: &str) -> StorageResult<bool> {
        self.exists_event_with_type(subscription_event_id, EventType::Payment)
            .await
    }

    async fn exists_subscribe_event(&mut self, subscription_event_id: &str) -> StorageResult<bool> {
        self.exists_event_with_type(subscription_event_id, EventType::Subscribe)
            .await
    }

    /// Fails with a unique violation if the (id, type) pair is already stored
    async fn save_event(&mut self, record: SubscriptionEventRecord) -> StorageResult<()>;
}

#[async_trait]
pub trait PlaylistRepository: Send {
    async fn find_playlist(&mut self, playlist_id: i32) -> StorageResult<Option<Playlist>>;

    async fn find_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>>;

    async fn find_public_playlists(&mut self) -> StorageResult<Vec<Playlist>>;

    async fn find_public_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>>;

    /// Public playlists ordered by share count, highest first
    async fn find_top_shared_playlists(&mut self, limit: i64) -> StorageResult<Vec<Playlist>>;

    /// Insert when `playlist_id` is `None`, update otherwise. An update
    /// leaves `share_count` alone; it only moves through
    /// [`increment_share_count`](Self::increment_share_count).
    async fn save_playlist(&mut self, playlist: Playlist) -> StorageResult<Playlist>;

    /// Add one share in place and return the new count, or `None` if the
    /// playlist does not exist
    async fn increment_share_count(&mut self, playlist_id: i32) -> StorageResult<Option<i32>>;

    /// Returns whether a row was deleted
    async fn delete_playlist(&mut self, playlist_id: i32) -> StorageResult<bool>;
}
