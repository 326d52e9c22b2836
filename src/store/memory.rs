//! In-memory backend
//!
//! Keeps committed state behind a lock. A transaction records its writes in
//! a log and reads committed state with its own log applied on top. Commit
//! replays the log against the latest committed state and swaps it in only
//! if every write, including the ledger uniqueness check, succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    Album, EventType, Fantalk, Like, LikeTarget, Playlist, Subscription, SubscriptionEventRecord,
    SubscriptionPlan, Track,
};

use super::{
    Database, FantalkRepository, LikeRepository, MusicRepository, PlaylistRepository,
    StorageError, StorageResult, SubscriptionEventRepository, SubscriptionPlanRepository,
    SubscriptionRepository, Transaction, ACTIVE_SUBSCRIPTION_KEY, SUBSCRIPTION_EVENT_KEY,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    albums: BTreeMap<i32, Album>,
    tracks: BTreeMap<i32, Track>,
    fantalks: BTreeMap<i32, Fantalk>,
    likes: HashMap<(LikeTarget, i32, i32), Like>,
    plans: BTreeMap<i32, SubscriptionPlan>,
    subscriptions: BTreeMap<i32, Subscription>,
    subscription_events: Vec<SubscriptionEventRecord>,
    playlists: BTreeMap<i32, Playlist>,
}

#[derive(Debug, Clone)]
enum Write {
    Fantalk(Fantalk),
    Like(Like),
    Plan(SubscriptionPlan),
    Subscription(Subscription),
    SubscriptionEvent(SubscriptionEventRecord),
    Playlist(Playlist),
    SharePlaylist(i32),
    DeletePlaylist(i32),
}

impl MemoryState {
    fn apply(&mut self, write: &Write) -> StorageResult<()> {
        match write {
            Write::Fantalk(fantalk) => {
                let id = assigned(fantalk.fantalk_id, "fantalk")?;
                self.fantalks.insert(id, fantalk.clone());
            }
            Write::Like(like) => {
                self.likes.insert(like.key(), like.clone());
            }
            Write::Plan(plan) => {
                let id = assigned(plan.subscription_plan_id, "subscription plan")?;
                self.plans.insert(id, plan.clone());
            }
            Write::Subscription(subscription) => {
                let id = assigned(subscription.subscription_id, "subscription")?;
                let duplicate_active = subscription.activate_yn
                    && self.subscriptions.values().any(|s| {
                        s.activate_yn
                            && s.subscription_id != Some(id)
                            && s.member_id == subscription.member_id
                            && s.subscription_plan_id == subscription.subscription_plan_id
                    });
                if duplicate_active {
                    return Err(StorageError::UniqueViolation {
                        constraint: ACTIVE_SUBSCRIPTION_KEY.to_string(),
                    });
                }
                self.subscriptions.insert(id, subscription.clone());
            }
            Write::SubscriptionEvent(record) => {
                if self.has_event(&record.subscription_event_id, Some(record.event_type)) {
                    return Err(StorageError::UniqueViolation {
                        constraint: SUBSCRIPTION_EVENT_KEY.to_string(),
                    });
                }
                self.subscription_events.push(record.clone());
            }
            Write::Playlist(playlist) => {
                let id = assigned(playlist.playlist_id, "playlist")?;
                let mut playlist = playlist.clone();
                if let Some(existing) = self.playlists.get(&id) {
                    playlist.share_count = existing.share_count;
                }
                self.playlists.insert(id, playlist);
            }
            Write::SharePlaylist(id) => {
                if let Some(playlist) = self.playlists.get_mut(id) {
                    playlist.share_count += 1;
                }
            }
            Write::DeletePlaylist(id) => {
                self.playlists.remove(id);
            }
        }
        Ok(())
    }

    fn has_event(&self, subscription_event_id: &str, event_type: Option<EventType>) -> bool {
        self.subscription_events.iter().any(|e| {
            e.subscription_event_id == subscription_event_id
                && event_type.map_or(true, |t| e.event_type == t)
        })
    }

    fn public_playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.values().filter(|p| p.public_yn)
    }
}

fn assigned(id: Option<i32>, what: &str) -> StorageResult<i32> {
    id.ok_or_else(|| StorageError::CorruptRow(format!("{what} written without an id")))
}

#[derive(Debug, Default)]
struct Sequences {
    fantalk: AtomicI32,
    plan: AtomicI32,
    subscription: AtomicI32,
    playlist: AtomicI32,
}

impl Sequences {
    fn next(counter: &AtomicI32) -> i32 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    sequences: Sequences,
}

/// In-memory [`Database`]. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an album (albums are owned by the catalogue service)
    pub async fn insert_album(&self, album: Album) {
        self.shared.state.lock().await.albums.insert(album.album_id, album);
    }

    /// Seed a track (tracks are owned by the catalogue service)
    pub async fn insert_track(&self, track: Track) {
        self.shared.state.lock().await.tracks.insert(track.track_id, track);
    }

    /// Committed fan-talks, by id
    pub async fn fantalks(&self) -> Vec<Fantalk> {
        self.shared.state.lock().await.fantalks.values().cloned().collect()
    }

    /// Committed likes
    pub async fn likes(&self) -> Vec<Like> {
        self.shared.state.lock().await.likes.values().cloned().collect()
    }

    /// Committed subscriptions, by id
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.shared
            .state
            .lock()
            .await
            .subscriptions
            .values()
            .cloned()
            .collect()
    }

    /// Committed ledger rows, in insertion order
    pub async fn subscription_events(&self) -> Vec<SubscriptionEventRecord> {
        self.shared.state.lock().await.subscription_events.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            shared: self.shared.clone(),
            writes: Vec::new(),
        }))
    }
}

/// Dropping it discards the write log.
struct MemoryTransaction {
    shared: Arc<Shared>,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    /// Committed state with this transaction's writes applied
    async fn view(&self) -> StorageResult<MemoryState> {
        let mut state = self.shared.state.lock().await.clone();
        for write in &self.writes {
            state.apply(write)?;
        }
        Ok(state)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut committed = self.shared.state.lock().await;
        let mut next = committed.clone();
        for write in &self.writes {
            next.apply(write)?;
        }
        *committed = next;
        Ok(())
    }
}

#[async_trait]
impl FantalkRepository for MemoryTransaction {
    async fn save_fantalk(&mut self, fantalk: Fantalk) -> StorageResult<Fantalk> {
        let id = Sequences::next(&self.shared.sequences.fantalk);
        let fantalk = fantalk.with_id(id);
        self.writes.push(Write::Fantalk(fantalk.clone()));
        Ok(fantalk)
    }

    async fn find_fantalks_by_channel(&mut self, fantalk_channel_id: i32) -> StorageResult<Vec<Fantalk>> {
        let state = self.view().await?;
        let mut fantalks: Vec<Fantalk> = state
            .fantalks
            .into_values()
            .filter(|f| f.fantalk_channel_id == fantalk_channel_id)
            .collect();
        fantalks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.fantalk_id.cmp(&a.fantalk_id))
        });
        Ok(fantalks)
    }
}

#[async_trait]
impl LikeRepository for MemoryTransaction {
    async fn save_like(&mut self, like: Like) -> StorageResult<()> {
        self.writes.push(Write::Like(like));
        Ok(())
    }

    async fn find_like(
        &mut self,
        target: LikeTarget,
        target_id: i32,
        member_id: i32,
    ) -> StorageResult<Option<Like>> {
        let state = self.view().await?;
        Ok(state.likes.get(&(target, target_id, member_id)).cloned())
    }

    async fn count_active_likes(&mut self, target: LikeTarget, target_id: i32) -> StorageResult<i64> {
        let state = self.view().await?;
        let count = state
            .likes
            .values()
            .filter(|l| l.target == target && l.target_id == target_id && l.liked)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl MusicRepository for MemoryTransaction {
    async fn find_album(&mut self, album_id: i32) -> StorageResult<Option<Album>> {
        Ok(self.view().await?.albums.remove(&album_id))
    }

    async fn find_track(&mut self, album_id: i32, track_id: i32) -> StorageResult<Option<Track>> {
        let state = self.view().await?;
        Ok(state
            .tracks
            .get(&track_id)
            .filter(|t| t.album_id == album_id)
            .cloned())
    }

    async fn find_tracks_by_album(&mut self, album_id: i32) -> StorageResult<Vec<Track>> {
        let state = self.view().await?;
        let mut tracks: Vec<Track> = state
            .tracks
            .into_values()
            .filter(|t| t.album_id == album_id)
            .collect();
        tracks.sort_by_key(|t| (t.track_number, t.track_id));
        Ok(tracks)
    }

    async fn search_tracks_by_title(&mut self, keyword: &str) -> StorageResult<Vec<Track>> {
        let state = self.view().await?;
        Ok(state
            .tracks
            .into_values()
            .filter(|t| t.track_title.contains(keyword))
            .collect())
    }

    async fn count_tracks_by_album(&mut self, album_id: i32) -> StorageResult<i64> {
        let state = self.view().await?;
        Ok(state.tracks.values().filter(|t| t.album_id == album_id).count() as i64)
    }
}

#[async_trait]
impl SubscriptionPlanRepository for MemoryTransaction {
    async fn save_plan(&mut self, plan: SubscriptionPlan) -> StorageResult<SubscriptionPlan> {
        let id = Sequences::next(&self.shared.sequences.plan);
        let plan = plan.with_id(id);
        self.writes.push(Write::Plan(plan.clone()));
        Ok(plan)
    }

    async fn find_regular_plan(&mut self) -> StorageResult<Option<SubscriptionPlan>> {
        let state = self.view().await?;
        Ok(state
            .plans
            .into_values()
            .rev()
            .find(|p| p.plan_type == crate::domain::PlanType::Regular))
    }

    async fn find_artist_plan(&mut self, artist_id: i32) -> StorageResult<Option<SubscriptionPlan>> {
        let state = self.view().await?;
        Ok(state
            .plans
            .into_values()
            .rev()
            .find(|p| p.artist_id == Some(artist_id)))
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryTransaction {
    async fn save_subscription(&mut self, subscription: Subscription) -> StorageResult<Subscription> {
        let subscription = match subscription.subscription_id {
            Some(_) => subscription,
            None => subscription.with_id(Sequences::next(&self.shared.sequences.subscription)),
        };
        self.writes.push(Write::Subscription(subscription.clone()));
        Ok(subscription)
    }

    async fn find_subscriptions_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Subscription>> {
        let state = self.view().await?;
        Ok(state
            .subscriptions
            .into_values()
            .filter(|s| s.member_id == member_id)
            .collect())
    }

    async fn find_subscriptions_by_member_and_plan(
        &mut self,
        member_id: i32,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>> {
        let state = self.view().await?;
        Ok(state
            .subscriptions
            .into_values()
            .filter(|s| s.member_id == member_id && s.subscription_plan_id == subscription_plan_id)
            .collect())
    }

    async fn count_active_subscriptions_by_plan(&mut self, subscription_plan_id: i32) -> StorageResult<i64> {
        Ok(self
            .find_active_subscriptions_by_plan(subscription_plan_id)
            .await?
            .len() as i64)
    }

    async fn find_active_subscriptions_by_plan(
        &mut self,
        subscription_plan_id: i32,
    ) -> StorageResult<Vec<Subscription>> {
        let state = self.view().await?;
        Ok(state
            .subscriptions
            .into_values()
            .filter(|s| s.subscription_plan_id == subscription_plan_id && s.activate_yn)
            .collect())
    }

    async fn find_active_subscriptions_by_plan_between(
        &mut self,
        subscription_plan_id: i32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Subscription>> {
        let active = self.find_active_subscriptions_by_plan(subscription_plan_id).await?;
        Ok(active
            .into_iter()
            .filter(|s| s.subscribed_at >= start && s.subscribed_at <= end)
            .collect())
    }
}

#[async_trait]
impl SubscriptionEventRepository for MemoryTransaction {
    async fn exists_event(&mut self, subscription_event_id: &str) -> StorageResult<bool> {
        Ok(self.view().await?.has_event(subscription_event_id, None))
    }

    async fn exists_event_with_type(
        &mut self,
        subscription_event_id: &str,
        event_type: EventType,
    ) -> StorageResult<bool> {
        Ok(self
            .view()
            .await?
            .has_event(subscription_event_id, Some(event_type)))
    }

    async fn save_event(&mut self, record: SubscriptionEventRecord) -> StorageResult<()> {
        // Reject early against what is visible now; commit checks again.
        let write = Write::SubscriptionEvent(record);
        self.view().await?.apply(&write)?;
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl PlaylistRepository for MemoryTransaction {
    async fn find_playlist(&mut self, playlist_id: i32) -> StorageResult<Option<Playlist>> {
        Ok(self.view().await?.playlists.remove(&playlist_id))
    }

    async fn find_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>> {
        let state = self.view().await?;
        Ok(state
            .playlists
            .into_values()
            .filter(|p| p.member_id == member_id)
            .collect())
    }

    async fn find_public_playlists(&mut self) -> StorageResult<Vec<Playlist>> {
        let state = self.view().await?;
        Ok(state.public_playlists().cloned().collect())
    }

    async fn find_public_playlists_by_member(&mut self, member_id: i32) -> StorageResult<Vec<Playlist>> {
        let state = self.view().await?;
        Ok(state
            .public_playlists()
            .filter(|p| p.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn find_top_shared_playlists(&mut self, limit: i64) -> StorageResult<Vec<Playlist>> {
        let state = self.view().await?;
        let mut playlists: Vec<Playlist> = state.public_playlists().cloned().collect();
        playlists.sort_by(|a, b| {
            b.share_count
                .cmp(&a.share_count)
                .then(a.playlist_id.cmp(&b.playlist_id))
        });
        playlists.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(playlists)
    }

    async fn save_playlist(&mut self, playlist: Playlist) -> StorageResult<Playlist> {
        let playlist = match playlist.playlist_id {
            Some(_) => playlist,
            None => playlist.with_id(Sequences::next(&self.shared.sequences.playlist)),
        };
        self.writes.push(Write::Playlist(playlist.clone()));
        Ok(playlist)
    }

    async fn increment_share_count(&mut self, playlist_id: i32) -> StorageResult<Option<i32>> {
        // Replayed at commit against the latest state, so concurrent shares add up
        let write = Write::SharePlaylist(playlist_id);
        let mut state = self.view().await?;
        if !state.playlists.contains_key(&playlist_id) {
            return Ok(None);
        }
        state.apply(&write)?;
        self.writes.push(write);
        Ok(state.playlists.get(&playlist_id).map(|p| p.share_count))
    }

    async fn delete_playlist(&mut self, playlist_id: i32) -> StorageResult<bool> {
        let existed = self.view().await?.playlists.contains_key(&playlist_id);
        if existed {
            self.writes.push(Write::DeletePlaylist(playlist_id));
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FantalkContent, PlanType};

    fn record(id: &str, event_type: EventType) -> SubscriptionEventRecord {
        SubscriptionEventRecord::new(id, event_type, 42, PlanType::Regular)
    }

    #[tokio::test]
    async fn test_identity_assigned_on_save() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let content = FantalkContent::new("hi", 3, None).unwrap();
        let saved = tx
            .save_fantalk(Fantalk::new(1, 42, content, Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(saved.fantalk_id, Some(1));
        assert_eq!(db.fantalks().await, vec![saved]);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = MemoryDatabase::new();
        {
            let mut tx = db.begin().await.unwrap();
            let content = FantalkContent::new("hi", 3, None).unwrap();
            tx.save_fantalk(Fantalk::new(1, 42, content, Utc::now()))
                .await
                .unwrap();
        }

        assert!(db.fantalks().await.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.save_event(record("evt-1", EventType::Payment)).await.unwrap();

        assert!(tx.exists_event("evt-1").await.unwrap());
        assert!(tx.exists_payment_event("evt-1").await.unwrap());
        assert!(!tx.exists_subscribe_event("evt-1").await.unwrap());

        // Not visible outside until commit
        let mut other = db.begin().await.unwrap();
        assert!(!other.exists_event("evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_same_event_id_with_other_type_is_allowed() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.save_event(record("evt-1", EventType::Payment)).await.unwrap();
        tx.save_event(record("evt-1", EventType::Subscribe)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.subscription_events().await.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_event_rejected_within_transaction() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.save_event(record("evt-1", EventType::Payment)).await.unwrap();

        let err = tx
            .save_event(record("evt-1", EventType::Payment))
            .await
            .unwrap_err();
        assert!(err.violates(SUBSCRIPTION_EVENT_KEY));
    }

    #[tokio::test]
    async fn test_racing_transactions_store_one_event() {
        let db = MemoryDatabase::new();
        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();

        // Both pass the existence check before either commits
        assert!(!first.exists_payment_event("evt-9").await.unwrap());
        assert!(!second.exists_payment_event("evt-9").await.unwrap());
        first.save_event(record("evt-9", EventType::Payment)).await.unwrap();
        second.save_event(record("evt-9", EventType::Payment)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();

        assert!(err.violates(SUBSCRIPTION_EVENT_KEY));
        assert_eq!(db.subscription_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let db = MemoryDatabase::new();
        let mut first = db.begin().await.unwrap();
        first.save_event(record("evt-2", EventType::Subscribe)).await.unwrap();

        let mut second = db.begin().await.unwrap();
        second
            .save_subscription(Subscription::activate(42, 1, Utc::now()))
            .await
            .unwrap();
        second.save_event(record("evt-2", EventType::Subscribe)).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());

        assert!(db.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_one_active_subscription_per_member_and_plan() {
        let db = MemoryDatabase::new();
        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();
        first
            .save_subscription(Subscription::activate(42, 1, Utc::now()))
            .await
            .unwrap();
        second
            .save_subscription(Subscription::activate(42, 1, Utc::now()))
            .await
            .unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.violates(ACTIVE_SUBSCRIPTION_KEY));
        assert_eq!(db.subscriptions().await.len(), 1);

        // Inactive rows and other plans are not constrained
        let mut tx = db.begin().await.unwrap();
        let mut lapsed = Subscription::activate(42, 1, Utc::now());
        lapsed.activate_yn = false;
        tx.save_subscription(lapsed).await.unwrap();
        tx.save_subscription(Subscription::activate(42, 2, Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.subscriptions().await.len(), 3);
    }

    #[tokio::test]
    async fn test_foreign_key_queries_return_empty_vec() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        assert!(tx.find_tracks_by_album(404).await.unwrap().is_empty());
        assert!(tx.find_subscriptions_by_member(404).await.unwrap().is_empty());
        assert!(tx.find_fantalks_by_channel(404).await.unwrap().is_empty());
        assert!(tx.find_playlists_by_member(404).await.unwrap().is_empty());
        assert_eq!(tx.count_tracks_by_album(404).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_track_queries() {
        let db = MemoryDatabase::new();
        for (id, number, title) in [(11, 2, "Night Drive"), (10, 1, "Morning Run"), (12, 1, "Night Owl")] {
            db.insert_track(Track {
                track_id: id,
                album_id: if id == 12 { 6 } else { 5 },
                track_number: number,
                track_title: title.to_string(),
            })
            .await;
        }

        let mut tx = db.begin().await.unwrap();
        let tracks = tx.find_tracks_by_album(5).await.unwrap();
        assert_eq!(tracks.iter().map(|t| t.track_id).collect::<Vec<_>>(), vec![10, 11]);

        assert!(tx.find_track(5, 11).await.unwrap().is_some());
        assert!(tx.find_track(6, 11).await.unwrap().is_none());

        let found = tx.search_tracks_by_title("Night").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(tx.search_tracks_by_title("night").await.unwrap().is_empty());

        assert_eq!(tx.count_tracks_by_album(5).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_like_upsert_keeps_one_row() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.save_like(Like::new(LikeTarget::Album, 5, 42, true)).await.unwrap();
        tx.save_like(Like::new(LikeTarget::Album, 5, 42, false)).await.unwrap();
        tx.save_like(Like::new(LikeTarget::Album, 5, 43, true)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.likes().await.len(), 2);
        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.count_active_likes(LikeTarget::Album, 5).await.unwrap(), 1);
        let like = tx.find_like(LikeTarget::Album, 5, 42).await.unwrap().unwrap();
        assert!(!like.liked);
    }

    #[tokio::test]
    async fn test_latest_plan_wins() {
        let db = MemoryDatabase::new();
        let factory = crate::domain::SubscriptionPlanFactory;
        let mut tx = db.begin().await.unwrap();
        tx.save_plan(factory.create_regular_plan(rust_decimal::Decimal::ONE).unwrap())
            .await
            .unwrap();
        let latest = tx
            .save_plan(factory.create_regular_plan(rust_decimal::Decimal::TEN).unwrap())
            .await
            .unwrap();
        tx.save_plan(factory.create_artist_plan(7, rust_decimal::Decimal::TWO).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.find_regular_plan().await.unwrap(), Some(latest));
        assert_eq!(
            tx.find_artist_plan(7).await.unwrap().unwrap().plan_type,
            PlanType::Artist
        );
        assert!(tx.find_artist_plan(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_top_shared_playlists() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        for (title, public, shares) in [("a", true, 3), ("b", true, 9), ("c", false, 50), ("d", true, 1)] {
            let mut playlist = Playlist::new(1, title.to_string(), public, vec![]);
            playlist.share_count = shares;
            tx.save_playlist(playlist).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let top = tx.find_top_shared_playlists(2).await.unwrap();
        let titles: Vec<&str> = top.iter().map(|p| p.playlist_title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_delete_playlist() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let saved = tx
            .save_playlist(Playlist::new(1, "gone".to_string(), true, vec![1, 2]))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let id = saved.playlist_id.unwrap();
        let mut tx = db.begin().await.unwrap();
        assert!(tx.delete_playlist(id).await.unwrap());
        assert!(!tx.delete_playlist(id).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(tx.find_playlist(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interleaved_shares_both_count() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let saved = tx
            .save_playlist(Playlist::new(1, "mix".to_string(), true, vec![3]))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let id = saved.playlist_id.unwrap();

        // Both read share_count = 0 before either commits
        let mut first = db.begin().await.unwrap();
        let mut second = db.begin().await.unwrap();
        assert_eq!(first.find_playlist(id).await.unwrap().unwrap().share_count, 0);
        assert_eq!(second.find_playlist(id).await.unwrap().unwrap().share_count, 0);
        assert_eq!(first.increment_share_count(id).await.unwrap(), Some(1));
        assert_eq!(second.increment_share_count(id).await.unwrap(), Some(1));
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.find_playlist(id).await.unwrap().unwrap().share_count, 2);
        assert_eq!(tx.increment_share_count(404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_playlist_update_keeps_share_count() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let saved = tx
            .save_playlist(Playlist::new(1, "mix".to_string(), true, vec![3]))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let id = saved.playlist_id.unwrap();

        let mut share = db.begin().await.unwrap();
        share.increment_share_count(id).await.unwrap();
        share.commit().await.unwrap();

        let mut rename = db.begin().await.unwrap();
        let mut stale = saved.clone();
        stale.playlist_title = "renamed".to_string();
        rename.save_playlist(stale).await.unwrap();
        rename.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let playlist = tx.find_playlist(id).await.unwrap().unwrap();
        assert_eq!(playlist.playlist_title, "renamed");
        assert_eq!(playlist.share_count, 1);
    }
}
