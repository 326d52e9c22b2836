//! Track Query Handler

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{LikeTarget, MusicError, Track};
use crate::error::AppError;
use crate::store::Database;

/// A track with its like count
#[derive(Debug, Clone, Serialize)]
pub struct TrackDetail {
    pub track: Track,
    pub like_count: i64,
}

/// Tracks of an album
#[derive(Debug, Clone, Serialize)]
pub struct AlbumTracks {
    pub album_id: i32,
    pub track_count: i64,
    pub tracks: Vec<Track>,
}

pub struct TrackQueryHandler {
    db: Arc<dyn Database>,
}

impl TrackQueryHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Tracks of an album in track-number order. An album without tracks
    /// yields an empty list.
    pub async fn album_tracks(&self, album_id: i32) -> Result<AlbumTracks, AppError> {
        let mut tx = self.db.begin().await?;

        if tx.find_album(album_id).await?.is_none() {
            return Err(MusicError::AlbumNotFound(album_id).into());
        }

        let tracks = tx.find_tracks_by_album(album_id).await?;
        let track_count = tx.count_tracks_by_album(album_id).await?;
        tx.commit().await?;

        Ok(AlbumTracks {
            album_id,
            track_count,
            tracks,
        })
    }

    pub async fn track(&self, album_id: i32, track_id: i32) -> Result<TrackDetail, AppError> {
        let mut tx = self.db.begin().await?;

        let track = tx
            .find_track(album_id, track_id)
            .await?
            .ok_or(MusicError::TrackNotFound { album_id, track_id })?;
        let like_count = tx.count_active_likes(LikeTarget::Track, track_id).await?;
        tx.commit().await?;

        Ok(TrackDetail { track, like_count })
    }

    /// Case-sensitive substring search on track titles
    pub async fn search(&self, keyword: &str) -> Result<Vec<Track>, AppError> {
        if keyword.trim().is_empty() {
            return Err(AppError::InvalidRequest("keyword must not be blank".to_string()));
        }

        let mut tx = self.db.begin().await?;
        let tracks = tx.search_tracks_by_title(keyword).await?;
        tx.commit().await?;
        Ok(tracks)
    }
}
