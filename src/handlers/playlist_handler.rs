//! Playlist Handler
//!
//! Reads and owner-only writes of playlists. Private playlists are visible
//! to their owner only; to anyone else they do not exist.

use std::sync::Arc;

use crate::domain::{OperationContext, Playlist, PlaylistError};
use crate::error::AppError;
use crate::store::Database;

use super::CreatePlaylistCommand;

/// Default size of the popular playlist listing
pub const DEFAULT_TOP_SHARED_LIMIT: i64 = 10;
const MAX_TOP_SHARED_LIMIT: i64 = 100;

// =========================================================================
// M221: PlaylistHandler
// =========================================================================

pub struct PlaylistHandler {
    db: Arc<dyn Database>,
}

impl PlaylistHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn get_playlist(
        &self,
        playlist_id: i32,
        viewer_id: Option<i32>,
    ) -> Result<Playlist, AppError> {
        let mut tx = self.db.begin().await?;
        let playlist = tx
            .find_playlist(playlist_id)
            .await?
            .filter(|p| p.is_visible_to(viewer_id))
            .ok_or(PlaylistError::PlaylistNotFound(playlist_id))?;
        tx.commit().await?;
        Ok(playlist)
    }

    /// All playlists of a member, private ones included
    pub async fn member_playlists(&self, member_id: i32) -> Result<Vec<Playlist>, AppError> {
        let mut tx = self.db.begin().await?;
        let playlists = tx.find_playlists_by_member(member_id).await?;
        tx.commit().await?;
        Ok(playlists)
    }

    pub async fn public_playlists(&self) -> Result<Vec<Playlist>, AppError> {
        let mut tx = self.db.begin().await?;
        let playlists = tx.find_public_playlists().await?;
        tx.commit().await?;
        Ok(playlists)
    }

    /// Public playlists with the most shares. `limit` is clamped to 1..=100.
    pub async fn top_shared(&self, limit: i64) -> Result<Vec<Playlist>, AppError> {
        let limit = limit.clamp(1, MAX_TOP_SHARED_LIMIT);
        let mut tx = self.db.begin().await?;
        let playlists = tx.find_top_shared_playlists(limit).await?;
        tx.commit().await?;
        Ok(playlists)
    }

    pub async fn artist_public_playlists(&self, member_id: i32) -> Result<Vec<Playlist>, AppError> {
        let mut tx = self.db.begin().await?;
        let playlists = tx.find_public_playlists_by_member(member_id).await?;
        tx.commit().await?;
        Ok(playlists)
    }

    pub async fn create_playlist(
        &self,
        command: CreatePlaylistCommand,
        context: &OperationContext,
    ) -> Result<Playlist, AppError> {
        if command.playlist_title.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "playlistTitle must not be blank".to_string(),
            ));
        }

        let playlist = Playlist::new(
            command.member_id,
            command.playlist_title,
            command.public_yn,
            command.track_ids,
        );

        let mut tx = self.db.begin().await?;
        let playlist = tx.save_playlist(playlist).await?;
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            playlist_id = ?playlist.playlist_id,
            member_id = playlist.member_id,
            track_count = playlist.track_ids.len(),
            "Playlist created"
        );

        Ok(playlist)
    }

    /// Count one share. Only public playlists, or the owner's own, can be
    /// shared.
    pub async fn share_playlist(
        &self,
        playlist_id: i32,
        member_id: i32,
        context: &OperationContext,
    ) -> Result<Playlist, AppError> {
        let mut tx = self.db.begin().await?;
        let mut playlist = tx
            .find_playlist(playlist_id)
            .await?
            .filter(|p| p.is_visible_to(Some(member_id)))
            .ok_or(PlaylistError::PlaylistNotFound(playlist_id))?;

        // Incremented in storage; a count read above may already be stale
        playlist.share_count = tx
            .increment_share_count(playlist_id)
            .await?
            .ok_or(PlaylistError::PlaylistNotFound(playlist_id))?;
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            playlist_id,
            member_id,
            share_count = playlist.share_count,
            "Playlist shared"
        );

        Ok(playlist)
    }

    pub async fn delete_playlist(
        &self,
        playlist_id: i32,
        member_id: i32,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        let playlist = tx
            .find_playlist(playlist_id)
            .await?
            .filter(|p| p.is_visible_to(Some(member_id)))
            .ok_or(PlaylistError::PlaylistNotFound(playlist_id))?;
        playlist.ensure_owner(member_id)?;

        if !tx.delete_playlist(playlist_id).await? {
            return Err(PlaylistError::PlaylistNotFound(playlist_id).into());
        }
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            playlist_id,
            member_id,
            "Playlist deleted"
        );

        Ok(())
    }
}
