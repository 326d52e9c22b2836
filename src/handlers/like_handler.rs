//! Like Handler
//!
//! Sets or clears a member's like on an album or on one of its tracks.
//! A member has at most one like row per target; toggling overwrites it.

use std::sync::Arc;

use crate::domain::{Like, LikeTarget, MusicError, OperationContext};
use crate::error::AppError;
use crate::store::Database;

use super::{AlbumLikeCommand, TrackLikeCommand};

// =========================================================================
// M206: LikeHandler
// =========================================================================

pub struct LikeHandler {
    db: Arc<dyn Database>,
}

impl LikeHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn update_album_like(
        &self,
        command: AlbumLikeCommand,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        if tx.find_album(command.album_id).await?.is_none() {
            return Err(MusicError::AlbumNotFound(command.album_id).into());
        }

        let like = Like::new(LikeTarget::Album, command.album_id, command.member_id, command.liked);
        tx.save_like(like).await?;
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            album_id = command.album_id,
            member_id = command.member_id,
            liked = command.liked,
            "Album like updated"
        );

        Ok(())
    }

    pub async fn update_track_like(
        &self,
        command: TrackLikeCommand,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        // The track must belong to the album in the path
        if tx.find_track(command.album_id, command.track_id).await?.is_none() {
            return Err(MusicError::TrackNotFound {
                album_id: command.album_id,
                track_id: command.track_id,
            }
            .into());
        }

        let like = Like::new(LikeTarget::Track, command.track_id, command.member_id, command.liked);
        tx.save_like(like).await?;
        tx.commit().await?;

        tracing::info!(
            correlation_id = ?context.correlation_id,
            album_id = command.album_id,
            track_id = command.track_id,
            member_id = command.member_id,
            liked = command.liked,
            "Track like updated"
        );

        Ok(())
    }
}
