//! Playlist aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PlaylistError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub playlist_id: Option<i32>,
    /// Owner
    pub member_id: i32,
    pub playlist_title: String,
    pub public_yn: bool,
    pub share_count: i32,
    pub created_at: DateTime<Utc>,
    /// Track ids in play order
    pub track_ids: Vec<i32>,
}

impl Playlist {
    pub fn new(member_id: i32, playlist_title: String, public_yn: bool, track_ids: Vec<i32>) -> Self {
        Self {
            playlist_id: None,
            member_id,
            playlist_title,
            public_yn,
            share_count: 0,
            created_at: Utc::now(),
            track_ids,
        }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.playlist_id = Some(id);
        self
    }

    /// Whether `member_id` may see this playlist
    pub fn is_visible_to(&self, member_id: Option<i32>) -> bool {
        self.public_yn || member_id == Some(self.member_id)
    }

    /// Fails unless `member_id` owns the playlist
    pub fn ensure_owner(&self, member_id: i32) -> Result<(), PlaylistError> {
        if self.member_id != member_id {
            return Err(PlaylistError::NotPlaylistOwner {
                playlist_id: self.playlist_id.unwrap_or_default(),
                member_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility() {
        let private = Playlist::new(1, "mine".to_string(), false, vec![]);
        assert!(private.is_visible_to(Some(1)));
        assert!(!private.is_visible_to(Some(2)));
        assert!(!private.is_visible_to(None));

        let public = Playlist::new(1, "ours".to_string(), true, vec![]);
        assert!(public.is_visible_to(None));
    }

    #[test]
    fn test_ensure_owner() {
        let playlist = Playlist::new(1, "mine".to_string(), true, vec![3, 4]).with_id(10);
        assert!(playlist.ensure_owner(1).is_ok());
        assert_eq!(
            playlist.ensure_owner(2),
            Err(PlaylistError::NotPlaylistOwner {
                playlist_id: 10,
                member_id: 2
            })
        );
    }
}
