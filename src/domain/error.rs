//! Domain Error Types
//!
//! One error enum per bounded context. Every variant carries a stable short
//! code that clients can match on; the HTTP mapping lives in `crate::error`.

use thiserror::Error;

/// Fan-talk and like errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommunityError {
    #[error("Fan-talk content must not be blank")]
    ContentRequired,

    #[error("Fan-talk image exceeds {limit} bytes (got {size})")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("Fan-talk upload exceeds {limit} bytes")]
    UploadTooLarge { limit: usize },

    #[error("Fan-talk image must be a png, jpeg, gif or webp file: {0}")]
    UnsupportedImage(String),
}

impl CommunityError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ContentRequired => "FAN_001",
            Self::ImageTooLarge { .. } | Self::UploadTooLarge { .. } => "FAN_002",
            Self::UnsupportedImage(_) => "FAN_003",
        }
    }
}

/// Album and track errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MusicError {
    #[error("Album not found: {0}")]
    AlbumNotFound(i32),

    #[error("Track {track_id} not found in album {album_id}")]
    TrackNotFound { album_id: i32, track_id: i32 },
}

impl MusicError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlbumNotFound(_) => "ALB_001",
            Self::TrackNotFound { .. } => "TRK_001",
        }
    }
}

/// M132: Subscription errors
///
/// Codes are part of the public contract with the payment gateway and the
/// web client and must not be renumbered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscription not found for member {member_id} on plan {plan_id}")]
    SubscriptionNotFound { member_id: i32, plan_id: i32 },

    #[error("Subscription {0} is not active")]
    SubscriptionNotActive(i32),

    #[error("No regular subscription plan has been registered")]
    RegularPlanNotFound,

    #[error("No subscription plan registered for artist {0}")]
    ArtistPlanNotFound(i32),

    #[error("Regular subscription not found for member {0}")]
    RegularSubscriptionNotFound(i32),

    #[error("Plan price must be positive (got {0})")]
    InvalidPlanPrice(rust_decimal::Decimal),
}

impl SubscriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SubscriptionNotFound { .. } => "SUB_001",
            Self::SubscriptionNotActive(_) => "SUB_002",
            Self::RegularPlanNotFound => "REG_001",
            Self::ArtistPlanNotFound(_) => "ART_001",
            Self::RegularSubscriptionNotFound(_) => "REG_SUB_001",
            Self::InvalidPlanPrice(_) => "PLN_001",
        }
    }

    /// Missing plan or subscription, as opposed to a state/rule violation
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionNotFound { .. }
                | Self::RegularPlanNotFound
                | Self::ArtistPlanNotFound(_)
                | Self::RegularSubscriptionNotFound(_)
        )
    }
}

/// Playlist errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(i32),

    #[error("Member {member_id} does not own playlist {playlist_id}")]
    NotPlaylistOwner { playlist_id: i32, member_id: i32 },
}

impl PlaylistError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlaylistNotFound(_) => "PLY_001",
            Self::NotPlaylistOwner { .. } => "PLY_002",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_subscription_codes_are_stable() {
        let cases = [
            (
                SubscriptionError::SubscriptionNotFound {
                    member_id: 1,
                    plan_id: 2,
                },
                "SUB_001",
            ),
            (SubscriptionError::SubscriptionNotActive(1), "SUB_002"),
            (SubscriptionError::RegularPlanNotFound, "REG_001"),
            (SubscriptionError::ArtistPlanNotFound(7), "ART_001"),
            (SubscriptionError::RegularSubscriptionNotFound(1), "REG_SUB_001"),
            (SubscriptionError::InvalidPlanPrice(Decimal::ZERO), "PLN_001"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_subscription_not_found_classification() {
        assert!(SubscriptionError::RegularPlanNotFound.is_not_found());
        assert!(SubscriptionError::ArtistPlanNotFound(3).is_not_found());
        assert!(!SubscriptionError::SubscriptionNotActive(3).is_not_found());
        assert!(!SubscriptionError::InvalidPlanPrice(Decimal::ONE).is_not_found());
    }

    #[test]
    fn test_other_context_codes() {
        assert_eq!(CommunityError::ContentRequired.code(), "FAN_001");
        assert_eq!(
            CommunityError::ImageTooLarge { size: 2, limit: 1 }.code(),
            "FAN_002"
        );
        assert_eq!(CommunityError::UploadTooLarge { limit: 1 }.code(), "FAN_002");
        assert_eq!(
            CommunityError::UnsupportedImage("evil.html".to_string()).code(),
            "FAN_003"
        );
        assert_eq!(MusicError::AlbumNotFound(5).code(), "ALB_001");
        assert_eq!(
            MusicError::TrackNotFound {
                album_id: 5,
                track_id: 3
            }
            .code(),
            "TRK_001"
        );
        assert_eq!(PlaylistError::PlaylistNotFound(1).code(), "PLY_001");
        assert_eq!(
            PlaylistError::NotPlaylistOwner {
                playlist_id: 1,
                member_id: 2
            }
            .code(),
            "PLY_002"
        );
    }

    #[test]
    fn test_error_messages_carry_ids() {
        let err = MusicError::TrackNotFound {
            album_id: 5,
            track_id: 3,
        };
        assert!(err.to_string().contains("Track 3"));
        assert!(err.to_string().contains("album 5"));
    }
}
