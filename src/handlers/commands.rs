//! Command definitions
//!
//! Commands represent intentions to change the system state. They are built
//! per request by the API layer, with the member id already resolved from
//! the principal, and are never persisted.

use serde::{Deserialize, Serialize};

use crate::blob::ImagePayload;
use crate::domain::{EventType, PlanType};
use crate::idempotency::LedgerOutcome;

// =========================================================================
// M201: CreateFantalkCommand
// =========================================================================

/// Command to post a fan-talk in a channel
#[derive(Debug, Clone)]
pub struct CreateFantalkCommand {
    pub fantalk_channel_id: i32,
    pub member_id: i32,
    pub content: String,
    pub track_id: i32,
    /// Attached image; `None` or an empty payload means no image
    pub fantalk_image: Option<ImagePayload>,
}

impl CreateFantalkCommand {
    pub fn new(fantalk_channel_id: i32, member_id: i32, content: String, track_id: i32) -> Self {
        Self {
            fantalk_channel_id,
            member_id,
            content,
            track_id,
            fantalk_image: None,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.fantalk_image = Some(image);
        self
    }

    /// The attached image, if it carries any bytes
    pub fn image(&self) -> Option<&ImagePayload> {
        self.fantalk_image.as_ref().filter(|image| !image.is_empty())
    }
}

// =========================================================================
// M205: Like commands
// =========================================================================

/// Command to set a member's like on an album
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumLikeCommand {
    pub album_id: i32,
    pub member_id: i32,
    pub liked: bool,
}

impl AlbumLikeCommand {
    pub fn new(album_id: i32, member_id: i32, liked: bool) -> Self {
        Self {
            album_id,
            member_id,
            liked,
        }
    }
}

/// Command to set a member's like on a track of an album
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackLikeCommand {
    pub album_id: i32,
    pub track_id: i32,
    pub member_id: i32,
    pub liked: bool,
}

impl TrackLikeCommand {
    pub fn new(album_id: i32, track_id: i32, member_id: i32, liked: bool) -> Self {
        Self {
            album_id,
            track_id,
            member_id,
            liked,
        }
    }
}

// =========================================================================
// M210: SubscriptionEventCommand
// =========================================================================

/// An event delivered by the payment gateway.
///
/// The gateway may redeliver; (`subscription_event_id`, `event_type`)
/// identifies the delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEventCommand {
    pub subscription_event_id: String,
    pub event_type: EventType,
    pub subscriber_id: i32,
    pub plan_type: PlanType,
    /// Required for artist plans
    pub artist_id: Option<i32>,
}

impl SubscriptionEventCommand {
    pub fn regular(
        subscription_event_id: impl Into<String>,
        event_type: EventType,
        subscriber_id: i32,
    ) -> Self {
        Self {
            subscription_event_id: subscription_event_id.into(),
            event_type,
            subscriber_id,
            plan_type: PlanType::Regular,
            artist_id: None,
        }
    }

    pub fn artist(
        subscription_event_id: impl Into<String>,
        event_type: EventType,
        subscriber_id: i32,
        artist_id: i32,
    ) -> Self {
        Self {
            subscription_event_id: subscription_event_id.into(),
            event_type,
            subscriber_id,
            plan_type: PlanType::Artist,
            artist_id: Some(artist_id),
        }
    }
}

/// Outcome of a delivered subscription event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEventResult {
    pub subscription_event_id: String,
    pub event_type: EventType,
    pub outcome: LedgerOutcome,
    /// Subscription created or paid for; `None` for duplicates
    pub subscription_id: Option<i32>,
}

impl SubscriptionEventResult {
    pub fn duplicate(command: &SubscriptionEventCommand) -> Self {
        Self {
            subscription_event_id: command.subscription_event_id.clone(),
            event_type: command.event_type,
            outcome: LedgerOutcome::Duplicate,
            subscription_id: None,
        }
    }
}

// =========================================================================
// M220: Playlist commands
// =========================================================================

/// Command to create a playlist owned by `member_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlaylistCommand {
    pub member_id: i32,
    pub playlist_title: String,
    pub public_yn: bool,
    pub track_ids: Vec<i32>,
}
