//! Domain module
//!
//! Core domain types and business rules, free of storage and HTTP concerns.

pub mod context;
pub mod error;
pub mod fantalk;
pub mod like;
pub mod music;
pub mod playlist;
pub mod subscription;

pub use context::OperationContext;
pub use error::{CommunityError, MusicError, PlaylistError, SubscriptionError};
pub use fantalk::{Fantalk, FantalkContent};
pub use like::{Like, LikeTarget};
pub use music::{Album, Track};
pub use playlist::Playlist;
pub use subscription::{
    EventType, PlanType, Subscription, SubscriptionEventRecord, SubscriptionPlan,
    SubscriptionPlanFactory,
};
