//! Command Handlers module
//!
//! Application services. Each handler method runs one use case inside one
//! unit of work: begin, work, commit. Returning early drops the transaction,
//! which rolls it back.

mod commands;
mod fantalk_handler;
mod like_handler;
mod playlist_handler;
mod subscription_event_handler;
mod subscription_plan_handler;
mod subscription_query_handler;
mod track_query_handler;


pub use commands::*;
pub use fantalk_handler::{CreateFantalkHandler, FantalkQueryHandler, FANTALK_IMAGE_CATEGORY};
pub use like_handler::LikeHandler;
pub use playlist_handler::{PlaylistHandler, DEFAULT_TOP_SHARED_LIMIT};
pub use subscription_event_handler::SubscriptionEventHandler;
pub use subscription_plan_handler::SubscriptionPlanHandler;
pub use subscription_query_handler::{ActiveSubscribers, SubscriptionQueryHandler};
pub use track_query_handler::{AlbumTracks, TrackDetail, TrackQueryHandler};
