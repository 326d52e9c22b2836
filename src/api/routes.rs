//! API Routes
//!
//! HTTP endpoint definitions. Each route resolves the principal, builds one
//! command and calls one handler method; the result goes out in the
//! response envelope.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::blob::{BlobStore, ImagePayload};
use crate::domain::{
    CommunityError, EventType, Fantalk, OperationContext, PlanType, Playlist, Subscription,
    SubscriptionPlan, Track,
};
use crate::error::AppError;
use crate::handlers::{
    AlbumLikeCommand, AlbumTracks, CreateFantalkCommand, CreateFantalkHandler,
    CreatePlaylistCommand, FantalkQueryHandler, LikeHandler, PlaylistHandler,
    SubscriptionEventCommand, SubscriptionEventHandler, SubscriptionEventResult,
    SubscriptionPlanHandler, SubscriptionQueryHandler, TrackDetail, TrackLikeCommand,
    TrackQueryHandler, DEFAULT_TOP_SHARED_LIMIT,
};
use crate::idempotency::LedgerOutcome;
use crate::store::Database;

use super::middleware::AuthenticatedMember;
use super::ApiResponse;

/// Shared handles passed to every route
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub blobs: Arc<dyn BlobStore>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, blobs: Arc<dyn BlobStore>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            blobs,
            max_upload_bytes,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;
type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeRequest {
    pub liked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegularPlanRequest {
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtistPlanRequest {
    pub artist_id: i32,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventRequest {
    pub subscription_event_id: String,
    pub event_type: EventType,
    pub subscriber_id: i32,
    pub plan_type: PlanType,
    #[serde(default)]
    pub artist_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistRequest {
    pub playlist_title: String,
    #[serde(default)]
    pub public_yn: bool,
    #[serde(default)]
    pub track_ids: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribersQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct TopSharedQuery {
    #[serde(default = "default_top_shared_limit")]
    pub limit: i64,
}

fn default_top_shared_limit() -> i64 {
    DEFAULT_TOP_SHARED_LIMIT
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FantalkResponse {
    pub fantalk_id: Option<i32>,
    pub fantalk_channel_id: i32,
    pub member_id: i32,
    pub content: String,
    pub track_id: i32,
    pub fantalk_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Fantalk> for FantalkResponse {
    fn from(fantalk: Fantalk) -> Self {
        Self {
            fantalk_id: fantalk.fantalk_id,
            fantalk_channel_id: fantalk.fantalk_channel_id,
            member_id: fantalk.member_id,
            content: fantalk.content.content().to_string(),
            track_id: fantalk.content.track_id(),
            fantalk_image_url: fantalk.content.image_url().map(str::to_string),
            created_at: fantalk.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub track_id: i32,
    pub album_id: i32,
    pub track_number: i32,
    pub track_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
}

impl From<Track> for TrackResponse {
    fn from(track: Track) -> Self {
        Self {
            track_id: track.track_id,
            album_id: track.album_id,
            track_number: track.track_number,
            track_title: track.track_title,
            like_count: None,
        }
    }
}

impl From<TrackDetail> for TrackResponse {
    fn from(detail: TrackDetail) -> Self {
        Self {
            like_count: Some(detail.like_count),
            ..detail.track.into()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumTracksResponse {
    pub album_id: i32,
    pub track_count: i64,
    pub tracks: Vec<TrackResponse>,
}

impl From<AlbumTracks> for AlbumTracksResponse {
    fn from(listing: AlbumTracks) -> Self {
        Self {
            album_id: listing.album_id,
            track_count: listing.track_count,
            tracks: listing.tracks.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub subscription_plan_id: Option<i32>,
    pub plan_type: PlanType,
    pub artist_id: Option<i32>,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<SubscriptionPlan> for PlanResponse {
    fn from(plan: SubscriptionPlan) -> Self {
        Self {
            subscription_plan_id: plan.subscription_plan_id,
            plan_type: plan.plan_type,
            artist_id: plan.artist_id,
            price: plan.price,
            created_at: plan.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscription_id: Option<i32>,
    pub member_id: i32,
    pub subscription_plan_id: i32,
    pub subscribed_at: DateTime<Utc>,
    pub activate_yn: bool,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            subscription_id: subscription.subscription_id,
            member_id: subscription.member_id,
            subscription_plan_id: subscription.subscription_plan_id,
            subscribed_at: subscription.subscribed_at,
            activate_yn: subscription.activate_yn,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribersResponse {
    pub subscription_plan_id: i32,
    pub subscriber_count: i64,
    pub subscriptions: Vec<SubscriptionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventResponse {
    pub subscription_event_id: String,
    pub event_type: EventType,
    pub outcome: LedgerOutcome,
    pub subscription_id: Option<i32>,
}

impl From<SubscriptionEventResult> for SubscriptionEventResponse {
    fn from(result: SubscriptionEventResult) -> Self {
        Self {
            subscription_event_id: result.subscription_event_id,
            event_type: result.event_type,
            outcome: result.outcome,
            subscription_id: result.subscription_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistResponse {
    pub playlist_id: Option<i32>,
    pub member_id: i32,
    pub playlist_title: String,
    pub public_yn: bool,
    pub share_count: i32,
    pub created_at: DateTime<Utc>,
    pub track_ids: Vec<i32>,
}

impl From<Playlist> for PlaylistResponse {
    fn from(playlist: Playlist) -> Self {
        Self {
            playlist_id: playlist.playlist_id,
            member_id: playlist.member_id,
            playlist_title: playlist.playlist_title,
            public_yn: playlist.public_yn,
            share_count: playlist.share_count,
            created_at: playlist.created_at,
            track_ids: playlist.track_ids,
        }
    }
}

fn playlists_response(playlists: Vec<Playlist>) -> Json<ApiResponse<Vec<PlaylistResponse>>> {
    Json(ApiResponse::ok(playlists.into_iter().map(Into::into).collect()))
}

// =========================================================================
// Extractor helpers
// =========================================================================

/// Member id of the caller, or `AUTH_001`
fn require_member(member: Option<Extension<AuthenticatedMember>>) -> Result<i32, AppError> {
    member
        .map(|Extension(member)| member.member_id)
        .ok_or(AppError::Unauthenticated)
}

/// Unwrap a JSON body, turning axum's rejection into the failure envelope
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    path.map(|Path(value)| value)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

fn query_param<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

/// A multipart stream cut off by the body limit is an oversized upload
fn multipart_error(error: MultipartError, max_upload_bytes: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CommunityError::UploadTooLarge {
            limit: max_upload_bytes,
        }
        .into()
    } else {
        AppError::InvalidRequest(error.body_text())
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Likes
        .route("/albums/:album_id/likes", post(update_album_like))
        .route(
            "/albums/:album_id/tracks/:track_id/likes",
            post(update_track_like),
        )
        // Tracks
        .route("/albums/:album_id/tracks", get(album_tracks))
        .route("/albums/:album_id/tracks/:track_id", get(track))
        .route("/tracks/search", get(search_tracks))
        // Fan-talks
        .route(
            "/fantalk-channels/:channel_id/fantalks",
            post(create_fantalk).get(channel_fantalks),
        )
        // Subscriptions
        .route("/subscriptions/plans/regular", post(create_regular_plan))
        .route("/subscriptions/plans/artist", post(create_artist_plan))
        .route("/subscriptions/events", post(subscription_event))
        .route("/subscriptions/my", get(member_subscriptions))
        .route(
            "/subscriptions/plans/:plan_id/subscribers",
            get(active_subscribers),
        )
        // Playlists
        .route("/playlists", post(create_playlist))
        .route("/playlists/my", get(member_playlists))
        .route("/playlists/public", get(public_playlists))
        .route("/playlists/popular", get(top_shared_playlists))
        .route(
            "/playlists/:playlist_id",
            get(get_playlist).delete(delete_playlist),
        )
        .route("/playlists/:playlist_id/share", post(share_playlist))
        .route("/artists/:member_id/playlists", get(artist_public_playlists))
}

// =========================================================================
// POST /albums/:album_id/likes
// =========================================================================

async fn update_album_like(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> ApiResult<()> {
    let album_id = path_param(path)?;
    let member_id = require_member(member)?;
    let request = json_body(payload)?;

    let handler = LikeHandler::new(state.db);
    let command = AlbumLikeCommand::new(album_id, member_id, request.liked);
    handler.update_album_like(command, &context).await?;

    Ok(Json(ApiResponse::empty()))
}

// =========================================================================
// POST /albums/:album_id/tracks/:track_id/likes
// =========================================================================

async fn update_track_like(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<(i32, i32)>, PathRejection>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> ApiResult<()> {
    let (album_id, track_id) = path_param(path)?;
    let member_id = require_member(member)?;
    let request = json_body(payload)?;

    let handler = LikeHandler::new(state.db);
    let command = TrackLikeCommand::new(album_id, track_id, member_id, request.liked);
    handler.update_track_like(command, &context).await?;

    Ok(Json(ApiResponse::empty()))
}

// =========================================================================
// Track queries
// =========================================================================

async fn album_tracks(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<AlbumTracksResponse> {
    let album_id = path_param(path)?;
    let listing = TrackQueryHandler::new(state.db).album_tracks(album_id).await?;
    Ok(Json(ApiResponse::ok(listing.into())))
}

async fn track(
    State(state): State<AppState>,
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> ApiResult<TrackResponse> {
    let (album_id, track_id) = path_param(path)?;
    let detail = TrackQueryHandler::new(state.db).track(album_id, track_id).await?;
    Ok(Json(ApiResponse::ok(detail.into())))
}

async fn search_tracks(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Vec<TrackResponse>> {
    let query = query_param(query)?;
    let tracks = TrackQueryHandler::new(state.db).search(&query.keyword).await?;
    Ok(Json(ApiResponse::ok(tracks.into_iter().map(Into::into).collect())))
}

// =========================================================================
// POST /fantalk-channels/:channel_id/fantalks (multipart)
// =========================================================================

/// Multipart fields: `content`, `trackId`, optional `fantalkImage` file
async fn create_fantalk(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<i32>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> CreatedResult<FantalkResponse> {
    let channel_id = path_param(path)?;
    let mut multipart =
        multipart.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let member_id = require_member(member)?;
    let limit = state.max_upload_bytes;

    let mut content: Option<String> = None;
    let mut track_id: Option<i32> = None;
    let mut image: Option<ImagePayload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content" => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, limit))?,
                );
            }
            "trackId" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, limit))?;
                track_id = Some(raw.trim().parse().map_err(|_| {
                    AppError::InvalidRequest(format!("trackId is not a number: {raw}"))
                })?);
            }
            "fantalkImage" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, limit))?;

                let mut payload = ImagePayload::new(bytes.to_vec());
                payload.file_name = file_name;
                payload.content_type = content_type;
                image = Some(payload);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let content = content.ok_or_else(|| AppError::InvalidRequest("content is required".to_string()))?;
    let track_id = track_id.ok_or_else(|| AppError::InvalidRequest("trackId is required".to_string()))?;

    let mut command = CreateFantalkCommand::new(channel_id, member_id, content, track_id);
    if let Some(image) = image {
        command = command.with_image(image);
    }

    let handler = CreateFantalkHandler::new(state.db, state.blobs, state.max_upload_bytes);
    let fantalk = handler.execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(fantalk.into()))))
}

async fn channel_fantalks(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Vec<FantalkResponse>> {
    let channel_id = path_param(path)?;
    let fantalks = FantalkQueryHandler::new(state.db)
        .channel_fantalks(channel_id)
        .await?;
    Ok(Json(ApiResponse::ok(fantalks.into_iter().map(Into::into).collect())))
}

// =========================================================================
// Subscription plans
// =========================================================================

async fn create_regular_plan(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateRegularPlanRequest>, JsonRejection>,
) -> CreatedResult<PlanResponse> {
    let request = json_body(payload)?;
    let plan = SubscriptionPlanHandler::new(state.db)
        .create_regular_plan(request.price, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(plan.into()))))
}

async fn create_artist_plan(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateArtistPlanRequest>, JsonRejection>,
) -> CreatedResult<PlanResponse> {
    let request = json_body(payload)?;
    let plan = SubscriptionPlanHandler::new(state.db)
        .create_artist_plan(request.artist_id, request.price, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(plan.into()))))
}

// =========================================================================
// POST /subscriptions/events (payment gateway, no principal)
// =========================================================================

async fn subscription_event(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<SubscriptionEventRequest>, JsonRejection>,
) -> ApiResult<SubscriptionEventResponse> {
    let request = json_body(payload)?;
    let command = SubscriptionEventCommand {
        subscription_event_id: request.subscription_event_id,
        event_type: request.event_type,
        subscriber_id: request.subscriber_id,
        plan_type: request.plan_type,
        artist_id: request.artist_id,
    };

    let result = SubscriptionEventHandler::new(state.db)
        .handle(command, &context)
        .await?;
    Ok(Json(ApiResponse::ok(result.into())))
}

// =========================================================================
// Subscription queries
// =========================================================================

async fn member_subscriptions(
    State(state): State<AppState>,
    member: Option<Extension<AuthenticatedMember>>,
) -> ApiResult<Vec<SubscriptionResponse>> {
    let member_id = require_member(member)?;
    let subscriptions = SubscriptionQueryHandler::new(state.db)
        .member_subscriptions(member_id)
        .await?;
    Ok(Json(ApiResponse::ok(
        subscriptions.into_iter().map(Into::into).collect(),
    )))
}

async fn active_subscribers(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    query: Result<Query<SubscribersQuery>, QueryRejection>,
) -> ApiResult<SubscribersResponse> {
    let plan_id = path_param(path)?;
    let query = query_param(query)?;
    let subscribers = SubscriptionQueryHandler::new(state.db)
        .active_subscribers(plan_id, query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::ok(SubscribersResponse {
        subscription_plan_id: subscribers.subscription_plan_id,
        subscriber_count: subscribers.subscriber_count,
        subscriptions: subscribers
            .subscriptions
            .into_iter()
            .map(Into::into)
            .collect(),
    })))
}

// =========================================================================
// Playlists
// =========================================================================

async fn get_playlist(
    State(state): State<AppState>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<PlaylistResponse> {
    let playlist_id = path_param(path)?;
    let viewer = member.map(|Extension(member)| member.member_id);
    let playlist = PlaylistHandler::new(state.db)
        .get_playlist(playlist_id, viewer)
        .await?;
    Ok(Json(ApiResponse::ok(playlist.into())))
}

async fn member_playlists(
    State(state): State<AppState>,
    member: Option<Extension<AuthenticatedMember>>,
) -> ApiResult<Vec<PlaylistResponse>> {
    let member_id = require_member(member)?;
    let playlists = PlaylistHandler::new(state.db)
        .member_playlists(member_id)
        .await?;
    Ok(playlists_response(playlists))
}

async fn public_playlists(State(state): State<AppState>) -> ApiResult<Vec<PlaylistResponse>> {
    let playlists = PlaylistHandler::new(state.db).public_playlists().await?;
    Ok(playlists_response(playlists))
}

async fn top_shared_playlists(
    State(state): State<AppState>,
    query: Result<Query<TopSharedQuery>, QueryRejection>,
) -> ApiResult<Vec<PlaylistResponse>> {
    let query = query_param(query)?;
    let playlists = PlaylistHandler::new(state.db).top_shared(query.limit).await?;
    Ok(playlists_response(playlists))
}

async fn artist_public_playlists(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Vec<PlaylistResponse>> {
    let member_id = path_param(path)?;
    let playlists = PlaylistHandler::new(state.db)
        .artist_public_playlists(member_id)
        .await?;
    Ok(playlists_response(playlists))
}

async fn create_playlist(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    payload: Result<Json<CreatePlaylistRequest>, JsonRejection>,
) -> CreatedResult<PlaylistResponse> {
    let member_id = require_member(member)?;
    let request = json_body(payload)?;

    let command = CreatePlaylistCommand {
        member_id,
        playlist_title: request.playlist_title,
        public_yn: request.public_yn,
        track_ids: request.track_ids,
    };
    let playlist = PlaylistHandler::new(state.db)
        .create_playlist(command, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(playlist.into()))))
}

async fn share_playlist(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<PlaylistResponse> {
    let playlist_id = path_param(path)?;
    let member_id = require_member(member)?;
    let playlist = PlaylistHandler::new(state.db)
        .share_playlist(playlist_id, member_id, &context)
        .await?;
    Ok(Json(ApiResponse::ok(playlist.into())))
}

async fn delete_playlist(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    member: Option<Extension<AuthenticatedMember>>,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<()> {
    let playlist_id = path_param(path)?;
    let member_id = require_member(member)?;
    PlaylistHandler::new(state.db)
        .delete_playlist(playlist_id, member_id, &context)
        .await?;
    Ok(Json(ApiResponse::empty()))
}
