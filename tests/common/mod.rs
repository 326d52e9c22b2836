//! Common test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Response;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ari::api::AppState;
use ari::blob::{BlobStore, BlobStoreError, ImagePayload};
use ari::domain::{Album, Track};
use ari::store::MemoryDatabase;

pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;

/// Leading bytes of a PNG file
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Blob store that counts uploads and hands out predictable URLs
#[derive(Default)]
pub struct RecordingBlobStore {
    calls: AtomicUsize,
}

impl RecordingBlobStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload_image(&self, image: &ImagePayload, category: &str) -> Result<String, BlobStoreError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let extension = image.extension().unwrap_or("bin");
        Ok(format!("https://blobs.test/{category}/{n}.{extension}"))
    }
}

/// In-memory app state seeded with album 5 (tracks 3 and 4) and album 6
/// (no tracks)
pub async fn setup_memory_state() -> (AppState, MemoryDatabase, Arc<RecordingBlobStore>) {
    let db = MemoryDatabase::new();
    db.insert_album(Album {
        album_id: 5,
        album_title: "First Light".to_string(),
        member_id: 7,
    })
    .await;
    db.insert_album(Album {
        album_id: 6,
        album_title: "Empty".to_string(),
        member_id: 7,
    })
    .await;
    for (track_id, number, title) in [(3, 1, "Dawn"), (4, 2, "Dusk")] {
        db.insert_track(Track {
            track_id,
            album_id: 5,
            track_number: number,
            track_title: title.to_string(),
        })
        .await;
    }

    let blobs = Arc::new(RecordingBlobStore::default());
    let state = AppState::new(Arc::new(db.clone()), blobs.clone(), MAX_UPLOAD_BYTES);
    (state, db, blobs)
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Setup test database - truncate tables and seed the catalogue
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query(
        "TRUNCATE TABLE playlist_tracks, playlists, subscription_events, subscriptions, \
         subscription_plans, likes, fantalks, tracks, albums RESTART IDENTITY CASCADE",
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    sqlx::query("INSERT INTO albums (album_id, album_title, member_id) VALUES (5, 'First Light', 7)")
        .execute(&mut *tx)
        .await
        .expect("Failed to seed album");

    sqlx::query(
        r#"
        INSERT INTO tracks (track_id, album_id, track_number, track_title)
        VALUES (3, 5, 1, 'Dawn'), (4, 5, 2, 'Dusk')
        "#,
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to seed tracks");

    tx.commit().await.expect("Failed to commit seed");

    pool
}
