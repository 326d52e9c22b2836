//! Fan-talk Handlers
//!
//! Posting a fan-talk uploads its optional image and persists the post in
//! one logical step. The blob store is not transactional, so the upload
//! happens before the unit of work opens; if the persist then fails the
//! uploaded object is left behind.

use std::sync::Arc;

use chrono::Utc;

use crate::blob::BlobStore;
use crate::domain::{CommunityError, Fantalk, FantalkContent, OperationContext};
use crate::error::AppError;
use crate::store::Database;

use super::CreateFantalkCommand;

/// Blob store category for fan-talk images
pub const FANTALK_IMAGE_CATEGORY: &str = "fantalk";

// =========================================================================
// M202: CreateFantalkHandler
// =========================================================================

pub struct CreateFantalkHandler {
    db: Arc<dyn Database>,
    blobs: Arc<dyn BlobStore>,
    max_upload_bytes: usize,
}

impl CreateFantalkHandler {
    pub fn new(db: Arc<dyn Database>, blobs: Arc<dyn BlobStore>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            blobs,
            max_upload_bytes,
        }
    }

    /// Execute the create command and return the persisted fan-talk
    pub async fn execute(
        &self,
        command: CreateFantalkCommand,
        context: &OperationContext,
    ) -> Result<Fantalk, AppError> {
        // Reject before anything is uploaded or written
        if command.content.trim().is_empty() {
            return Err(CommunityError::ContentRequired.into());
        }
        if let Some(image) = command.image() {
            if image.len() > self.max_upload_bytes {
                return Err(CommunityError::ImageTooLarge {
                    size: image.len(),
                    limit: self.max_upload_bytes,
                }
                .into());
            }
            if image.extension().is_none() {
                let name = image
                    .file_name
                    .clone()
                    .unwrap_or_else(|| "unnamed upload".to_string());
                return Err(CommunityError::UnsupportedImage(name).into());
            }
        }

        // (a) Upload the image, if any
        let image_url = match command.image() {
            Some(image) => {
                let url = self.blobs.upload_image(image, FANTALK_IMAGE_CATEGORY).await?;
                tracing::info!(
                    correlation_id = ?context.correlation_id,
                    member_id = command.member_id,
                    image_url = %url,
                    "Fan-talk image uploaded"
                );
                Some(url)
            }
            None => None,
        };

        // (b) + (c) Build the value object and the aggregate
        let content = FantalkContent::new(command.content, command.track_id, image_url)?;
        let fantalk = Fantalk::new(
            command.fantalk_channel_id,
            command.member_id,
            content,
            Utc::now(),
        );

        // (d) Persist
        let mut tx = self.db.begin().await?;
        let fantalk = tx.save_fantalk(fantalk).await?;
        tx.commit().await?;

        // (e)
        tracing::info!(
            correlation_id = ?context.correlation_id,
            fantalk_id = ?fantalk.fantalk_id,
            fantalk_channel_id = fantalk.fantalk_channel_id,
            member_id = fantalk.member_id,
            has_image = fantalk.content.image_url().is_some(),
            "Fan-talk created"
        );

        Ok(fantalk)
    }
}

// =========================================================================
// M203: FantalkQueryHandler
// =========================================================================

pub struct FantalkQueryHandler {
    db: Arc<dyn Database>,
}

impl FantalkQueryHandler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Fan-talks of a channel, newest first
    pub async fn channel_fantalks(&self, fantalk_channel_id: i32) -> Result<Vec<Fantalk>, AppError> {
        let mut tx = self.db.begin().await?;
        let fantalks = tx.find_fantalks_by_channel(fantalk_channel_id).await?;
        tx.commit().await?;
        Ok(fantalks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::ImagePayload;

    #[test]
    fn test_empty_image_counts_as_absent() {
        let command = CreateFantalkCommand::new(1, 2, "hi".to_string(), 3)
            .with_image(ImagePayload::new(Vec::new()));
        assert!(command.image().is_none());

        let command = CreateFantalkCommand::new(1, 2, "hi".to_string(), 3)
            .with_image(ImagePayload::new(vec![0xFF]));
        assert!(command.image().is_some());
    }
}
