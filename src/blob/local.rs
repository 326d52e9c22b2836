//! Filesystem blob store
//!
//! Objects are written to `{root}/{category}/{sha256}.{ext}` and served by
//! whatever sits behind `public_base_url`. Naming by content hash makes a
//! repeated upload of the same image land on the same object.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{BlobStore, BlobStoreError, ImagePayload};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Object name for a payload: hex SHA-256 of its bytes plus the
    /// extension of its detected image format
    pub fn object_name(image: &ImagePayload) -> Result<String, BlobStoreError> {
        let extension = image.extension().ok_or_else(|| {
            BlobStoreError::UnsupportedImage(image.file_name.clone().unwrap_or_default())
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&image.bytes);
        Ok(format!("{}.{}", hex::encode(hasher.finalize()), extension))
    }

    fn validate_category(category: &str) -> Result<(), BlobStoreError> {
        let valid = !category.is_empty()
            && category
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BlobStoreError::InvalidCategory(category.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload_image(&self, image: &ImagePayload, category: &str) -> Result<String, BlobStoreError> {
        Self::validate_category(category)?;
        if image.is_empty() {
            return Err(BlobStoreError::EmptyPayload(category.to_string()));
        }

        let name = Self::object_name(image)?;

        let dir = self.root.join(category);
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join(&name), &image.bytes).await?;

        tracing::debug!(category, object = %name, size = image.len(), "Stored blob");

        Ok(format!("{}/{}/{}", self.public_base_url, category, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(body: &[u8]) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://cdn.test/uploads/");
        let image = ImagePayload::new(png(b"pixels")).with_file_name("a.PNG");

        let url = store.upload_image(&image, "fantalk").await.unwrap();

        let name = LocalBlobStore::object_name(&image).unwrap();
        assert!(name.ends_with(".png"));
        assert_eq!(url, format!("http://cdn.test/uploads/fantalk/{name}"));
        let stored = tokio::fs::read(dir.path().join("fantalk").join(&name)).await.unwrap();
        assert_eq!(stored, png(b"pixels"));
    }

    #[tokio::test]
    async fn test_same_content_same_object() {
        let a = ImagePayload::new(png(b"same")).with_file_name("x.png");
        let b = ImagePayload::new(png(b"same")).with_file_name("y.png");
        let c = ImagePayload::new(png(b"other")).with_file_name("x.png");

        assert_eq!(
            LocalBlobStore::object_name(&a).unwrap(),
            LocalBlobStore::object_name(&b).unwrap()
        );
        assert_ne!(
            LocalBlobStore::object_name(&a).unwrap(),
            LocalBlobStore::object_name(&c).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rejects_markup_disguised_as_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://cdn.test/uploads");
        let page = ImagePayload::new(b"<script>alert(document.cookie)</script>".to_vec())
            .with_file_name("evil.html");

        let err = store.upload_image(&page, "fantalk").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::UnsupportedImage(_)));
        assert!(!dir.path().join("fantalk").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_like_category() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://cdn.test");
        let image = ImagePayload::new(png(b"x"));

        let err = store.upload_image(&image, "../escape").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidCategory(_)));
    }

    #[tokio::test]
    async fn test_rejects_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://cdn.test");

        let err = store
            .upload_image(&ImagePayload::default(), "fantalk")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::EmptyPayload(_)));
    }
}
