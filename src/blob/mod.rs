//! Blob store
//!
//! Image uploads go through [`BlobStore`]. The store is not transactional:
//! an upload whose surrounding unit of work later fails stays behind.

mod local;

use async_trait::async_trait;
use image::ImageFormat;

pub use local::LocalBlobStore;

/// Image formats accepted for upload
pub const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// File name extensions a client may send with an image
const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Blob store errors
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("Blob store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty payload for category {0}")]
    EmptyPayload(String),

    #[error("Invalid blob category: {0}")]
    InvalidCategory(String),

    #[error("Payload is not a supported image: {0}")]
    UnsupportedImage(String),
}

/// An uploaded file as received from the client
#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Image format detected from the leading bytes, limited to the formats
    /// fan-talks accept
    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.bytes)
            .ok()
            .filter(|format| SUPPORTED_FORMATS.contains(format))
    }

    /// Lowercased extension of the client file name, if it has one
    pub fn declared_extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Extension to store the image under.
    ///
    /// Taken from the detected format, never from the client. `None` when
    /// the bytes are not a supported image or the file name claims a
    /// different kind of file.
    pub fn extension(&self) -> Option<&'static str> {
        let format = self.format()?;
        if let Some(declared) = self.declared_extension() {
            if !SUPPORTED_EXTENSIONS.contains(&declared.as_str()) {
                return None;
            }
        }
        format.extensions_str().first().copied()
    }
}

/// External image storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the image under `category` and return its public URL
    async fn upload_image(&self, image: &ImagePayload, category: &str) -> Result<String, BlobStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_extension_follows_detected_format() {
        let image = ImagePayload::new(PNG_HEADER.to_vec()).with_file_name("cover.final.PNG");
        assert_eq!(image.format(), Some(ImageFormat::Png));
        assert_eq!(image.extension(), Some("png"));

        // A jpeg named .png is stored as what it is
        let image = ImagePayload::new(JPEG_HEADER.to_vec()).with_file_name("photo.png");
        assert_eq!(image.extension(), Some("jpg"));

        let image = ImagePayload::new(JPEG_HEADER.to_vec()).with_file_name("no-extension");
        assert_eq!(image.extension(), Some("jpg"));
    }

    #[test]
    fn test_rejects_non_image_payloads() {
        let script = ImagePayload::new(b"<script>alert(1)</script>".to_vec())
            .with_file_name("evil.html")
            .with_content_type("image/png");
        assert_eq!(script.format(), None);
        assert_eq!(script.extension(), None);

        // Image bytes behind a foreign extension are refused too
        let disguised = ImagePayload::new(PNG_HEADER.to_vec()).with_file_name("evil.html");
        assert_eq!(disguised.declared_extension().as_deref(), Some("html"));
        assert_eq!(disguised.extension(), None);
    }

    #[test]
    fn test_empty_payload() {
        assert!(ImagePayload::default().is_empty());
        assert_eq!(ImagePayload::default().extension(), None);
        assert_eq!(ImagePayload::new(vec![1, 2, 3]).len(), 3);
    }
}
