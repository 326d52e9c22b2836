//! Fan-talk aggregate
//!
//! A fan-talk is a short post a member leaves in an artist's channel,
//! optionally referencing a track and carrying one image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CommunityError;

/// Content of a fan-talk post.
///
/// # Invariants
/// - Content is never blank (checked in [`FantalkContent::new`])
/// - Fields cannot change after construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFantalkContent")]
pub struct FantalkContent {
    content: String,
    track_id: i32,
    image_url: Option<String>,
}

impl FantalkContent {
    pub fn new(
        content: impl Into<String>,
        track_id: i32,
        image_url: Option<String>,
    ) -> Result<Self, CommunityError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CommunityError::ContentRequired);
        }

        Ok(Self {
            content,
            track_id,
            image_url,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn track_id(&self) -> i32 {
        self.track_id
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

/// Unchecked wire form; deserialization goes through [`FantalkContent::new`]
#[derive(Deserialize)]
struct RawFantalkContent {
    content: String,
    track_id: i32,
    image_url: Option<String>,
}

impl TryFrom<RawFantalkContent> for FantalkContent {
    type Error = CommunityError;

    fn try_from(raw: RawFantalkContent) -> Result<Self, Self::Error> {
        FantalkContent::new(raw.content, raw.track_id, raw.image_url)
    }
}

/// Fan-talk post. `fantalk_id` is `None` until the store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fantalk {
    pub fantalk_id: Option<i32>,
    pub fantalk_channel_id: i32,
    pub member_id: i32,
    pub content: FantalkContent,
    pub created_at: DateTime<Utc>,
}

impl Fantalk {
    /// Build a new, not yet persisted fan-talk
    pub fn new(
        fantalk_channel_id: i32,
        member_id: i32,
        content: FantalkContent,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fantalk_id: None,
            fantalk_channel_id,
            member_id,
            content,
            created_at,
        }
    }

    /// Copy of this fan-talk carrying the store-assigned identity
    pub fn with_id(mut self, fantalk_id: i32) -> Self {
        self.fantalk_id = Some(fantalk_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_rejects_blank() {
        assert_eq!(
            FantalkContent::new("   ", 3, None),
            Err(CommunityError::ContentRequired)
        );
        assert_eq!(
            FantalkContent::new("", 3, None),
            Err(CommunityError::ContentRequired)
        );
    }

    #[test]
    fn test_content_equality_by_value() {
        let a = FantalkContent::new("hi", 3, Some("http://img/1.png".to_string())).unwrap();
        let b = FantalkContent::new("hi", 3, Some("http://img/1.png".to_string())).unwrap();
        let c = FantalkContent::new("hi", 3, None).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.image_url(), Some("http://img/1.png"));
        assert_eq!(c.image_url(), None);
    }

    #[test]
    fn test_deserialized_content_is_validated() {
        let content: FantalkContent =
            serde_json::from_value(serde_json::json!({ "content": "hi", "track_id": 3, "image_url": null }))
                .unwrap();
        assert_eq!(content, FantalkContent::new("hi", 3, None).unwrap());

        let blank = serde_json::from_value::<FantalkContent>(
            serde_json::json!({ "content": "  ", "track_id": 3, "image_url": null }),
        );
        assert!(blank.is_err());
    }

    #[test]
    fn test_new_fantalk_has_no_identity() {
        let content = FantalkContent::new("hi", 3, None).unwrap();
        let fantalk = Fantalk::new(1, 42, content, Utc::now());
        assert!(fantalk.fantalk_id.is_none());

        let persisted = fantalk.with_id(9);
        assert_eq!(persisted.fantalk_id, Some(9));
    }
}
