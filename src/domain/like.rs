//! Like records for albums and tracks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a like points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeTarget {
    Album,
    Track,
}

impl LikeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeTarget::Album => "album",
            LikeTarget::Track => "track",
        }
    }
}

impl std::fmt::Display for LikeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's like on an album or track.
///
/// There is one record per (target, target_id, member_id); toggling flips
/// `liked` rather than inserting a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub target: LikeTarget,
    pub target_id: i32,
    pub member_id: i32,
    pub liked: bool,
    pub updated_at: DateTime<Utc>,
}

impl Like {
    pub fn new(target: LikeTarget, target_id: i32, member_id: i32, liked: bool) -> Self {
        Self {
            target,
            target_id,
            member_id,
            liked,
            updated_at: Utc::now(),
        }
    }

    /// Key identifying the record this like replaces
    pub fn key(&self) -> (LikeTarget, i32, i32) {
        (self.target, self.target_id, self.member_id)
    }
}
