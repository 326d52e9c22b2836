//! Album and track read models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub album_id: i32,
    pub album_title: String,
    /// Artist who released the album
    pub member_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: i32,
    pub album_id: i32,
    pub track_number: i32,
    pub track_title: String,
}
