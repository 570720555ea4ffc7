//! WordPress REST API (`/wp-json/wp/v2`) schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WpPostRequest {
    pub title: String,
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// `draft`, `publish`, `pending`, `private` or `future`.
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub categories: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpPost {
    pub id: u64,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpMedia {
    pub id: u64,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// `{ "code": "rest_post_invalid_id", "message": "...", "data": { "status": 404 } }`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WpErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}
