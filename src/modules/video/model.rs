use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::Date;
use utoipa::ToSchema;

pub const DEFAULT_CATEGORY: &str = "action";

pub const CATEGORIES: [&str; 12] = [
    "action",
    "adventure",
    "comedy",
    "drama",
    "documentation",
    "horror",
    "sci-fi",
    "thriller",
    "western",
    "fantasy",
    "crime",
    "romance",
];

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, ToSchema)]
pub struct Video {
    pub id: i64,
    #[schema(value_type = String, format = Date)]
    pub created_at: Date,
    pub title: String,
    pub description: String,
    /// Source upload, relative to the media root.
    pub video_file: String,
    /// Generated thumbnail, relative to the media root.
    pub thumbnail: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub category: String,
    pub video_file: String,
    pub thumbnail: Option<String>,
}
