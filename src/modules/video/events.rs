use std::path::PathBuf;

use super::model::Video;
use crate::infrastructure::storage::layout::ArtifactLayout;

/// A video row was just inserted.
#[derive(Debug, Clone)]
pub struct VideoCreated {
    pub id: i64,
    pub source: PathBuf,
    pub has_thumbnail: bool,
}

impl VideoCreated {
    /// `None` when the row carries no usable source reference.
    pub fn from_video(video: &Video, layout: &ArtifactLayout) -> Option<Self> {
        let source = layout.resolve(&video.video_file)?;
        Some(Self {
            id: video.id,
            source,
            has_thumbnail: video.thumbnail.is_some(),
        })
    }
}

/// A video row was just deleted. Carries everything needed to find its
/// artifacts, since the row itself is gone.
#[derive(Debug, Clone)]
pub struct VideoDeleted {
    pub id: i64,
    pub source: Option<PathBuf>,
    pub thumbnail: Option<String>,
}

impl VideoDeleted {
    pub fn from_video(video: &Video, layout: &ArtifactLayout) -> Self {
        Self {
            id: video.id,
            source: layout.resolve(&video.video_file),
            thumbnail: video.thumbnail.clone(),
        }
    }
}
