//! On-disk layout of derived artifacts.
//!
//! ```text
//! <media-root>/videos/<video-id>/<rendition>/index.m3u8
//! <media-root>/videos/<video-id>/<rendition>/segmentNNN.ts
//! <media-root>/thumbnail/thumbnail_<video-id>.jpg
//! ```
//!
//! Paths are only ever built from a numeric video id and a profile from the
//! fixed rendition set, so nothing here can be steered outside the root.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::common::rendition::{RenditionProfile, SegmentName};

pub const PLAYLIST_FILE: &str = "index.m3u8";
pub const SEGMENT_PATTERN: &str = "segment%03d.ts";

pub const VIDEOS_DIR: &str = "videos";
pub const THUMBNAIL_DIR: &str = "thumbnail";
const THUMBNAIL_STAGING_SUFFIX: &str = ".part.jpg";

#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

/// What a [`ArtifactLayout::delete_tree`] call managed to remove.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Removal {
    Removed,
    Absent,
    Failed(io::Error),
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the top-level `videos/` and `thumbnail/` directories.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.videos_dir()).await?;
        tokio::fs::create_dir_all(self.thumbnail_dir()).await
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join(VIDEOS_DIR)
    }

    pub fn video_dir(&self, video_id: i64) -> PathBuf {
        self.videos_dir().join(video_id.to_string())
    }

    pub fn rendition_path(&self, video_id: i64, profile: &RenditionProfile) -> PathBuf {
        self.video_dir(video_id).join(profile.name)
    }

    /// Scratch directory an encoder writes into before the rendition is published.
    pub fn rendition_staging_path(&self, video_id: i64, profile: &RenditionProfile) -> PathBuf {
        self.video_dir(video_id)
            .join(format!(".{}.partial", profile.name))
    }

    pub fn playlist_path(&self, video_id: i64, profile: &RenditionProfile) -> PathBuf {
        self.rendition_path(video_id, profile).join(PLAYLIST_FILE)
    }

    pub fn segment_path(
        &self,
        video_id: i64,
        profile: &RenditionProfile,
        segment: &SegmentName,
    ) -> PathBuf {
        self.rendition_path(video_id, profile).join(segment.as_str())
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.root.join(THUMBNAIL_DIR)
    }

    pub fn thumbnail_path(&self, video_id: i64) -> PathBuf {
        self.root.join(Self::thumbnail_reference(video_id))
    }

    pub fn thumbnail_staging_path(&self, video_id: i64) -> PathBuf {
        self.thumbnail_dir()
            .join(format!("thumbnail_{video_id}{THUMBNAIL_STAGING_SUFFIX}"))
    }

    /// Media-root relative thumbnail path, as stored on the video row.
    pub fn thumbnail_reference(video_id: i64) -> String {
        format!("{THUMBNAIL_DIR}/thumbnail_{video_id}.jpg")
    }

    /// Media-root relative path for a freshly uploaded source file.
    ///
    /// The random prefix keeps uploads from colliding with each other or
    /// with the numeric per-video directories next to them.
    pub fn upload_reference(original_name: &str) -> String {
        let sanitized: String = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let sanitized = sanitized.trim_start_matches('.');
        let name = if sanitized.is_empty() { "video.mp4" } else { sanitized };

        format!("{VIDEOS_DIR}/{}_{name}", Uuid::new_v4().simple())
    }

    /// Splits a reference into the `(dir, file)` pair that `/media/<dir>/<file>`
    /// serves: one visible file directly below `videos/`, or a `.jpg` directly
    /// below `thumbnail/` that is not an in-flight staging file.
    pub fn served_reference(reference: &str) -> Option<(&str, &str)> {
        let (dir, file) = reference.split_once('/')?;
        let visible = !file.is_empty() && !file.starts_with('.') && !file.contains(['/', '\\']);
        let served = visible
            && match dir {
                VIDEOS_DIR => true,
                THUMBNAIL_DIR => {
                    file.ends_with(".jpg") && !file.ends_with(THUMBNAIL_STAGING_SUFFIX)
                }
                _ => false,
            };
        served.then_some((dir, file))
    }

    /// File behind a `/media/<dir>/<file>` request, if that name is servable.
    pub fn resolve_served(&self, dir: &str, file: &str) -> Option<PathBuf> {
        let reference = format!("{dir}/{file}");
        Self::served_reference(&reference)?;
        self.resolve(&reference)
    }

    /// Resolves a stored media-root relative reference. Absolute paths and
    /// references that climb out of the root resolve to `None`.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference);
        if reference.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Removes every artifact of one video: the rendition tree, the thumbnail
    /// (canonical path and stored reference) and the source upload if it is
    /// still around. Each removal stands alone; a failure is logged and the
    /// remaining removals still run. Missing artifacts are not an error.
    pub async fn delete_tree(
        &self,
        video_id: i64,
        source: Option<&Path>,
        thumbnail: Option<&str>,
    ) -> DeletionReport {
        let mut report = DeletionReport::default();

        let tree = self.video_dir(video_id);
        Self::record(&mut report, tree.clone(), remove_dir(&tree).await);

        let canonical = self.thumbnail_path(video_id);
        let mut thumbnails = vec![canonical];
        if let Some(stored) = thumbnail.and_then(|t| self.resolve(t)) {
            if !thumbnails.contains(&stored) {
                thumbnails.push(stored);
            }
        }
        thumbnails.push(self.thumbnail_staging_path(video_id));
        for path in thumbnails {
            let outcome = remove_file(&path).await;
            Self::record(&mut report, path, outcome);
        }

        if let Some(source) = source {
            let outcome = remove_file(source).await;
            Self::record(&mut report, source.to_path_buf(), outcome);
        }

        report
    }

    fn record(report: &mut DeletionReport, path: PathBuf, outcome: Removal) {
        match outcome {
            Removal::Removed => {
                debug!("Removed {}", path.display());
                report.removed.push(path);
            }
            Removal::Absent => {}
            Removal::Failed(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                report.failed.push(path);
            }
        }
    }
}

async fn remove_dir(path: &Path) -> Removal {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Removal::Removed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::Absent,
        Err(e) => Removal::Failed(e),
    }
}

async fn remove_file(path: &Path) -> Removal {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Removal::Removed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::Absent,
        Err(e) => Removal::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rendition::RENDITION_PROFILES;

    fn p720() -> &'static RenditionProfile {
        RenditionProfile::find("720p").unwrap()
    }

    #[test]
    fn only_top_level_media_files_are_served() {
        assert_eq!(
            ArtifactLayout::served_reference("thumbnail/custom.jpg"),
            Some(("thumbnail", "custom.jpg"))
        );
        assert_eq!(
            ArtifactLayout::served_reference("videos/abc_movie.mp4"),
            Some(("videos", "abc_movie.mp4"))
        );
        for reference in [
            "thumbnail/thumbnail_7.part.jpg",
            "thumbnail/poster.png",
            "thumbnail/.hidden.jpg",
            "videos/7/720p/index.m3u8",
            "posters/custom.jpg",
            "thumbnail/",
            "movie.mp4",
        ] {
            assert_eq!(ArtifactLayout::served_reference(reference), None, "{reference}");
        }

        let layout = ArtifactLayout::new("/srv/media");
        assert_eq!(
            layout.resolve_served("videos", "abc_movie.mp4"),
            Some(PathBuf::from("/srv/media/videos/abc_movie.mp4"))
        );
        assert_eq!(layout.resolve_served("videos", ".."), None);
    }

    #[test]
    fn paths_follow_the_published_layout() {
        let layout = ArtifactLayout::new("/srv/media");

        assert_eq!(
            layout.rendition_path(7, p720()),
            PathBuf::from("/srv/media/videos/7/720p")
        );
        assert_eq!(
            layout.playlist_path(7, p720()),
            PathBuf::from("/srv/media/videos/7/720p/index.m3u8")
        );
        let segment = SegmentName::parse("segment004.ts").unwrap();
        assert_eq!(
            layout.segment_path(7, p720(), &segment),
            PathBuf::from("/srv/media/videos/7/720p/segment004.ts")
        );
        assert_eq!(
            layout.thumbnail_path(7),
            PathBuf::from("/srv/media/thumbnail/thumbnail_7.jpg")
        );
        assert_eq!(ArtifactLayout::thumbnail_reference(7), "thumbnail/thumbnail_7.jpg");
    }

    #[test]
    fn staging_directories_are_hidden_siblings() {
        let layout = ArtifactLayout::new("/srv/media");
        let staging = layout.rendition_staging_path(7, p720());
        assert_eq!(staging, PathBuf::from("/srv/media/videos/7/.720p.partial"));
        assert_eq!(staging.parent(), layout.rendition_path(7, p720()).parent());
    }

    #[test]
    fn resolve_rejects_escaping_references() {
        let layout = ArtifactLayout::new("/srv/media");
        assert_eq!(
            layout.resolve("thumbnail/thumbnail_1.jpg"),
            Some(PathBuf::from("/srv/media/thumbnail/thumbnail_1.jpg"))
        );
        assert!(layout.resolve("../etc/passwd").is_none());
        assert!(layout.resolve("thumbnail/../../x").is_none());
        assert!(layout.resolve("/etc/passwd").is_none());
        assert!(layout.resolve("").is_none());
    }

    #[test]
    fn upload_reference_is_sanitized_and_unique() {
        let a = ArtifactLayout::upload_reference("../../my movie.mp4");
        let b = ArtifactLayout::upload_reference("../../my movie.mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("videos/"));
        assert!(a.ends_with("_my_movie.mp4"));
        assert!(!a.contains(".."));
        assert!(ArtifactLayout::upload_reference("").ends_with("_video.mp4"));
    }

    #[tokio::test]
    async fn delete_tree_removes_everything_it_finds() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        layout.ensure_dirs().await.unwrap();

        for profile in RENDITION_PROFILES.iter() {
            let rendition = layout.rendition_path(3, profile);
            tokio::fs::create_dir_all(&rendition).await.unwrap();
            tokio::fs::write(rendition.join(PLAYLIST_FILE), "#EXTM3U").await.unwrap();
        }
        tokio::fs::write(layout.thumbnail_path(3), b"jpg").await.unwrap();
        let source = dir.path().join("videos/source.mp4");
        tokio::fs::write(&source, b"mp4").await.unwrap();

        let report = layout
            .delete_tree(3, Some(&source), Some("thumbnail/thumbnail_3.jpg"))
            .await;

        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 3);
        assert!(!layout.video_dir(3).exists());
        assert!(!layout.thumbnail_path(3).exists());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn delete_tree_of_unknown_video_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());

        let report = layout.delete_tree(404, None, None).await;

        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[tokio::test]
    async fn one_missing_artifact_does_not_block_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        layout.ensure_dirs().await.unwrap();
        tokio::fs::write(layout.thumbnail_path(9), b"jpg").await.unwrap();
        let missing_source = dir.path().join("videos/gone.mp4");

        let report = layout.delete_tree(9, Some(&missing_source), None).await;

        assert!(report.is_clean());
        assert_eq!(report.removed, vec![layout.thumbnail_path(9)]);
    }
}
