use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;

use crate::common::rendition::RenditionProfile;

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// External transcoding tool. Every call blocks its caller until the tool
/// exits; a non-zero exit is always an error.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Grabs one frame `offset` into `source`, scaled to `width` with the
    /// aspect ratio kept, and writes it as a JPEG to `output`.
    ///
    /// If `source` is shorter than `offset` ffmpeg still exits 0 but writes
    /// nothing; callers have to check that `output` exists afterwards.
    async fn extract_frame(
        &self,
        source: &Path,
        offset: &str,
        width: u32,
        output: &Path,
    ) -> Result<(), EncodeError>;

    /// Encodes one rendition of `source` as an HLS playlist at `playlist`,
    /// with segments written next to it.
    async fn transcode_hls(
        &self,
        source: &Path,
        profile: &RenditionProfile,
        segment_seconds: u32,
        playlist: &Path,
    ) -> Result<(), EncodeError>;
}
