use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{EncodeError, Encoder};
use crate::common::rendition::{AUDIO_BITRATE, RenditionProfile};
use crate::infrastructure::storage::layout::SEGMENT_PATTERN;

/// Keep only the end of stderr; ffmpeg prints the actual failure last.
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn frame_args(source: &Path, offset: &str, width: u32, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-ss".into(),
            offset.into(),
            "-i".into(),
            source.into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={width}:-1").into(),
            output.into(),
        ]
    }

    fn hls_args(
        source: &Path,
        profile: &RenditionProfile,
        segment_seconds: u32,
        playlist: &Path,
    ) -> Vec<OsString> {
        let segment_file = playlist.with_file_name(SEGMENT_PATTERN);
        vec![
            "-y".into(),
            "-i".into(),
            source.into(),
            "-vf".into(),
            format!("scale={}", profile.scale()).into(),
            "-c:v".into(),
            "libx264".into(),
            "-b:v".into(),
            profile.video_bitrate.into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            AUDIO_BITRATE.into(),
            "-start_number".into(),
            "0".into(),
            "-hls_time".into(),
            segment_seconds.to_string().into(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            segment_file.into(),
            "-f".into(),
            "hls".into(),
            playlist.into(),
        ]
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), EncodeError> {
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail_start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_TAIL.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Err(EncodeError::NonZeroExit {
            program: self.program.clone(),
            status: output.status,
            stderr: stderr[tail_start..].trim().to_string(),
        })
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn extract_frame(
        &self,
        source: &Path,
        offset: &str,
        width: u32,
        output: &Path,
    ) -> Result<(), EncodeError> {
        self.run(Self::frame_args(source, offset, width, output))
            .await
    }

    async fn transcode_hls(
        &self,
        source: &Path,
        profile: &RenditionProfile,
        segment_seconds: u32,
        playlist: &Path,
    ) -> Result<(), EncodeError> {
        self.run(Self::hls_args(source, profile, segment_seconds, playlist))
            .await
    }
}
