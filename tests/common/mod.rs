#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use tempfile::TempDir;
use uuid::Uuid;

use videoflix_backend::common::rendition::RenditionProfile;
use videoflix_backend::config::settings::AppConfig;
use videoflix_backend::infrastructure::encoder::{EncodeError, Encoder};
use videoflix_backend::middleware::auth::{ADMIN_ROLE, TokenClaims};
use videoflix_backend::modules::video::model::{NewVideo, Video};
use videoflix_backend::modules::video::repository::MemoryVideoStore;
use videoflix_backend::state::AppState;

pub const SECRET: &str = "test-secret";
pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg";

pub fn playlist_for(profile: &RenditionProfile) -> String {
    format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:5\n#EXTINF:5.0,\nsegment000.ts\n#EXT-X-ENDLIST\n# {}\n",
        profile.scale()
    )
}

pub fn segment_bytes(profile: &RenditionProfile) -> Vec<u8> {
    format!("TS-{}", profile.name).into_bytes()
}

/// Stand-in for ffmpeg: writes a small playlist, one segment and a JPEG.
#[derive(Default)]
pub struct FakeEncoder {
    failing_renditions: HashSet<&'static str>,
    skip_frame: bool,
    fail_frame: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, rendition: &'static str) -> Self {
        self.failing_renditions.insert(rendition);
        self
    }

    /// Exit cleanly without writing a frame, like a seek past the end.
    pub fn without_frames(mut self) -> Self {
        self.skip_frame = true;
        self
    }

    /// Leave a truncated frame behind and exit non-zero.
    pub fn failing_frames(mut self) -> Self {
        self.fail_frame = true;
        self
    }

    /// Slows down every call; failing renditions still fail right away.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn exit_failure(&self) -> EncodeError {
        EncodeError::NonZeroExit {
            program: "fake-ffmpeg".to_string(),
            status: failed_status(),
            stderr: "Conversion failed!".to_string(),
        }
    }
}

#[cfg(unix)]
fn failed_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1 << 8)
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn extract_frame(
        &self,
        source: &Path,
        _offset: &str,
        _width: u32,
        output: &Path,
    ) -> Result<(), EncodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("frame:{}", source.display()));
        if self.fail_frame {
            tokio::fs::write(output, b"\xFF\xD8").await.unwrap();
            return Err(self.exit_failure());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.skip_frame {
            tokio::fs::write(output, JPEG_BYTES).await.unwrap();
        }
        Ok(())
    }

    async fn transcode_hls(
        &self,
        source: &Path,
        profile: &RenditionProfile,
        _segment_seconds: u32,
        playlist: &Path,
    ) -> Result<(), EncodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("hls:{}:{}", profile.name, source.display()));
        assert!(tokio::fs::metadata(source).await.is_ok(), "source must exist while encoding");

        let dir = playlist.parent().unwrap();
        if self.failing_renditions.contains(profile.name) {
            // Leave some debris behind like a crashed encoder would.
            tokio::fs::write(dir.join("segment000.ts"), b"partial").await.unwrap();
            return Err(self.exit_failure());
        }

        tokio::fs::write(dir.join("segment000.ts"), segment_bytes(profile))
            .await
            .unwrap();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        tokio::fs::write(playlist, playlist_for(profile)).await.unwrap();
        Ok(())
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub store: Arc<MemoryVideoStore>,
    pub encoder: Arc<FakeEncoder>,
}

impl TestApp {
    pub async fn start(encoder: FakeEncoder) -> Self {
        Self::start_with(encoder, |_| {}).await
    }

    pub async fn start_with(encoder: FakeEncoder, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_media_root(dir.path(), SECRET).unwrap();
        config.worker_count = 4;
        configure(&mut config);

        let store = Arc::new(MemoryVideoStore::new());
        let encoder = Arc::new(encoder);
        let state = AppState::build(config, store.clone(), encoder.clone(), None)
            .await
            .unwrap();

        Self {
            dir,
            state,
            store,
            encoder,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Writes a fake upload below `videos/` and returns its stored reference.
    pub async fn write_source(&self, name: &str) -> String {
        let reference = format!("videos/{name}");
        tokio::fs::write(self.path(&reference), b"fake-mp4").await.unwrap();
        reference
    }

    pub async fn insert_video(&self, id: i64, video_file: &str) -> Video {
        self.store
            .insert_with_id(
                id,
                NewVideo {
                    title: format!("Video {id}"),
                    description: "Test video".to_string(),
                    category: "drama".to_string(),
                    video_file: video_file.to_string(),
                    thumbnail: None,
                },
            )
            .await
    }

    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.state.pipeline.queue().wait_idle())
            .await
            .expect("job queue did not drain");
    }
}

pub fn token_with_role(role: &str) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
    let claims = TokenClaims {
        sub: Uuid::new_v4(),
        role: role.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn user_token() -> String {
    token_with_role("USER")
}

pub fn admin_token() -> String {
    token_with_role(ADMIN_ROLE)
}
