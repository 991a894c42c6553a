use serde::Serialize;

/// One fixed-quality HLS output of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenditionProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Target video bitrate in ffmpeg notation.
    pub video_bitrate: &'static str,
}

impl RenditionProfile {
    pub fn scale(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Looks a rendition up by its directory name. Unknown names yield `None`.
    pub fn find(name: &str) -> Option<&'static RenditionProfile> {
        RENDITION_PROFILES.iter().find(|p| p.name == name)
    }
}

pub const AUDIO_BITRATE: &str = "128k";

/// Every transcode produces exactly these renditions, in this order.
pub static RENDITION_PROFILES: [RenditionProfile; 3] = [
    RenditionProfile {
        name: "480p",
        width: 850,
        height: 480,
        video_bitrate: "1000k",
    },
    RenditionProfile {
        name: "720p",
        width: 1280,
        height: 720,
        video_bitrate: "2500k",
    },
    RenditionProfile {
        name: "1080p",
        width: 1920,
        height: 1080,
        video_bitrate: "5000k",
    },
];

/// A validated HLS segment file name (`[A-Za-z0-9_-]{1,64}.ts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName(String);

impl SegmentName {
    pub const EXTENSION: &'static str = ".ts";

    pub fn parse(raw: &str) -> Option<Self> {
        let stem = raw.strip_suffix(Self::EXTENSION)?;
        let valid = !stem.is_empty()
            && stem.len() <= 64
            && stem
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
