//! Video metadata and frame access.
//!
//! Two backends sit behind [`VideoFile`]:
//! - `stub://<name>?fps=..&frames=..&width=..&height=..` is a synthetic video
//!   with the given metadata and generated pixels, for tests and dry runs
//! - any other local path is decoded with FFmpeg (feature: video-ffmpeg)
//!
//! The engine itself only needs metadata; [`VideoProbe`] is the seam batch
//! runs use so they can be driven without touching real files.

#[cfg(feature = "video-ffmpeg")]
pub(crate) mod ffmpeg;

use image::RgbImage;

use crate::error::{Result, RoiError};
use crate::geometry::Size;
#[cfg(feature = "video-ffmpeg")]
use self::ffmpeg::FfmpegVideo;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_FPS: f64 = 30.0;
const DEFAULT_STUB_FRAMES: usize = 300;
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoMetadata {
    pub total_frames: usize,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    /// Seconds per frame.
    pub fn frame_duration(&self) -> f64 {
        1.0 / self.fps
    }

    fn validate(&self, path: &str) -> Result<()> {
        let reason = if !self.fps.is_finite() || self.fps <= 0.0 {
            Some(format!("frame rate must be positive, got {}", self.fps))
        } else if self.width == 0 || self.height == 0 {
            Some(format!("frame size {}x{} is empty", self.width, self.height))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(RoiError::VideoOpen {
                path: path.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Opens a video by path and reports its metadata.
pub trait VideoProbe: Sync {
    fn probe(&self, path: &str) -> Result<VideoMetadata>;
}

/// Probe backed by [`VideoFile::open`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileVideoProbe;

impl VideoProbe for FileVideoProbe {
    fn probe(&self, path: &str) -> Result<VideoMetadata> {
        Ok(VideoFile::open(path)?.metadata())
    }
}

/// An opened video.
pub struct VideoFile {
    path: String,
    metadata: VideoMetadata,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic,
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoFile {
    pub fn open(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(open_error(path, "empty path"));
        }
        if let Some(locator) = path.strip_prefix(STUB_SCHEME) {
            let metadata = parse_stub(path, locator)?;
            metadata.validate(path)?;
            log::debug!("opened {} (synthetic)", path);
            return Ok(Self {
                path: path.to_string(),
                metadata,
                backend: VideoBackend::Synthetic,
            });
        }
        if path.contains("://") {
            return Err(open_error(path, "only local files are supported"));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            let video = FfmpegVideo::open(path)?;
            let metadata = video.metadata();
            metadata.validate(path)?;
            log::debug!("opened {} (ffmpeg)", path);
            Ok(Self {
                path: path.to_string(),
                metadata,
                backend: VideoBackend::Ffmpeg(video),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(open_error(
                path,
                "decoding video files requires the video-ffmpeg feature",
            ))
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    /// Decode the frame at `index`.
    pub fn read_frame(&mut self, index: usize) -> Result<RgbImage> {
        if index >= self.metadata.total_frames {
            return Err(RoiError::VideoFrame {
                path: self.path.clone(),
                index,
                reason: format!("video has {} frames", self.metadata.total_frames),
            });
        }
        match &mut self.backend {
            VideoBackend::Synthetic => Ok(synthetic_frame(&self.metadata, index)),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.read_frame(index),
        }
    }
}

fn open_error(path: &str, reason: impl Into<String>) -> RoiError {
    RoiError::VideoOpen {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn parse_stub(path: &str, locator: &str) -> Result<VideoMetadata> {
    let mut metadata = VideoMetadata {
        total_frames: DEFAULT_STUB_FRAMES,
        fps: DEFAULT_STUB_FPS,
        width: DEFAULT_STUB_WIDTH,
        height: DEFAULT_STUB_HEIGHT,
    };
    let Some((_, query)) = locator.split_once('?') else {
        return Ok(metadata);
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| open_error(path, format!("malformed parameter '{}'", pair)))?;
        let bad = || open_error(path, format!("invalid value for {}: '{}'", key, value));
        match key {
            "fps" => metadata.fps = value.parse().map_err(|_| bad())?,
            "frames" => metadata.total_frames = value.parse().map_err(|_| bad())?,
            "width" => metadata.width = value.parse().map_err(|_| bad())?,
            "height" => metadata.height = value.parse().map_err(|_| bad())?,
            other => return Err(open_error(path, format!("unknown parameter '{}'", other))),
        }
    }
    Ok(metadata)
}

fn synthetic_frame(metadata: &VideoMetadata, index: usize) -> RgbImage {
    let shift = (index % 256) as u32;
    RgbImage::from_fn(metadata.width, metadata.height, |x, y| {
        image::Rgb([
            ((x + shift) % 256) as u8,
            ((y + shift) % 256) as u8,
            (shift % 256) as u8,
        ])
    })
}
