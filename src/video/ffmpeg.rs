//! FFmpeg-backed local video files.
//!
//! Metadata comes from the best video stream. Frame reads seek to the nearest
//! preceding keyframe and decode forward until the requested frame index.

use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::VideoMetadata;
use crate::error::{Result, RoiError};

/// Microseconds per second, the unit of container-level seeks.
const AV_TIME_BASE: f64 = 1_000_000.0;

pub(crate) struct FfmpegVideo {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    metadata: VideoMetadata,
}

impl FfmpegVideo {
    pub(crate) fn open(path: &str) -> Result<Self> {
        let fail = |reason: String| RoiError::VideoOpen {
            path: path.to_string(),
            reason,
        };
        ffmpeg::init().map_err(|e| fail(format!("initialize ffmpeg: {e}")))?;
        let input = ffmpeg::format::input(&path).map_err(|e| fail(e.to_string()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| fail("file has no video track".to_string()))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let fps = f64::from(stream.avg_frame_rate());
        let declared_frames = stream.frames();
        let duration_secs = if stream.duration() > 0 {
            stream.duration() as f64 * time_base
        } else {
            input.duration() as f64 / AV_TIME_BASE
        };

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| fail(format!("load decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| fail(format!("open video decoder: {e}")))?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| fail(format!("create scaler: {e}")))?;

        let total_frames = if declared_frames > 0 {
            declared_frames as usize
        } else {
            (duration_secs * fps).round().max(0.0) as usize
        };
        let metadata = VideoMetadata {
            total_frames,
            fps,
            width: decoder.width(),
            height: decoder.height(),
        };

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            metadata,
        })
    }

    pub(crate) fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    pub(crate) fn read_frame(&mut self, index: usize) -> Result<RgbImage> {
        let path = self.path.clone();
        let fail = move |reason: String| RoiError::VideoFrame {
            path: path.clone(),
            index,
            reason,
        };

        let target_ts = (index as f64 / self.metadata.fps * AV_TIME_BASE) as i64;
        self.input
            .seek(target_ts, ..=target_ts)
            .map_err(|e| fail(format!("seek: {e}")))?;
        self.decoder.flush();

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| fail(format!("send packet to decoder: {e}")))?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let position = decoded
                    .timestamp()
                    .map(|ts| (ts as f64 * self.time_base * self.metadata.fps).round() as i64)
                    .unwrap_or(index as i64);
                if position < index as i64 {
                    continue;
                }
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(|e| fail(format!("scale frame to RGB: {e}")))?;
                return frame_to_image(&rgb_frame).ok_or_else(|| {
                    fail("decoded frame does not match its reported size".to_string())
                });
            }
        }

        Err(fail("video ended before the requested frame".to_string()))
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Option<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)?.to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(data.get(start..start + row_bytes)?);
        }
        pixels
    };
    RgbImage::from_raw(width, height, pixels)
}
