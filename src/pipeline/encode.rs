use crate::error::PipelineError;
use crate::pipeline::SampleEncoder;
use crate::pipeline::types::{EncodedSample, Frame, PixelLayout};
use ac_ffmpeg::codec::Encoder;
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{self, VideoEncoder, VideoFrameMut};
use ac_ffmpeg::time::{TimeBase, Timestamp};
use bytes::Bytes;
use std::time::Duration;

/// Encoder fallback chain: hardware first, software always last.
/// Tuned for low-latency call video, not archival quality.
const ENCODER_CHAIN: &[(&str, &[(&str, &str)])] = &[
    (
        "h264_nvenc",
        &[
            ("preset", "p2"),
            ("tune", "ll"),
            ("zerolatency", "1"),
            ("rc", "vbr"),
            ("b", "1200000"),
            ("maxrate", "2000000"),
            ("bufsize", "2400000"),
            ("g", "100"),
            ("delay", "0"),
        ],
    ),
    (
        "libx264",
        &[
            ("preset", "veryfast"),
            ("tune", "zerolatency"),
            ("profile", "baseline"),
            ("crf", "23"),
            ("g", "100"),
            ("threads", "0"),
        ],
    ),
];

fn encoder_time_base() -> TimeBase {
    TimeBase::new(1, 90_000)
}

/// H.264 encoder behind the pipeline's [`SampleEncoder`] seam.
///
/// The RGBA→YUV420P converter and the codec context are created lazily on
/// the first frame, once the working geometry is known. One pushed frame
/// yields zero or more encoded packets; each becomes its own sample
/// carrying the frame's pts and the fixed tick duration.
pub struct FfmpegEncoder {
    inner: Option<Inner>,
    tick: Duration,
    pts_step: i64,
}

struct Inner {
    to_yuv: VideoFrameScaler,
    encoder: VideoEncoder,
    width: usize,
    height: usize,
}

// The FFmpeg contexts are used from one task at a time.
unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    pub fn new(tick: Duration) -> FfmpegEncoder {
        FfmpegEncoder {
            inner: None,
            tick,
            pts_step: (tick.as_micros() as i64 * 90) / 1000,
        }
    }

    fn init(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        // H.264 requires even dimensions; an odd edge row or column is
        // shaved off by the converter.
        let width = frame.width & !1;
        let height = frame.height & !1;

        let pixel_format = video::frame::get_pixel_format("yuv420p");

        let to_yuv = VideoFrameScaler::builder()
            .source_pixel_format(video::frame::get_pixel_format("rgba"))
            .source_width(frame.width)
            .source_height(frame.height)
            .target_pixel_format(pixel_format)
            .target_width(width)
            .target_height(height)
            .algorithm(Algorithm::Bilinear)
            .build()?;

        let (encoder, codec_name) = try_create_encoder(width, height, pixel_format)?;
        log::info!("using encoder: {codec_name} ({width}x{height})");

        self.inner = Some(Inner {
            to_yuv,
            encoder,
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }
}

fn try_create_encoder(
    width: usize,
    height: usize,
    pixel_format: video::frame::PixelFormat,
) -> Result<(VideoEncoder, &'static str), PipelineError> {
    for (codec, options) in ENCODER_CHAIN {
        let mut builder = match VideoEncoder::builder(codec) {
            Ok(builder) => builder,
            Err(e) => {
                log::debug!("encoder {codec} not available, skipping: {e}");
                continue;
            }
        };
        builder = builder
            .pixel_format(pixel_format)
            .width(width)
            .height(height)
            .time_base(encoder_time_base());
        for (k, v) in *options {
            builder = builder.set_option(k, v);
        }
        match builder.build() {
            Ok(encoder) => return Ok((encoder, *codec)),
            Err(e) => log::debug!("encoder {codec} failed to initialize: {e}"),
        }
    }
    Err(PipelineError::NoEncoder)
}

impl SampleEncoder for FfmpegEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Vec<EncodedSample>, PipelineError> {
        debug_assert_eq!(frame.layout, PixelLayout::Rgba);

        if self.inner.is_none() {
            self.init(frame)?;
        }
        let pts_step = self.pts_step;
        let tick = self.tick;
        let inner = self.inner.as_mut().expect("encoder just initialized");

        let mut rgba =
            VideoFrameMut::black(video::frame::get_pixel_format("rgba"), inner.width, inner.height);
        {
            let mut planes = rgba.planes_mut();
            let plane = planes[0].data_mut();
            let line_size = plane.len() / inner.height;
            fill_plane(plane, &frame.data, inner.width * 4, line_size, inner.height);
        }
        let rgba = rgba
            .with_pts(Timestamp::new(frame.pts * pts_step, encoder_time_base()))
            .freeze();

        let yuv = inner.to_yuv.scale(&rgba)?;
        inner.encoder.push(yuv)?;

        let mut samples = Vec::new();
        while let Some(packet) = inner.encoder.take()? {
            samples.push(EncodedSample {
                data: Bytes::copy_from_slice(packet.data()),
                pts: frame.pts,
                duration: tick,
            });
        }
        Ok(samples)
    }
}

/// Copy contiguous source rows into a possibly stride-padded plane.
fn fill_plane(dst: &mut [u8], src: &[u8], width: usize, line_size: usize, height: usize) {
    if line_size == width && dst.len() >= width * height && src.len() >= width * height {
        dst[..width * height].copy_from_slice(&src[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * width;
        let dst_start = r * line_size;
        if src_start + width > src.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&src[src_start..src_start + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_plane_adds_stride_padding() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 12];
        fill_plane(&mut dst, &src, 4, 6, 2);
        assert_eq!(dst, [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0]);
    }

    #[test]
    fn pts_step_matches_the_tick() {
        let encoder = FfmpegEncoder::new(Duration::from_millis(20));
        // 20 ms in a 1/90000 time base.
        assert_eq!(encoder.pts_step, 1800);
    }
}
