use crate::error::PipelineError;
use crate::pipeline::types::{Frame, SourceStatus};
use crate::pipeline::FrameSource;
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{self, VideoDecoder, VideoFrame};
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use std::fs::File;
use std::path::Path;

/// Demuxing, decoding video source.
///
/// Opens the container, picks the first video stream and decodes it frame
/// by frame into the pipeline's RGBA working layout. The native→RGBA
/// converter is built lazily on the first frame, once the input geometry is
/// known. All FFmpeg contexts are released on drop, whichever way the
/// pipeline exits.
pub struct FfmpegSource {
    demuxer: DemuxerWithStreamInfo<File>,
    decoder: VideoDecoder,
    stream_index: usize,
    to_rgba: Option<VideoFrameScaler>,
    /// Reusable buffer for the packed RGBA output.
    packed_buffer: Vec<u8>,
    flushed: bool,
}

// The FFmpeg contexts are used from one task at a time.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FfmpegSource, PipelineError> {
        let input = File::open(&path)?;
        let io = IO::from_seekable_read_stream(input);

        let demuxer = Demuxer::builder()
            .build(io)?
            .find_stream_info(None)
            .map_err(|(_, err)| err)?;

        let (stream_index, params) = demuxer
            .streams()
            .iter()
            .map(|stream| stream.codec_parameters())
            .enumerate()
            .find(|(_, params)| params.is_video_codec())
            .ok_or(PipelineError::NoVideoStream)?;

        let video_params = params
            .into_video_codec_parameters()
            .ok_or(PipelineError::NoVideoStream)?;

        let decoder = VideoDecoder::from_codec_parameters(&video_params)?.build()?;

        log::info!(
            "source opened: {} {}x{}",
            path.as_ref().display(),
            video_params.width(),
            video_params.height()
        );

        Ok(FfmpegSource {
            demuxer,
            decoder,
            stream_index,
            to_rgba: None,
            packed_buffer: Vec::new(),
            flushed: false,
        })
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<Frame, PipelineError> {
        let (width, height) = (frame.width(), frame.height());

        if self.to_rgba.is_none() {
            self.to_rgba = Some(
                VideoFrameScaler::builder()
                    .source_pixel_format(frame.pixel_format())
                    .source_width(width)
                    .source_height(height)
                    .target_pixel_format(video::frame::get_pixel_format("rgba"))
                    .target_width(width)
                    .target_height(height)
                    .algorithm(Algorithm::Bilinear)
                    .build()?,
            );
        }
        let scaler = self.to_rgba.as_mut().expect("converter just built");

        let rgba = scaler.scale(frame)?;
        let planes = rgba.planes();
        let row = width * 4;

        self.packed_buffer.resize(row * height, 0);
        extract_plane(
            &mut self.packed_buffer,
            planes[0].data(),
            planes[0].line_size(),
            row,
            height,
        );

        Ok(Frame::rgba(width, height, self.packed_buffer.clone()))
    }
}

impl FrameSource for FfmpegSource {
    fn poll_frame(&mut self) -> Result<SourceStatus, PipelineError> {
        loop {
            if let Some(frame) = self.decoder.take()? {
                return Ok(SourceStatus::Ready(self.convert(&frame)?));
            }

            if self.flushed {
                return Ok(SourceStatus::Exhausted);
            }

            match self.demuxer.take()? {
                Some(packet) if packet.stream_index() == self.stream_index => {
                    self.decoder.push(packet)?;
                }
                Some(_) => continue,
                None => {
                    // Container drained; flush and hand out what the
                    // decoder still buffers.
                    self.decoder.flush()?;
                    self.flushed = true;
                }
            }
        }
    }
}

/// Copy a possibly stride-padded plane into a contiguous destination.
///
/// Fast path when there is no padding, row-by-row copy otherwise.
fn extract_plane(dst: &mut [u8], src: &[u8], stride: usize, width: usize, height: usize) {
    if stride == width && src.len() >= width * height {
        dst.copy_from_slice(&src[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * width;
        if src_start + width > src.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&src[src_start..src_start + width]);
    }
}
