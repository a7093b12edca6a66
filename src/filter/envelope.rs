//! Frame transport codec for the filter-process socket.
//!
//! One envelope is a 4-byte big-endian length followed by exactly that many
//! bytes of JPEG data. Decoding is atomic: the caller gets a whole image or
//! an error, never a partially consumed record, because a half-read
//! envelope desynchronizes the stream permanently.

use crate::assets::{ENVELOPE_JPEG_QUALITY, MAX_ENVELOPE_BYTES};
use crate::error::ProtocolError;
use crate::pipeline::{Frame, PixelLayout};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbaImage};
use std::io::Read;

/// Compress an RGBA working frame into a length-prefixed envelope.
pub fn encode_envelope(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    if frame.layout != PixelLayout::Rgba {
        return Err(ProtocolError::WrongLayout { expected: "RGBA" });
    }

    // JPEG carries no alpha channel; strip it.
    let mut rgb = Vec::with_capacity(frame.width * frame.height * 3);
    for px in frame.data.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    let mut payload = Vec::new();
    JpegEncoder::new_with_quality(&mut payload, ENVELOPE_JPEG_QUALITY).encode(
        &rgb,
        frame.width as u32,
        frame.height as u32,
        image::ExtendedColorType::Rgb8,
    )?;

    let mut envelope = Vec::with_capacity(4 + payload.len());
    envelope.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    envelope.extend_from_slice(&payload);
    Ok(envelope)
}

/// Read exactly one envelope and decode its image.
///
/// Fails with [`ProtocolError`] if the stream closes mid-record or the
/// payload does not decode; on failure the connection must be considered
/// desynchronized and abandoned by the caller.
pub fn decode_envelope<R: Read>(reader: &mut R) -> Result<RgbaImage, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_ENVELOPE_BYTES {
        return Err(ProtocolError::Oversized(len, MAX_ENVELOPE_BYTES));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;

    let image = image::load_from_memory_with_format(&payload, ImageFormat::Jpeg)?;
    Ok(image.to_rgba8())
}
