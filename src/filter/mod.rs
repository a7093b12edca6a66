//! Client for the out-of-process AR filter.
//!
//! One long-lived TCP connection per pipeline, strict half-duplex: one
//! envelope out, one envelope back, one round trip in flight at a time.
//! Ordering is implicit in the alternation; there are no request ids.

mod envelope;

pub use envelope::{decode_envelope, encode_envelope};

use crate::error::ProtocolError;
use crate::pipeline::{Frame, FrameFilter};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Instant;

pub struct FilterChannel<S> {
    stream: S,
}

impl FilterChannel<TcpStream> {
    pub fn connect<A: ToSocketAddrs + std::fmt::Debug>(
        addr: A,
    ) -> std::io::Result<FilterChannel<TcpStream>> {
        log::info!("connecting to filter process at {addr:?}");
        let stream = TcpStream::connect(addr)?;
        // One small record per round trip; waiting out Nagle costs a tick.
        stream.set_nodelay(true)?;
        Ok(FilterChannel { stream })
    }
}

impl<S: Read + Write> FilterChannel<S> {
    pub fn new(stream: S) -> FilterChannel<S> {
        FilterChannel { stream }
    }

    /// Ship one frame to the filter and read back its replacement. The
    /// response keeps the request's timestamp.
    pub fn round_trip(&mut self, frame: &Frame) -> Result<Frame, ProtocolError> {
        let envelope = encode_envelope(frame)?;
        self.stream.write_all(&envelope)?;
        self.stream.flush()?;

        let image = decode_envelope(&mut self.stream)?;
        let (width, height) = (image.width() as usize, image.height() as usize);
        let mut filtered = Frame::rgba(width, height, image.into_raw());
        filtered.pts = frame.pts;
        Ok(filtered)
    }
}

impl<S: Read + Write + Send> FrameFilter for FilterChannel<S> {
    /// A failed round trip degrades one frame, never the stream: on any
    /// error, or a response with the wrong geometry, the original frame is
    /// passed through unchanged.
    fn apply(&mut self, frame: Frame) -> Frame {
        let started = Instant::now();
        match self.round_trip(&frame) {
            Ok(filtered) if filtered.width == frame.width && filtered.height == frame.height => {
                log::debug!("filter round trip took {:?}", started.elapsed());
                filtered
            }
            Ok(filtered) => {
                log::warn!(
                    "filter returned a {}x{} image for a {}x{} frame, passing the original through",
                    filtered.width,
                    filtered.height,
                    frame.width,
                    frame.height
                );
                frame
            }
            Err(e) => {
                log::warn!("filter round trip failed, passing the frame through unfiltered: {e}");
                frame
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Serves a canned response and records everything written to it.
    struct ScriptedStream {
        response: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.response.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn solid_frame(width: usize, height: usize, value: u8) -> Frame {
        let mut frame = Frame::rgba(width, height, vec![value; width * height * 4]);
        frame.pts = 7;
        frame
    }

    #[test]
    fn round_trip_sends_one_envelope_and_keeps_the_timestamp() {
        let reply = solid_frame(16, 16, 10);
        let stream = ScriptedStream {
            response: Cursor::new(encode_envelope(&reply).unwrap()),
            written: Vec::new(),
        };
        let mut channel = FilterChannel::new(stream);

        let request = solid_frame(16, 16, 200);
        let filtered = channel.round_trip(&request).unwrap();

        assert_eq!((filtered.width, filtered.height), (16, 16));
        assert_eq!(filtered.pts, request.pts);
        assert_eq!(channel.stream.written, encode_envelope(&request).unwrap());
    }

    #[test]
    fn closed_connection_passes_the_frame_through() {
        // The filter goes away before answering: write succeeds, the read
        // hits EOF immediately.
        let stream = ScriptedStream {
            response: Cursor::new(Vec::new()),
            written: Vec::new(),
        };
        let mut channel = FilterChannel::new(stream);

        let frame = solid_frame(8, 8, 42);
        let out = channel.apply(frame.clone());

        assert_eq!(out.data, frame.data);
        assert_eq!(out.pts, frame.pts);
    }

    #[test]
    fn wrong_geometry_passes_the_frame_through() {
        let reply = solid_frame(4, 4, 10);
        let stream = ScriptedStream {
            response: Cursor::new(encode_envelope(&reply).unwrap()),
            written: Vec::new(),
        };
        let mut channel = FilterChannel::new(stream);

        let frame = solid_frame(8, 8, 42);
        let out = channel.apply(frame.clone());

        assert_eq!((out.width, out.height), (8, 8));
        assert_eq!(out.data, frame.data);
    }
}
