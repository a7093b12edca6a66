use thiserror::Error;

/// Errors on one of the two wire protocols: the filter-process envelope
/// stream or the relay's JSON messages.
///
/// At the frame level these are recoverable (the pipeline falls back to the
/// unfiltered frame); at the relay-connection level they mean the
/// connection is lost.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("envelope stream closed mid-record")]
    Truncated(#[from] std::io::Error),
    #[error("envelope length {0} exceeds the {1} byte limit")]
    Oversized(u32, u32),
    #[error("envelope payload is not a decodable image")]
    BadPayload(#[from] image::ImageError),
    #[error("frame is not in the {expected} working layout")]
    WrongLayout { expected: &'static str },
    #[error("malformed relay message")]
    MalformedSignal(#[from] serde_json::Error),
}

/// Fatal session-negotiation failures. There is no retry and no
/// renegotiation: any of these terminates the process.
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("failed to reach the relay: {0}")]
    RelayConnect(#[from] async_tungstenite::tungstenite::Error),
    #[error("peer connection setup failed: {0}")]
    PeerSetup(#[source] webrtc::Error),
    #[error("session description rejected: {0}")]
    Sdp(#[source] webrtc::Error),
    #[error("relay channel closed before the session was established")]
    RelayClosed,
}

/// Fatal media-pipeline failures. Transient decode conditions ("no data
/// yet", end of stream) are not errors and are carried by
/// [`SourceStatus`](crate::pipeline::SourceStatus) instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("codec failure: {0}")]
    Codec(#[from] ac_ffmpeg::Error),
    #[error("no video stream in source")]
    NoVideoStream,
    #[error("no usable H.264 encoder found")]
    NoEncoder,
    #[error("failed to open source: {0}")]
    SourceOpen(#[from] std::io::Error),
    #[error("sink rejected sample: {0}")]
    Sink(#[source] webrtc::Error),
}
