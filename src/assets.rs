use std::time::Duration;

/// Cadence of the outgoing video pipeline. Samples are emitted with this
/// fixed duration regardless of the source frame rate.
pub const FRAME_TICK: Duration = Duration::from_millis(20);

// connections
pub const RELAY_SERVICE_PORT: u16 = 8080;
pub const DEFAULT_RELAY_ADDR: &str = "ws://127.0.0.1:8080";
pub const DEFAULT_FILTER_ADDR: &str = "127.0.0.1:5005";

pub const STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

/// Upper bound for a single filter envelope payload. Anything larger is a
/// desynchronized or hostile stream, not a frame.
pub const MAX_ENVELOPE_BYTES: u32 = 16 * 1024 * 1024;

/// JPEG quality for frames shipped to the filter process.
pub const ENVELOPE_JPEG_QUALITY: u8 = 80;
