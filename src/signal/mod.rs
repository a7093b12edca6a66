//! Signaling: the relay wire format, the websocket bridge, and the
//! per-process session state machine.

mod channel;
mod machine;
mod session;

pub use channel::SignalChannel;
pub use machine::{SessionState, SignalingMachine};
pub use session::PeerSession;

use serde::{Deserialize, Serialize};

/// One signaling message as it travels through the relay.
///
/// The relay never interprets `content`: it is the SDP blob for
/// offer/answer, the candidate string for iceCandidate, and an arbitrary
/// truthy marker for join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum Signal {
    Join(String),
    Offer(String),
    Answer(String),
    IceCandidate(String),
}

impl Signal {
    pub fn join() -> Self {
        Signal::Join("true".to_string())
    }

    /// Message kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Join(_) => "join",
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::IceCandidate(_) => "iceCandidate",
        }
    }
}
