use std::path::PathBuf;

/// How this process participates in a call.
pub enum Mode {
    /// Route signaling messages between the two participants.
    Relay(RelayConfig),
    /// Join the call, filter and send video.
    Call(CallConfig),
}

pub struct RelayConfig {
    pub listen_addr: String,
}

pub struct CallConfig {
    pub relay_url: String,
    pub filter_addr: String,
    /// Video input streamed into the call.
    pub source: PathBuf,
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
