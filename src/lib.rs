//! arcall: a two-participant video call that pushes every outgoing frame
//! through an out-of-process AR filter before it reaches the wire.
//!
//! The crate is organized leaf-first the way a frame travels:
//! [`filter`] speaks the length-prefixed envelope protocol to the filter
//! process, [`pipeline`] runs the paced decode→filter→encode loop,
//! [`signal`] negotiates the one peer session per process, and [`relay`]
//! is the message router the two participants meet through.

pub mod assets;
pub mod call;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod relay;
pub mod signal;
