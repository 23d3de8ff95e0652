//! Whole-message exchange over pipes and sockets.
//!
//! duplexframe turns a duplex byte stream into a sequence of discrete
//! messages using a 4-byte little-endian length prefix.
//!
//! # Crate Structure
//!
//! - [`transport`]: Duplex endpoints (Unix sockets, child stdio, reader/writer pairs)
//! - [`frame`]: The framing codec, push-based `Framer`, blocking reader/writer,
//!   and (behind `async`) a `tokio_util` codec

/// Re-export transport types.
pub mod transport {
    pub use duplexframe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use duplexframe_frame::*;
}
