//! Length-prefixed message framing over duplex byte streams.
//!
//! Every message travels as a 4-byte little-endian length followed by that
//! many payload bytes. Lengths are always greater than zero. There is no
//! magic number, version byte or checksum.
//!
//! Three ways to consume frames, all built on the same [`FrameDecoder`]:
//! - [`Framer`]: push bytes in (or let it pump its input) and get callbacks
//! - [`FrameReader`]: blocking pull of one payload at a time
//! - `FrameCodec` (feature `async`): `tokio_util` codec for `FramedRead`/`FramedWrite`

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{
    encode_frame, encoded_len, DecodeState, FrameConfig, FrameDecoder, MAX_PAYLOAD, PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use framer::{Framer, FramerStats, Pump, RecvHandler, SendHandler};
pub use reader::{FrameReader, Frames};
pub use writer::FrameWriter;
