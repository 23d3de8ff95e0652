//! `tokio_util::codec` adapter for the frame format.
//!
//! Use with `FramedRead`, `FramedWrite` or `Framed` to get a `Stream` of
//! payloads and a `Sink` of payloads over any `AsyncRead`/`AsyncWrite`.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{encode_frame, DecodeState, FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

/// Length-prefixed frame codec.
///
/// A zero or oversized prefix discards everything buffered and every later
/// decode returns [`FrameError::Aborted`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    decoder: FrameDecoder,
    max_payload_size: usize,
    failed: bool,
}

impl FrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a codec using the payload limit from `config`.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config.max_payload_size),
            max_payload_size: config.max_payload_size,
            failed: false,
        }
    }

    /// Current receive state.
    pub fn state(&self) -> DecodeState {
        self.decoder.state()
    }

    /// Whether a protocol violation has ended decoding.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn fail(&mut self, src: &mut BytesMut, err: FrameError) -> FrameError {
        warn!(error = %err, buffered = src.len(), "frame codec stopped");
        self.failed = true;
        src.clear();
        self.decoder.reset();
        err
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.failed {
            return Err(FrameError::Aborted);
        }
        match self.decoder.decode(src) {
            Ok(payload) => Ok(payload),
            Err(err) => Err(self.fail(src, err)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(payload) = self.decode(src)? {
            return Ok(Some(payload));
        }
        if src.is_empty() && self.decoder.state().is_idle() {
            return Ok(None);
        }
        Err(FrameError::ConnectionClosed {
            buffered: src.len(),
        })
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(payload, dst)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&[u8]>::encode(self, payload.as_ref(), dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn decode_eof_on_boundary_is_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        encode_frame(b"last", &mut buf).unwrap();

        let payload = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"last");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_eof_mid_frame_is_connection_closed() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x04, 0x00, 0x00, 0x00, b'a'][..]);

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed { buffered: 1 }));
    }

    #[test]
    fn encoder_enforces_limit() {
        let cfg = FrameConfig {
            max_payload_size: 2,
            ..FrameConfig::default()
        };
        let mut codec = FrameCodec::with_config(&cfg);
        let mut dst = BytesMut::new();

        let err = codec.encode(&b"abc"[..], &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(7);
        let mut sink = FramedWrite::new(client, FrameCodec::new());
        let mut stream = FramedRead::new(server, FrameCodec::new());

        let writer = tokio::spawn(async move {
            for payload in ["hi", "there", "framed"] {
                sink.send(Bytes::from_static(payload.as_bytes()))
                    .await
                    .unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(payload) = stream.next().await {
            seen.push(payload.unwrap());
            if seen.len() == 3 {
                break;
            }
        }
        writer.await.unwrap();

        assert_eq!(seen[0].as_ref(), b"hi");
        assert_eq!(seen[1].as_ref(), b"there");
        assert_eq!(seen[2].as_ref(), b"framed");
    }

    #[test]
    fn zero_prefix_discards_buffer_and_aborts() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0, 0, 0, 0, 0x02, 0x00, 0x00, 0x00, b'h', b'i'][..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ZeroLength));
        assert!(buf.is_empty());
        assert!(codec.is_failed());
        assert!(codec.state().is_idle());

        let mut more = BytesMut::new();
        encode_frame(b"later", &mut more).unwrap();
        assert!(matches!(codec.decode(&mut more), Err(FrameError::Aborted)));
        assert!(matches!(codec.decode_eof(&mut more), Err(FrameError::Aborted)));
    }

    #[test]
    fn oversized_prefix_discards_buffer() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut codec = FrameCodec::with_config(&cfg);
        let mut buf = BytesMut::new();
        encode_frame(b"too long", &mut buf).unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn zero_prefix_ends_stream_with_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, FrameCodec::new());

        client.write_all(&[0, 0, 0, 0]).await.unwrap();
        drop(client);

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(FrameError::ZeroLength)));
    }

    #[tokio::test]
    async fn truncated_stream_reports_connection_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, FrameCodec::new());

        client.write_all(&[0x09, 0x00, 0x00, 0x00, b'x']).await.unwrap();
        drop(client);

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(FrameError::ConnectionClosed { .. })));
    }
}
