use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix: u32, little-endian.
pub const PREFIX_SIZE: usize = 4;

/// Largest payload the wire format can describe.
pub const MAX_PAYLOAD: usize = u32::MAX as usize;

/// Number of bytes `payload_len` bytes of payload occupy on the wire.
pub fn encoded_len(payload_len: usize) -> usize {
    PREFIX_SIZE + payload_len
}

/// Encode one payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────────┐
/// │ Length N (4B LE) │ Payload (N bytes)    │
/// │ N > 0            │                      │
/// └──────────────────┴──────────────────────┘
/// ```
///
/// Frames are written back to back with nothing in between.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(encoded_len(payload.len()));
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Where the decoder is in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// No prefix parsed yet; waiting for 4 bytes.
    AwaitingLength,
    /// Prefix parsed; waiting for `len` payload bytes.
    AwaitingPayload { len: usize },
}

impl DecodeState {
    /// True between frames.
    pub fn is_idle(self) -> bool {
        matches!(self, DecodeState::AwaitingLength)
    }
}

/// Incremental frame decoder.
///
/// Holds only the pending length; the accumulation buffer belongs to the
/// caller and is passed to [`FrameDecoder::decode`] each time. Consumed bytes
/// are advanced off the front of that buffer and payloads are split off
/// without copying.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    pending: usize,
    max_payload: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD)
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects declared lengths above `max_payload`.
    pub fn new(max_payload: usize) -> Self {
        Self {
            pending: 0,
            max_payload,
        }
    }

    /// Try to pull the next complete payload out of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Partial prefixes and
    /// partial payloads stay in `src`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.pending == 0 {
            if src.len() < PREFIX_SIZE {
                return Ok(None);
            }
            let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
            if len == 0 {
                return Err(FrameError::ZeroLength);
            }
            if len > self.max_payload {
                return Err(FrameError::PayloadTooLarge {
                    size: len,
                    max: self.max_payload,
                });
            }
            src.advance(PREFIX_SIZE);
            self.pending = len;
        }

        if src.len() < self.pending {
            return Ok(None);
        }

        let payload = src.split_to(self.pending).freeze();
        self.pending = 0;
        Ok(Some(payload))
    }

    /// Current position within the frame being assembled.
    pub fn state(&self) -> DecodeState {
        match self.pending {
            0 => DecodeState::AwaitingLength,
            len => DecodeState::AwaitingPayload { len },
        }
    }

    /// Forget any parsed prefix.
    pub fn reset(&mut self) {
        self.pending = 0;
    }

    /// Maximum declared length accepted.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Change the maximum declared length for subsequent prefixes.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }
}

/// Configuration shared by the framer, reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: [`MAX_PAYLOAD`], i.e. whatever
    /// the 4-byte prefix can describe.
    pub max_payload_size: usize,
    /// Read timeout applied to `IpcStream` transports.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout applied to `IpcStream` transports.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(payload) = decoder.decode(buf).unwrap() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn encodes_hi_as_little_endian_prefix() {
        let mut buf = BytesMut::new();
        encode_frame(b"hi", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x02, 0x00, 0x00, 0x00, 0x68, 0x69]);
    }

    #[test]
    fn prefix_is_little_endian_for_multibyte_lengths() {
        let payload = vec![7u8; 0x0102];
        let mut buf = BytesMut::new();
        encode_frame(&payload, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(buf.len(), encoded_len(payload.len()));
    }

    #[test]
    fn rejects_empty_payload() {
        let mut buf = BytesMut::new();
        let err = encode_frame(b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmptyPayload));
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_single_frame() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();

        let mut decoder = FrameDecoder::default();
        let payload = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"hello");
        assert!(buf.is_empty());
        assert_eq!(decoder.state(), DecodeState::AwaitingLength);
    }

    #[test]
    fn partial_prefix_waits() {
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x00][..]);
        let mut decoder = FrameDecoder::default();

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.state(), DecodeState::AwaitingLength);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn partial_payload_keeps_pending_length() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(PREFIX_SIZE + 2);

        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.state(), DecodeState::AwaitingPayload { len: 5 });
        assert_eq!(buf.as_ref(), b"he");

        buf.extend_from_slice(b"llo");
        let payload = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"hello");
    }

    #[test]
    fn zero_prefix_is_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00, 0xAA][..]);
        let mut decoder = FrameDecoder::default();

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ZeroLength));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1024);

        let mut decoder = FrameDecoder::new(16);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge {
                size: 1024,
                max: 16
            }
        ));
    }

    #[test]
    fn many_frames_in_one_buffer_with_trailing_partial() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();
        encode_frame(b"third", &mut buf).unwrap();
        buf.extend_from_slice(&[0x09, 0x00]);

        let mut decoder = FrameDecoder::default();
        let payloads = decode_all(&mut decoder, &mut buf);

        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].as_ref(), b"first");
        assert_eq!(payloads[1].as_ref(), b"second");
        assert_eq!(payloads[2].as_ref(), b"third");
        assert_eq!(buf.as_ref(), &[0x09, 0x00]);
    }

    #[test]
    fn reset_returns_to_awaiting_length() {
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x00, b'a'][..]);
        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        decoder.reset();
        assert_eq!(decoder.state(), DecodeState::AwaitingLength);
    }

    #[test]
    fn default_config_only_bounds_by_prefix_width() {
        let cfg = FrameConfig::default();
        assert_eq!(cfg.max_payload_size, u32::MAX as usize);
        assert!(cfg.read_timeout.is_none());
        assert!(cfg.write_timeout.is_none());
    }
}
