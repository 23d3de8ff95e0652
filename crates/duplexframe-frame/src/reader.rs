use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use duplexframe_transport::IpcStream;
use tracing::{trace, warn};

use crate::codec::{FrameConfig, FrameDecoder};
use crate::error::{is_timeout, FrameError, Result};

pub(crate) const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
pub(crate) const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers only ever see whole payloads.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
    failed: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config.max_payload_size),
            config,
            failed: false,
        }
    }

    /// Read the next complete payload (blocking).
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames and
    /// `Err(FrameError::ConnectionClosed)` when it ends inside one. A read
    /// timeout is reported as `FrameError::Io` and leaves buffered bytes in
    /// place, so the call can be repeated. Any other failure is terminal and
    /// later calls return `FrameError::Aborted`.
    pub fn read_frame(&mut self) -> Result<Option<Bytes>> {
        if self.failed {
            return Err(FrameError::Aborted);
        }

        loop {
            match self.decoder.decode(&mut self.buf) {
                Ok(Some(payload)) => {
                    trace!(size = payload.len(), "frame read");
                    return Ok(Some(payload));
                }
                Ok(None) => {}
                Err(err) => return Err(self.fail(err)),
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(FrameError::Io(err)),
                Err(err) => return Err(self.fail(FrameError::Io(err))),
            };

            if read == 0 {
                if self.buf.is_empty() && self.decoder.state().is_idle() {
                    return Ok(None);
                }
                let buffered = self.buf.len();
                return Err(self.fail(FrameError::ConnectionClosed { buffered }));
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Iterate over payloads until the stream ends.
    ///
    /// The iterator stops after the first error.
    pub fn frames(&mut self) -> Frames<'_, T> {
        Frames {
            reader: self,
            done: false,
        }
    }

    fn fail(&mut self, err: FrameError) -> FrameError {
        warn!(error = %err, buffered = self.buf.len(), "frame reader stopped");
        self.failed = true;
        self.buf.clear();
        self.decoder.reset();
        err
    }

    /// Bytes received but not yet returned as part of a payload.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
        self.decoder.set_max_payload(max_payload_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply the read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

/// Iterator returned by [`FrameReader::frames`].
pub struct Frames<'a, T> {
    reader: &'a mut FrameReader<T>,
    done: bool,
}

impl<T: Read> Iterator for Frames<'_, T> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_frame() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
