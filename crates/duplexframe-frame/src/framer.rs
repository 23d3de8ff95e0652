//! The push-driven framer.
//!
//! A [`Framer`] owns both ends of a duplex transport. Bytes from the peer are
//! pushed into it (either by the caller through [`Framer::receive`] or by the
//! framer itself reading its input through [`Framer::pump`]), and every fully
//! reassembled payload is handed to the registered receive handlers in
//! arrival order. [`Framer::send`] frames a payload and writes it in one go.

use std::io::{ErrorKind, Read, Write};
use std::process::{ChildStdin, ChildStdout};

use bytes::{Bytes, BytesMut};
use duplexframe_transport::{ChildProcess, Duplex, IpcStream};
use tracing::{debug, trace, warn};

use crate::codec::{DecodeState, FrameConfig, FrameDecoder};
use crate::error::{is_timeout, FrameError, Result};
use crate::reader::{INITIAL_BUFFER_CAPACITY, READ_CHUNK_SIZE};
use crate::writer::FrameWriter;

/// Handler invoked once per complete incoming payload.
pub type RecvHandler = Box<dyn FnMut(&Bytes) + Send>;

/// Handler invoked after each successful send, with the payload that was sent.
pub type SendHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Outcome of a single [`Framer::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// A chunk was read; this many frames were completed by it.
    Frames(usize),
    /// The input reached end of stream on a frame boundary.
    Closed,
}

/// Running totals for one framer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

/// Length-prefixed message framing over a duplex byte transport.
pub struct Framer<R, W> {
    input: R,
    writer: FrameWriter<W>,
    buf: BytesMut,
    decoder: FrameDecoder,
    failed: bool,
    recv_handlers: Vec<RecvHandler>,
    send_handlers: Vec<SendHandler>,
    stats: FramerStats,
}

impl<R, W: Write> Framer<R, W> {
    /// Wrap an input and an output endpoint with default configuration.
    pub fn new(input: R, output: W) -> Self {
        Self::with_config(input, output, FrameConfig::default())
    }

    /// Wrap an input and an output endpoint with explicit configuration.
    pub fn with_config(input: R, output: W, config: FrameConfig) -> Self {
        Self {
            input,
            decoder: FrameDecoder::new(config.max_payload_size),
            writer: FrameWriter::with_config(output, config),
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            failed: false,
            recv_handlers: Vec::new(),
            send_handlers: Vec::new(),
            stats: FramerStats::default(),
        }
    }

    /// Frame `payload` and write it to the output endpoint.
    ///
    /// Send handlers run only after the write and flush succeed.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.send(payload)?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        for handler in &mut self.send_handlers {
            handler(payload);
        }
        Ok(())
    }
}

impl<R, W> Framer<R, W> {
    /// Register a handler for complete incoming payloads.
    pub fn on_recv<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&Bytes) + Send + 'static,
    {
        self.recv_handlers.push(Box::new(handler));
        self
    }

    /// Register a handler notified after every successful send.
    pub fn on_send<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.send_handlers.push(Box::new(handler));
        self
    }

    /// Push bytes that arrived from the peer.
    ///
    /// Appends `chunk` to the accumulation buffer and emits every frame it
    /// completes. A chunk may complete zero, one or many frames and may leave
    /// a partial frame buffered for next time. Returns how many were emitted.
    ///
    /// A zero length prefix (or one above the configured maximum) aborts the
    /// receive side: buffered bytes are dropped and every later call returns
    /// [`FrameError::Aborted`]. Frames completed earlier in the same chunk
    /// have already been delivered.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.failed {
            return Err(FrameError::Aborted);
        }

        self.buf.extend_from_slice(chunk);
        self.stats.bytes_received += chunk.len() as u64;

        let mut emitted = 0usize;
        loop {
            match self.decoder.decode(&mut self.buf) {
                Ok(Some(payload)) => {
                    trace!(size = payload.len(), "frame received");
                    emitted += 1;
                    self.stats.frames_received += 1;
                    for handler in &mut self.recv_handlers {
                        handler(&payload);
                    }
                }
                Ok(None) => return Ok(emitted),
                Err(err) => return Err(self.abort(err)),
            }
        }
    }

    /// Current receive state.
    pub fn state(&self) -> DecodeState {
        self.decoder.state()
    }

    /// Bytes received but not yet part of an emitted frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the receive side has been aborted.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Totals since construction.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Borrow the input endpoint.
    pub fn input(&self) -> &R {
        &self.input
    }

    /// Borrow the output endpoint.
    pub fn output(&self) -> &W {
        self.writer.get_ref()
    }

    /// Give back the input and output endpoints. Buffered input is discarded.
    pub fn into_parts(self) -> (R, W) {
        (self.input, self.writer.into_inner())
    }

    fn abort(&mut self, err: FrameError) -> FrameError {
        warn!(error = %err, buffered = self.buf.len(), "aborting frame receive");
        self.failed = true;
        self.buf.clear();
        self.decoder.reset();
        err
    }
}

impl<R: Read, W> Framer<R, W> {
    /// Read one chunk from the input endpoint and push it through [`Framer::receive`].
    ///
    /// Blocks until the input yields data or ends. End of stream on a frame
    /// boundary is [`Pump::Closed`]; inside a frame it is
    /// [`FrameError::ConnectionClosed`]. Read timeouts are returned as
    /// [`FrameError::Io`] without touching buffered bytes. Any other read
    /// error aborts the receive side.
    pub fn pump(&mut self) -> Result<Pump> {
        if self.failed {
            return Err(FrameError::Aborted);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = loop {
            match self.input.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(FrameError::Io(err)),
                Err(err) => return Err(self.abort(FrameError::Io(err))),
            }
        };

        if read == 0 {
            if self.buf.is_empty() && self.decoder.state().is_idle() {
                debug!(stats = ?self.stats, "input closed");
                return Ok(Pump::Closed);
            }
            let buffered = self.buf.len();
            return Err(self.abort(FrameError::ConnectionClosed { buffered }));
        }

        self.receive(&chunk[..read]).map(Pump::Frames)
    }

    /// Pump the input until it closes. Returns the number of frames emitted.
    pub fn run(&mut self) -> Result<u64> {
        let mut total = 0u64;
        loop {
            match self.pump()? {
                Pump::Frames(n) => total += n as u64,
                Pump::Closed => return Ok(total),
            }
        }
    }
}

impl Framer<IpcStream, IpcStream> {
    /// Frame a connected socket, applying the timeouts from `config`.
    ///
    /// The socket is cloned so input and output can be driven independently.
    pub fn from_ipc(stream: IpcStream, config: FrameConfig) -> Result<Self> {
        let input = stream.try_clone()?;
        input.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(input, stream, config))
    }
}

impl Framer<ChildStdout, ChildStdin> {
    /// Frame a child process's stdio: read its stdout, write its stdin.
    pub fn from_child(child: &mut ChildProcess, config: FrameConfig) -> Result<Self> {
        let (input, output) = child.take_endpoints()?;
        debug!(program = child.program(), pid = child.id(), "framing child stdio");
        Ok(Self::with_config(input, output, config))
    }
}

impl<R, W: Write> Framer<R, W> {
    /// Frame any [`Duplex`] transport.
    pub fn from_duplex(duplex: Duplex<R, W>, config: FrameConfig) -> Self {
        let (input, output) = duplex.into_parts();
        Self::with_config(input, output, config)
    }
}

impl<R, W> std::fmt::Debug for Framer<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("state", &self.decoder.state())
            .field("buffered", &self.buf.len())
            .field("failed", &self.failed)
            .field("recv_handlers", &self.recv_handlers.len())
            .field("send_handlers", &self.send_handlers.len())
            .field("stats", &self.stats)
            .finish()
    }
}
