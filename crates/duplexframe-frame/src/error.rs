use duplexframe_transport::TransportError;

/// Errors that can occur while framing or reassembling messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer sent a length prefix of zero. There is no way to resynchronize
    /// a length-prefixed stream after this, so the receive side is abandoned.
    #[error("zero length prefix in frame stream")]
    ZeroLength,

    /// Empty payloads cannot be framed; the peer would treat them as a
    /// protocol violation.
    #[error("refusing to send an empty payload")]
    EmptyPayload,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport could not be set up for framing.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The stream ended part-way through a frame.
    #[error("connection closed (incomplete frame, {buffered} bytes buffered)")]
    ConnectionClosed { buffered: usize },

    /// A previous protocol or transport failure ended the receive side.
    #[error("receive side aborted after an earlier failure")]
    Aborted,
}

/// Read/write timeouts surface as `WouldBlock` on Unix and `TimedOut` elsewhere.
pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

pub type Result<T> = std::result::Result<T, FrameError>;
