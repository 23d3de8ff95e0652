use std::io::{Read, Write};

use duplexframe_frame::{FrameError, FrameReader, FrameWriter};
use duplexframe_transport::{Duplex, UnixDomainSocket};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let config = args.frame.config(None);

    let Some(path) = args.path else {
        let (stdin, stdout) = Duplex::stdio().into_parts();
        let mut reader = FrameReader::with_config(stdin, config.clone());
        let mut writer = FrameWriter::with_config(stdout, config);
        let echoed = echo_frames(&mut reader, &mut writer)
            .map_err(|err| frame_error("echo failed", err))?;
        info!(frames = echoed, "stdin closed");
        return Ok(SUCCESS);
    };

    let listener =
        UnixDomainSocket::bind(&path).map_err(|err| transport_error("bind failed", err))?;
    install_ctrlc_handler()?;

    loop {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let input = stream
            .try_clone()
            .map_err(|err| transport_error("accept failed", err))?;
        let mut reader = FrameReader::with_config_ipc(input, config.clone())
            .map_err(|err| frame_error("accept failed", err))?;
        let mut writer = FrameWriter::with_config_ipc(stream, config.clone())
            .map_err(|err| frame_error("accept failed", err))?;

        match echo_frames(&mut reader, &mut writer) {
            Ok(echoed) => info!(frames = echoed, "client disconnected"),
            Err(err) => warn!(error = %err, "dropping client"),
        }
    }
}

/// Write every payload from `reader` back through `writer` until clean EOF.
fn echo_frames<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<u64, FrameError> {
    let mut echoed = 0u64;
    for payload in reader.frames() {
        let payload = payload?;
        tracing::debug!(size = payload.len(), "echoing frame");
        writer.send(&payload)?;
        echoed += 1;
    }
    Ok(echoed)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use duplexframe_frame::{encode_frame, FrameDecoder};

    use super::*;

    fn wire(payloads: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload.as_bytes(), &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn echoes_every_frame_in_order() {
        let mut reader = FrameReader::new(Cursor::new(wire(&["ping", "pong", "x"])));
        let mut writer = FrameWriter::new(Vec::new());

        assert_eq!(echo_frames(&mut reader, &mut writer).unwrap(), 3);

        let mut out = BytesMut::from(writer.into_inner().as_slice());
        let mut decoder = FrameDecoder::default();
        for expected in ["ping", "pong", "x"] {
            let payload = decoder.decode(&mut out).unwrap().unwrap();
            assert_eq!(payload.as_ref(), expected.as_bytes());
        }
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_input_stops_with_error_after_echoing_complete_frames() {
        let mut input = wire(&["whole"]);
        input.extend_from_slice(&[0x08, 0x00, 0x00, 0x00, b'p']);
        let mut reader = FrameReader::new(Cursor::new(input));
        let mut writer = FrameWriter::new(Vec::new());

        let err = echo_frames(&mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed { buffered: 1 }));
        assert_eq!(writer.get_ref().len(), 9);
    }
}
