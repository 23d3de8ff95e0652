use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duplexframe_frame::{FrameConfig, FrameError, Framer, Pump};
use duplexframe_transport::{IpcStream, UnixDomainSocket};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    install_ctrlc_handler()?;

    let printed = Arc::new(AtomicU64::new(0));
    let limit = args.count;
    let done = |printed: &Arc<AtomicU64>| limit.is_some_and(|max| printed.load(Ordering::SeqCst) >= max);
    let mut connections = 0u64;

    while !done(&printed) {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        connections += 1;
        let source = format!("conn-{connections}");
        info!(%source, "client connected");

        let Some(mut framer) = open_client(stream, args.frame.config(None), &source) else {
            continue;
        };

        let counter = Arc::clone(&printed);
        let label = source.clone();
        let mut seq = 0u64;
        framer.on_recv(move |payload| {
            seq += 1;
            let total = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if limit.is_some_and(|max| total > max) {
                return;
            }
            print_frame(payload, seq, &label, format);
        });

        while !done(&printed) {
            match framer.pump() {
                Ok(Pump::Frames(_)) => {}
                Ok(Pump::Closed) => {
                    info!(%source, frames = framer.stats().frames_received, "client disconnected");
                    break;
                }
                Err(FrameError::ConnectionClosed { buffered }) => {
                    warn!(%source, buffered, "client disconnected mid-frame");
                    break;
                }
                Err(err) => {
                    warn!(%source, error = %err, "dropping client");
                    break;
                }
            }
        }
    }

    Ok(SUCCESS)
}

/// Frame an accepted client. A client that cannot be set up is logged and skipped.
fn open_client(
    stream: IpcStream,
    config: FrameConfig,
    source: &str,
) -> Option<Framer<IpcStream, IpcStream>> {
    match Framer::from_ipc(stream, config) {
        Ok(framer) => Some(framer),
        Err(err) => {
            warn!(%source, error = %err, "dropping client");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn client_setup_failure_is_skipped() {
        let (stream, _peer) = IpcStream::pair().unwrap();
        // A zero timeout is rejected by the socket.
        let config = FrameConfig {
            read_timeout: Some(Duration::ZERO),
            ..FrameConfig::default()
        };

        assert!(open_client(stream, config, "conn-1").is_none());
    }

    #[test]
    fn usable_client_is_framed() {
        let (stream, _peer) = IpcStream::pair().unwrap();
        let framer = open_client(stream, FrameConfig::default(), "conn-2").unwrap();
        assert!(!framer.is_failed());
    }
}
