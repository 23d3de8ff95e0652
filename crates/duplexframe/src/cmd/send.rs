use std::fs;

use duplexframe_frame::{Framer, Pump};
use duplexframe_transport::UnixDomainSocket;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "payload must not be empty"));
    }

    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.frame.config(args.wait.then_some(wait_timeout));

    let stream = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut framer =
        Framer::from_ipc(stream, config).map_err(|err| frame_error("connect failed", err))?;

    framer.on_send(|sent| debug!(size = sent.len(), "frame sent"));
    if args.wait {
        let source = args.path.display().to_string();
        let mut seq = 0u64;
        framer.on_recv(move |reply| {
            seq += 1;
            print_frame(reply, seq, &source, format);
        });
    }

    framer
        .send(&payload)
        .map_err(|err| frame_error("send failed", err))?;

    if args.wait {
        while framer.stats().frames_received == 0 {
            match framer.pump() {
                Ok(Pump::Frames(_)) => {}
                Ok(Pump::Closed) => {
                    return Err(CliError::new(
                        FAILURE,
                        "receive failed: peer closed before replying",
                    ))
                }
                Err(err) => return Err(frame_error("receive failed", err)),
            }
        }
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --data, --json or --file is required"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::FrameOpts;

    fn args() -> SendArgs {
        SendArgs {
            path: PathBuf::from("/tmp/unused.sock"),
            json: None,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "5s".to_string(),
            frame: FrameOpts::default(),
        }
    }

    #[test]
    fn json_payload_must_parse() {
        let mut bad = args();
        bad.json = Some("{not json".to_string());
        assert_eq!(resolve_payload(&bad).unwrap_err().code, USAGE);

        let mut good = args();
        good.json = Some("{\"x\":1}".to_string());
        assert_eq!(resolve_payload(&good).unwrap(), b"{\"x\":1}".to_vec());
    }

    #[test]
    fn missing_payload_is_usage_error() {
        assert_eq!(resolve_payload(&args()).unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_file_is_reported() {
        let mut missing = args();
        missing.file = Some(PathBuf::from("/nonexistent/duplexframe/payload.bin"));
        let err = resolve_payload(&missing).unwrap_err();
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("failed reading"));
    }
}
