use std::fs;
use std::io::ErrorKind;
use std::thread;

use duplexframe_frame::{FrameError, FrameReader, FrameWriter};
use duplexframe_transport::ChildProcess;
use tracing::{debug, info, warn};

use crate::cmd::ExecArgs;
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
    USAGE,
};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ExecArgs, format: OutputFormat) -> CliResult<i32> {
    let payloads = resolve_payloads(&args)?;
    let expected = args.count.unwrap_or(payloads.len() as u64);

    let mut child = ChildProcess::spawn(&args.program, &args.args)
        .map_err(|err| transport_error("spawn failed", err))?;
    info!(program = child.program(), pid = child.id(), "child started");

    let received = match exchange(&mut child, &args, payloads, expected, format) {
        Ok(received) => received,
        Err(err) => {
            if let Err(kill_err) = child.kill() {
                debug!(error = %kill_err, "child already gone");
            }
            return Err(err);
        }
    };

    let status = child
        .wait()
        .map_err(|err| transport_error("wait failed", err))?;
    if received < expected {
        return Err(CliError::new(
            FAILURE,
            format!("child closed its stdout after {received} of {expected} replies"),
        ));
    }
    if !status.success() {
        return Err(CliError::new(FAILURE, format!("child exited with {status}")));
    }
    Ok(SUCCESS)
}

/// Feed `payloads` to the child's stdin from a writer thread while collecting
/// up to `expected` replies from its stdout on this one. Stdin is closed once
/// the last payload is written so the child sees end of input.
fn exchange(
    child: &mut ChildProcess,
    args: &ExecArgs,
    payloads: Vec<Vec<u8>>,
    expected: u64,
    format: OutputFormat,
) -> CliResult<u64> {
    let (stdout, stdin) = child
        .take_endpoints()
        .map_err(|err| transport_error("spawn failed", err))?;
    let config = args.frame.config(None);

    let mut writer = FrameWriter::with_config(stdin, config.clone());
    let feeder = thread::Builder::new()
        .name("exec-stdin".to_string())
        .spawn(move || -> Result<u64, FrameError> {
            for payload in &payloads {
                writer.send(payload)?;
            }
            Ok(payloads.len() as u64)
        })
        .map_err(|err| io_error("spawn failed", err))?;

    let mut reader = FrameReader::with_config(stdout, config);
    let mut received = 0u64;
    while received < expected {
        match reader.read_frame() {
            Ok(Some(reply)) => {
                received += 1;
                print_frame(&reply, received, &args.program, format);
            }
            Ok(None) => {
                warn!(received, expected, "child closed its stdout early");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }
    // Unread replies must not keep the child blocked on a full stdout.
    drop(reader);

    match feeder.join() {
        Ok(Ok(sent)) => debug!(sent, received, "exchange finished"),
        Ok(Err(FrameError::Io(err)))
            if err.kind() == ErrorKind::BrokenPipe && received >= expected =>
        {
            debug!("child stopped reading after the last expected reply");
        }
        Ok(Err(err)) => return Err(frame_error("send failed", err)),
        Err(_) => return Err(CliError::new(INTERNAL, "stdin writer thread panicked")),
    }
    Ok(received)
}

fn resolve_payloads(args: &ExecArgs) -> CliResult<Vec<Vec<u8>>> {
    let payloads: Vec<Vec<u8>> = match &args.file {
        Some(path) => vec![fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?],
        None => args.data.iter().map(|data| data.as_bytes().to_vec()).collect(),
    };
    if payloads.iter().any(Vec::is_empty) {
        return Err(CliError::new(USAGE, "payload must not be empty"));
    }
    if payloads.is_empty() && args.count.is_none() {
        return Err(CliError::new(USAGE, "nothing to send; pass --data, --file or --count"));
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::FrameOpts;

    fn args(data: &[&str]) -> ExecArgs {
        ExecArgs {
            data: data.iter().map(|s| s.to_string()).collect(),
            file: None,
            count: None,
            frame: FrameOpts::default(),
            program: "cat".to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn empty_data_is_rejected() {
        assert_eq!(resolve_payloads(&args(&["ok", ""])).unwrap_err().code, USAGE);
    }

    #[test]
    fn nothing_to_do_is_rejected() {
        assert_eq!(resolve_payloads(&args(&[])).unwrap_err().code, USAGE);

        let mut listen_only = args(&[]);
        listen_only.count = Some(1);
        assert!(resolve_payloads(&listen_only).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn cat_child_echoes_frames() {
        let mut child = ChildProcess::spawn("cat", std::iter::empty::<&str>()).unwrap();
        let args = args(&["one", "two"]);
        let payloads = resolve_payloads(&args).unwrap();

        let received = exchange(&mut child, &args, payloads, 2, OutputFormat::Json).unwrap();

        assert_eq!(received, 2);
        assert!(child.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn large_payload_through_cat_does_not_stall() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut child = ChildProcess::spawn("cat", std::iter::empty::<&str>()).unwrap();
            let payload = vec![0xABu8; 4 * 1024 * 1024];
            let received =
                exchange(&mut child, &args(&[]), vec![payload], 1, OutputFormat::Json);
            let status = child.wait().unwrap();
            let _ = done_tx.send((received.map_err(|err| err.message), status.success()));
        });

        let (received, success) = done_rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("exchange of a 4 MiB payload should finish");
        assert_eq!(received, Ok(1));
        assert!(success);
    }

    #[cfg(unix)]
    #[test]
    fn fewer_expected_replies_than_payloads_is_not_an_error() {
        let mut child = ChildProcess::spawn("cat", std::iter::empty::<&str>()).unwrap();
        let args = args(&["a", "b", "c"]);
        let payloads = resolve_payloads(&args).unwrap();

        let received = exchange(&mut child, &args, payloads, 1, OutputFormat::Json).unwrap();

        assert_eq!(received, 1);
        let _ = child.wait();
    }
}
