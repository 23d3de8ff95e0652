use std::ffi::OsStr;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A child process whose stdin/stdout form a duplex transport.
///
/// The parent writes to the child's stdin and reads from its stdout. The
/// child's stderr is inherited so its logs stay visible.
pub struct ChildProcess {
    child: Child,
    program: String,
}

impl ChildProcess {
    /// Spawn `program` with `args` and piped stdin/stdout.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;
        debug!(program, pid = child.id(), "spawned child process");

        Ok(Self {
            child,
            program: program.to_string(),
        })
    }

    /// Take the child's stdout (input) and stdin (output) endpoints.
    ///
    /// Can only succeed once; later calls report the pipe as missing.
    pub fn take_endpoints(&mut self) -> Result<(ChildStdout, ChildStdin)> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;
        let stdin = self
            .child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        Ok((stdout, stdin))
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// The program this child was started from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the child to exit.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait()?;
        debug!(program = %self.program, %status, "child exited");
        Ok(status)
    }

    /// Kill the child and reap it.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill()?;
        let _ = self.child.wait();
        Ok(())
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn cat_echoes_through_pipes() {
        let mut child = ChildProcess::spawn("cat", std::iter::empty::<&str>()).unwrap();
        let (mut input, mut output) = child.take_endpoints().unwrap();

        output.write_all(b"through cat").unwrap();
        drop(output);

        let mut echoed = Vec::new();
        input.read_to_end(&mut echoed).unwrap();
        assert_eq!(echoed, b"through cat");
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn endpoints_can_only_be_taken_once() {
        let mut child = ChildProcess::spawn("cat", std::iter::empty::<&str>()).unwrap();
        let _endpoints = child.take_endpoints().unwrap();

        let err = child.take_endpoints().unwrap_err();
        assert!(matches!(err, TransportError::MissingPipe(_)));
        child.kill().unwrap();
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = ChildProcess::spawn("/nonexistent/duplexframe-child", ["x"]).unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }
}
