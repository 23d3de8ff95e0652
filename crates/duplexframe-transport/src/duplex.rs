use std::io::{Read, Stdin, Stdout, Write};

/// Any reader paired with any writer, treated as one duplex transport.
///
/// The reader is the input endpoint (bytes from the peer), the writer is the
/// output endpoint (bytes to the peer). Both are expected to preserve order
/// and never drop or duplicate bytes.
#[derive(Debug)]
pub struct Duplex<R, W> {
    input: R,
    output: W,
}

impl<R, W> Duplex<R, W> {
    /// Pair an input endpoint with an output endpoint.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Borrow the input endpoint.
    pub fn input(&self) -> &R {
        &self.input
    }

    /// Borrow the output endpoint.
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Split back into `(input, output)`.
    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl Duplex<Stdin, Stdout> {
    /// The current process's stdin/stdout, for running as the child side of
    /// a parent/child pair.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin(), std::io::stdout())
    }
}

impl<R: Read, W> Read for Duplex<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl<R, W: Write> Write for Duplex<R, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.flush()
    }
}
