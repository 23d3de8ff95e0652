//! Duplex byte transports.
//!
//! A framer needs two endpoints: something it reads bytes from and something
//! it writes bytes to. This crate provides the usual ways of getting that pair:
//! - Unix domain sockets (Linux/macOS), via [`UnixDomainSocket`] and [`IpcStream`]
//! - A spawned child process's stdin/stdout, via [`ChildProcess`]
//! - Any reader paired with any writer, via [`Duplex`]
//!
//! Nothing here knows about message boundaries. That is the frame layer's job.

pub mod child;
pub mod duplex;
pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use child::ChildProcess;
pub use duplex::Duplex;
pub use error::{Result, TransportError};
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
