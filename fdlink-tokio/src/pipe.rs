//! Pipe transport without descriptor passing.
//!
//! A pipe endpoint is a readable descriptor paired with a writable one, typically inherited
//! from a parent process (stdio service activation) or created with [`new`]. Pipes cannot
//! carry ancillary data, so sending a message with descriptors fails with
//! [`fdlink_core::Error::FdPassingNotSupported`].

use std::os::fd::{BorrowedFd, OwnedFd};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::unix::pipe,
};
use tracing::trace;

use fdlink_core::{connection::socket, Result};

/// The connection type for pipe pairs.
pub type Connection = fdlink_core::Connection<Pipe>;

/// Create a connected pair of pipe transports.
///
/// Everything written on one [`Pipe`] is read by the other. Useful for talking to a child
/// process or for in-process tests.
pub fn new() -> Result<(Pipe, Pipe)> {
    let (a_tx, b_rx) = pipe::pipe()?;
    let (b_tx, a_rx) = pipe::pipe()?;
    Ok((Pipe { rx: a_rx, tx: a_tx }, Pipe { rx: b_rx, tx: b_tx }))
}

/// The [`socket::Socket`] implementation for a pipe pair.
#[derive(Debug)]
pub struct Pipe {
    rx: pipe::Receiver,
    tx: pipe::Sender,
}

impl Pipe {
    /// Build a transport from a receiver and a sender.
    pub fn from_halves(rx: pipe::Receiver, tx: pipe::Sender) -> Self {
        Self { rx, tx }
    }

    /// Build a transport from raw inherited descriptors, e.g. stdin and stdout.
    ///
    /// The descriptors are switched to nonblocking mode.
    pub fn from_fds(read: OwnedFd, write: OwnedFd) -> Result<Self> {
        trace!("adopting inherited pipe descriptors");
        let rx = pipe::Receiver::from_owned_fd(read)?;
        let tx = pipe::Sender::from_owned_fd(write)?;
        Ok(Self { rx, tx })
    }
}

impl socket::Socket for Pipe {
    type ReadHalf = ReadHalf;
    type WriteHalf = WriteHalf;

    fn split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        (ReadHalf(self.rx), WriteHalf(self.tx))
    }
}

/// The read half of a pipe transport.
#[derive(Debug)]
pub struct ReadHalf(pipe::Receiver);

impl socket::ReadHalf for ReadHalf {
    async fn read(&mut self, buf: &mut [u8], _fds: &mut Vec<OwnedFd>) -> Result<usize> {
        self.0.read(buf).await.map_err(Into::into)
    }
}

/// The write half of a pipe transport.
#[derive(Debug)]
pub struct WriteHalf(pipe::Sender);

impl socket::WriteHalf for WriteHalf {
    async fn write(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> Result<()> {
        // The connection layer refuses descriptors on non-fd-capable endpoints.
        debug_assert!(fds.is_empty());

        let mut pos = 0;
        while pos < buf.len() {
            let n = self.0.write(&buf[pos..]).await?;
            pos += n;
        }
        Ok(())
    }
}
