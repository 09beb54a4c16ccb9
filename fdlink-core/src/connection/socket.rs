//! The low-level socket read and write traits.

use core::future::Future;
use std::os::fd::{BorrowedFd, OwnedFd};

/// The socket trait.
///
/// This is the trait that needs to be implemented for a type to be used as a transport. The
/// two halves carry the actual I/O; descriptor passing is advertised per half so that a mixed
/// endpoint (say, a readable socket paired with a writable pipe) degrades per direction.
pub trait Socket: core::fmt::Debug {
    /// The read half of the socket.
    type ReadHalf: ReadHalf;
    /// The write half of the socket.
    type WriteHalf: WriteHalf;

    /// Split the socket into read and write halves.
    fn split(self) -> (Self::ReadHalf, Self::WriteHalf);
}

/// The read half of a socket.
pub trait ReadHalf: core::fmt::Debug {
    /// Read from the socket.
    ///
    /// On completion, the number of bytes read is returned. Descriptors received as ancillary
    /// data alongside those bytes are appended to `fds`; implementations without descriptor
    /// support never touch it.
    ///
    /// Notes for implementers:
    ///
    /// * The future returned by this method must be cancel safe.
    fn read(
        &mut self,
        buf: &mut [u8],
        fds: &mut Vec<OwnedFd>,
    ) -> impl Future<Output = crate::Result<usize>>;

    /// Whether this half can receive descriptors as ancillary data.
    fn supports_fd_passing(&self) -> bool {
        false
    }
}

/// The write half of a socket.
pub trait WriteHalf: core::fmt::Debug {
    /// Write the whole buffer to the socket, attaching `fds` as ancillary data to its first
    /// byte.
    ///
    /// Callers guarantee `fds` is empty when [`WriteHalf::supports_fd_passing`] is `false`.
    /// The returned future has the same requirements as that of [`ReadHalf::read`].
    fn write(
        &mut self,
        buf: &[u8],
        fds: &[BorrowedFd<'_>],
    ) -> impl Future<Output = crate::Result<()>>;

    /// Whether this half can send descriptors as ancillary data.
    fn supports_fd_passing(&self) -> bool {
        false
    }
}
