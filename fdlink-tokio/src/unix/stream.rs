use std::{
    io::{IoSlice, IoSliceMut},
    os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
    sync::Arc,
};

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use tokio::{io::Interest, net::UnixStream};
use tracing::trace;

use fdlink_core::{connection::socket, Error, Result};

// The kernel limit on descriptors per SCM_RIGHTS message.
const SCM_MAX_FD: usize = 253;

/// Connect to the Unix domain socket at the given path.
pub async fn connect<P>(path: P) -> Result<super::Connection>
where
    P: AsRef<std::path::Path>,
{
    let stream = UnixStream::connect(path.as_ref()).await?;
    let conn = super::Connection::new(Stream(stream));
    trace!("connection {}: connected to {:?}", conn.id(), path.as_ref());
    Ok(conn)
}

/// The [`socket::Socket`] implementation for Unix domain sockets.
///
/// Descriptors travel as `SCM_RIGHTS` ancillary data, received with `MSG_CMSG_CLOEXEC`.
#[derive(Debug)]
pub struct Stream(UnixStream);

impl socket::Socket for Stream {
    type ReadHalf = ReadHalf;
    type WriteHalf = WriteHalf;

    fn split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        // Both halves drive the same nonblocking stream; tokio's readiness API takes &self.
        let stream = Arc::new(self.0);
        (ReadHalf(stream.clone()), WriteHalf(stream))
    }
}

impl From<UnixStream> for Stream {
    fn from(stream: UnixStream) -> Self {
        Self(stream)
    }
}

/// The read half of a Unix domain socket.
#[derive(Debug)]
pub struct ReadHalf(Arc<UnixStream>);

impl socket::ReadHalf for ReadHalf {
    async fn read(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> Result<usize> {
        let raw = self.0.as_raw_fd();
        self.0
            .async_io(Interest::READABLE, || {
                let mut iov = [IoSliceMut::new(&mut buf[..])];
                let mut cmsg_buffer = nix::cmsg_space!([RawFd; SCM_MAX_FD]);
                let msg = recvmsg::<()>(
                    raw,
                    &mut iov,
                    Some(&mut cmsg_buffer),
                    MsgFlags::MSG_CMSG_CLOEXEC,
                )
                .map_err(std::io::Error::from)?;
                for cmsg in msg.cmsgs().map_err(std::io::Error::from)? {
                    if let ControlMessageOwned::ScmRights(received) = cmsg {
                        // recvmsg installed fresh descriptors; adopt them.
                        fds.extend(
                            received
                                .into_iter()
                                .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }),
                        );
                    }
                }
                Ok(msg.bytes)
            })
            .await
            .map_err(Into::into)
    }

    fn supports_fd_passing(&self) -> bool {
        true
    }
}

/// The write half of a Unix domain socket.
#[derive(Debug)]
pub struct WriteHalf(Arc<UnixStream>);

impl socket::WriteHalf for WriteHalf {
    async fn write(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> Result<()> {
        if fds.len() > SCM_MAX_FD {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "too many descriptors for one message",
            )));
        }

        let raw = self.0.as_raw_fd();
        let raw_fds: Vec<RawFd> = fds.iter().map(|fd| fd.as_raw_fd()).collect();
        let rights = [ControlMessage::ScmRights(&raw_fds)];

        let mut pos = 0;
        // The descriptors ride the first bytes that make it out.
        let mut fds_pending = !raw_fds.is_empty();
        while pos < buf.len() {
            let attach = fds_pending;
            let n = self
                .0
                .async_io(Interest::WRITABLE, || {
                    let iov = [IoSlice::new(&buf[pos..])];
                    let cmsgs: &[ControlMessage<'_>] = if attach { &rights } else { &[] };
                    sendmsg::<()>(raw, &iov, cmsgs, MsgFlags::empty(), None)
                        .map_err(std::io::Error::from)
                })
                .await?;
            if n == 0 {
                return Err(Error::Io(std::io::ErrorKind::WriteZero.into()));
            }
            pos += n;
            fds_pending = false;
        }
        Ok(())
    }

    fn supports_fd_passing(&self) -> bool {
        true
    }
}
