//! The write half of a connection.

use std::os::fd::{AsFd, BorrowedFd};

use tracing::trace;

use super::{
    message::{Call, ErrorReply, Message, Reply},
    socket::WriteHalf,
};
use crate::{Error, Fd, Result};

/// A connection that can only be used for writing.
///
/// Messages are serialized to their minimal JSON form followed by a `\0` terminator.
/// Descriptors are attached as ancillary data to the first byte of the frame, which requires
/// the frame to be written on its own; descriptor-free frames may instead be enqueued with
/// [`WriteConnection::enqueue_call`] and flushed together in a single write.
///
/// # Cancel safety
///
/// All async methods of this type are cancel safe unless stated otherwise.
#[derive(Debug)]
pub struct WriteConnection<Write: WriteHalf> {
    socket: Write,
    queue: Vec<u8>,
    closing: bool,
    id: usize,
}

impl<Write: WriteHalf> WriteConnection<Write> {
    pub(super) fn new(socket: Write, id: usize) -> Self {
        Self {
            socket,
            queue: Vec::new(),
            closing: false,
            id,
        }
    }

    /// The unique identifier of the connection.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the write half can send descriptors.
    pub fn supports_fd_passing(&self) -> bool {
        self.socket.supports_fd_passing()
    }

    /// Send a method call, attaching `fds` to the frame.
    pub async fn send_call(&mut self, call: &Call, fds: &[Fd]) -> Result<()> {
        trace!("connection {}: sending call: {:?}", self.id, call);
        self.send_message(&Message::Call(call.clone()), fds).await
    }

    /// Send a successful reply, attaching `fds` to the frame.
    pub async fn send_reply(&mut self, reply: &Reply, fds: &[Fd]) -> Result<()> {
        trace!("connection {}: sending reply: {:?}", self.id, reply);
        self.send_message(&Message::Reply(reply.clone()), fds).await
    }

    /// Send an error reply.
    pub async fn send_error(&mut self, error: &ErrorReply) -> Result<()> {
        trace!("connection {}: sending error: {:?}", self.id, error);
        self.send_message(&Message::Error(error.clone()), &[]).await
    }

    /// Send any message, attaching `fds` to the frame.
    ///
    /// Fails with [`Error::FdPassingNotSupported`] before anything is written if `fds` is
    /// non-empty and the endpoint cannot carry descriptors; the connection remains usable.
    pub async fn send_message(&mut self, message: &Message, fds: &[Fd]) -> Result<()> {
        if self.closing {
            return Err(Error::ConnectionClosed);
        }
        if !fds.is_empty() && !self.socket.supports_fd_passing() {
            return Err(Error::FdPassingNotSupported);
        }

        // Earlier enqueued frames must leave first to preserve ordering.
        self.flush().await?;

        let mut bytes = message.to_bytes()?;
        bytes.push(b'\0');
        let borrowed: Vec<BorrowedFd<'_>> = fds.iter().map(|fd| fd.as_fd()).collect();
        self.socket.write(&bytes, &borrowed).await
    }

    /// Enqueue a method call without writing it out.
    ///
    /// The call is serialized into the outgoing queue; nothing reaches the socket until
    /// [`WriteConnection::flush`] is called. Descriptors cannot ride enqueued frames since
    /// they must be attached to the first byte of their own frame; use
    /// [`WriteConnection::send_call`] for calls carrying descriptors.
    pub fn enqueue_call(&mut self, call: &Call) -> Result<()> {
        if self.closing {
            return Err(Error::ConnectionClosed);
        }
        trace!("connection {}: enqueueing call: {:?}", self.id, call);
        let bytes = Message::Call(call.clone()).to_bytes()?;
        self.queue.extend_from_slice(&bytes);
        self.queue.push(b'\0');
        Ok(())
    }

    /// Write out all enqueued frames in a single write operation.
    ///
    /// # Cancel safety
    ///
    /// Not cancel safe: dropping the future mid-write may leave a frame partially written.
    pub async fn flush(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        self.socket.write(&self.queue, &[]).await?;
        self.queue.clear();
        Ok(())
    }

    /// Drain enqueued frames and refuse further sends.
    pub async fn close(&mut self) -> Result<()> {
        if self.closing {
            return Ok(());
        }
        let res = self.flush().await;
        self.closing = true;
        res
    }

    /// Whether shutdown has begun.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Dismantle the half into its raw socket, for protocols taking over after an upgrade.
    ///
    /// Flush before calling this; enqueued frames that were never flushed are discarded.
    pub fn into_socket(self) -> Write {
        self.socket
    }
}
