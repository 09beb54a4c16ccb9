//! The read half of a connection.

use std::{collections::VecDeque, mem, os::fd::OwnedFd};

use memchr::memchr;
use tracing::trace;

use super::{
    message::{Call, Message, ReplyResult},
    socket::ReadHalf,
    BUFFER_SIZE, MAX_BUFFER_SIZE,
};
use crate::{Error, FdArray, Result};

/// A connection that can only be used for reading.
///
/// Frames are `\0`-terminated JSON objects. Descriptors received as ancillary data belong to
/// the frame that is under construction at the moment of receipt; if none is, they belong to
/// the next frame to start. The descriptors of a frame are handed out as an [`FdArray`]
/// alongside the parsed message and live for as long as the caller keeps the array.
///
/// # Cancel safety
///
/// All async methods of this type are cancel safe.
#[derive(Debug)]
pub struct ReadConnection<Read: ReadHalf> {
    socket: Read,
    /// Bytes of the frame currently under construction.
    buffer: Vec<u8>,
    /// Descriptors waiting for the frame under construction to complete.
    pending_fds: Vec<OwnedFd>,
    /// Complete frames not yet consumed.
    frames: VecDeque<Frame>,
    scratch: Vec<u8>,
    eof: bool,
    id: usize,
}

#[derive(Debug)]
struct Frame {
    bytes: Vec<u8>,
    fds: Vec<OwnedFd>,
}

impl<Read: ReadHalf> ReadConnection<Read> {
    pub(super) fn new(socket: Read, id: usize) -> Self {
        Self {
            socket,
            buffer: Vec::new(),
            pending_fds: Vec::new(),
            frames: VecDeque::new(),
            scratch: vec![0; BUFFER_SIZE],
            eof: false,
            id,
        }
    }

    /// The unique identifier of the connection.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the read half can receive descriptors.
    pub fn supports_fd_passing(&self) -> bool {
        self.socket.supports_fd_passing()
    }

    /// Receive the next message and its descriptors.
    ///
    /// Returns `None` on a clean end of stream (peer hung up on a frame boundary with no
    /// descriptors in flight). An end of stream inside a frame is a protocol violation.
    pub async fn receive_message(&mut self) -> Result<Option<(Message, FdArray)>> {
        loop {
            if let Some(frame) = self.frames.pop_front() {
                let message = Message::from_slice(&frame.bytes)?;
                trace!("connection {}: received: {:?}", self.id, message);
                return Ok(Some((message, FdArray::from_owned(frame.fds))));
            }

            if self.eof {
                if !self.buffer.is_empty() {
                    return Err(Error::protocol("end of stream inside a frame"));
                }
                if !self.pending_fds.is_empty() {
                    return Err(Error::protocol(
                        "end of stream with descriptors but no frame",
                    ));
                }
                return Ok(None);
            }

            self.read_more().await?;
        }
    }

    /// Receive a method call.
    ///
    /// Returns `None` on a clean end of stream. Any message other than a call is a protocol
    /// violation.
    pub async fn receive_call(&mut self) -> Result<Option<(Call, FdArray)>> {
        match self.receive_message().await? {
            Some((Message::Call(call), fds)) => Ok(Some((call, fds))),
            Some((message, _)) => Err(Error::protocol(format!(
                "expected a call, got {message:?}"
            ))),
            None => Ok(None),
        }
    }

    /// Receive a method call reply, successful or error.
    ///
    /// Returns `None` on a clean end of stream. A call message is a protocol violation.
    pub async fn receive_reply(&mut self) -> Result<Option<(ReplyResult, FdArray)>> {
        match self.receive_message().await? {
            Some((Message::Reply(reply), fds)) => Ok(Some((Ok(reply), fds))),
            Some((Message::Error(error), fds)) => Ok(Some((Err(error), fds))),
            Some((message, _)) => Err(Error::protocol(format!(
                "expected a reply, got {message:?}"
            ))),
            None => Ok(None),
        }
    }

    /// Dismantle the half into its raw socket, for protocols taking over after an upgrade.
    ///
    /// Also returns any bytes that were already buffered beyond the last consumed message;
    /// they belong to the successor protocol. Descriptors buffered for unconsumed messages
    /// are released.
    pub fn into_socket(mut self) -> (Read, Vec<u8>) {
        let mut leftover = Vec::new();
        for frame in self.frames.drain(..) {
            leftover.extend_from_slice(&frame.bytes);
            leftover.push(b'\0');
        }
        leftover.extend_from_slice(&self.buffer);
        (self.socket, leftover)
    }

    // Read from the socket once and split off any frames that completed.
    async fn read_more(&mut self) -> Result<()> {
        let mut fds = Vec::new();
        let n = self.socket.read(&mut self.scratch, &mut fds).await?;
        if n == 0 {
            // Descriptors cannot arrive without data bytes; anything still pending is
            // accounted for against the partial frame in `receive_message`.
            self.eof = true;
            return Ok(());
        }

        self.pending_fds.append(&mut fds);
        self.buffer.extend_from_slice(&self.scratch[..n]);
        if self.buffer.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferOverflow);
        }

        let mut consumed = 0;
        while let Some(pos) = memchr(b'\0', &self.buffer[consumed..]) {
            let end = consumed + pos;
            let frame = Frame {
                bytes: self.buffer[consumed..end].to_vec(),
                // The first frame completed here was the one under construction when the
                // descriptors arrived; later frames from the same read get nothing.
                fds: mem::take(&mut self.pending_fds),
            };
            self.frames.push_back(frame);
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);

        Ok(())
    }
}
