//! Contains connection related API.

mod message;
pub use message::{Call, ErrorReply, Message, Reply, ReplyResult};
mod read_connection;
pub use read_connection::ReadConnection;
pub mod socket;
pub use socket::Socket;
mod write_connection;
pub use write_connection::WriteConnection;

use core::sync::atomic::AtomicUsize;

use crate::{Fd, FdArray, Result};

/// A connection.
///
/// The low-level API to send and receive messages with their descriptors.
///
/// Each connection gets a unique identifier when created that can be queried using
/// [`Connection::id`]. The ID is shared between the read and write halves and can be used to
/// associate them after a [`Connection::split`].
///
/// # Cancel safety
///
/// All async methods of this type are cancel safe unless explicitly stated otherwise in
/// their documentation.
#[derive(Debug)]
pub struct Connection<S: Socket> {
    read: ReadConnection<S::ReadHalf>,
    write: WriteConnection<S::WriteHalf>,
}

impl<S> Connection<S>
where
    S: Socket,
{
    /// Create a new connection.
    pub fn new(socket: S) -> Self {
        let (read, write) = socket.split();
        let id = NEXT_ID.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        Self {
            read: ReadConnection::new(read, id),
            write: WriteConnection::new(write, id),
        }
    }

    /// The reference to the read half of the connection.
    pub fn read(&self) -> &ReadConnection<S::ReadHalf> {
        &self.read
    }

    /// The mutable reference to the read half of the connection.
    pub fn read_mut(&mut self) -> &mut ReadConnection<S::ReadHalf> {
        &mut self.read
    }

    /// The reference to the write half of the connection.
    pub fn write(&self) -> &WriteConnection<S::WriteHalf> {
        &self.write
    }

    /// The mutable reference to the write half of the connection.
    pub fn write_mut(&mut self) -> &mut WriteConnection<S::WriteHalf> {
        &mut self.write
    }

    /// Mutable references to both halves at once.
    pub fn halves_mut(
        &mut self,
    ) -> (
        &mut ReadConnection<S::ReadHalf>,
        &mut WriteConnection<S::WriteHalf>,
    ) {
        (&mut self.read, &mut self.write)
    }

    /// Split the connection into read and write halves.
    pub fn split(self) -> (ReadConnection<S::ReadHalf>, WriteConnection<S::WriteHalf>) {
        (self.read, self.write)
    }

    /// Join the read and write halves into a connection (the opposite of
    /// [`Connection::split`]).
    pub fn join(read: ReadConnection<S::ReadHalf>, write: WriteConnection<S::WriteHalf>) -> Self {
        Self { read, write }
    }

    /// The unique identifier of the connection.
    pub fn id(&self) -> usize {
        debug_assert_eq!(self.read.id(), self.write.id());
        self.read.id()
    }

    /// Whether both halves can carry descriptors.
    pub fn supports_fd_passing(&self) -> bool {
        self.read.supports_fd_passing() && self.write.supports_fd_passing()
    }

    /// Sends a method call.
    ///
    /// Convenience wrapper around [`WriteConnection::send_call`].
    pub async fn send_call(&mut self, call: &Call, fds: &[Fd]) -> Result<()> {
        self.write.send_call(call, fds).await
    }

    /// Receives a method call reply.
    ///
    /// Convenience wrapper around [`ReadConnection::receive_reply`].
    pub async fn receive_reply(&mut self) -> Result<Option<(ReplyResult, FdArray)>> {
        self.read.receive_reply().await
    }

    /// Receive a method call over the socket.
    ///
    /// Convenience wrapper around [`ReadConnection::receive_call`].
    pub async fn receive_call(&mut self) -> Result<Option<(Call, FdArray)>> {
        self.read.receive_call().await
    }

    /// Send a reply over the socket.
    ///
    /// Convenience wrapper around [`WriteConnection::send_reply`].
    pub async fn send_reply(&mut self, reply: &Reply, fds: &[Fd]) -> Result<()> {
        self.write.send_reply(reply, fds).await
    }

    /// Send an error reply over the socket.
    ///
    /// Convenience wrapper around [`WriteConnection::send_error`].
    pub async fn send_error(&mut self, error: &ErrorReply) -> Result<()> {
        self.write.send_error(error).await
    }

    /// Enqueue a call without writing it out.
    ///
    /// Convenience wrapper around [`WriteConnection::enqueue_call`].
    pub fn enqueue_call(&mut self, call: &Call) -> Result<()> {
        self.write.enqueue_call(call)
    }

    /// Flush the connection.
    ///
    /// Convenience wrapper around [`WriteConnection::flush`].
    pub async fn flush(&mut self) -> Result<()> {
        self.write.flush().await
    }

    /// Drain enqueued outgoing frames, then refuse further sends.
    ///
    /// Convenience wrapper around [`WriteConnection::close`]. Dropping the connection
    /// releases both halves and any descriptors still buffered on the read side.
    pub async fn close(&mut self) -> Result<()> {
        self.write.close().await
    }

    /// Whether shutdown has begun.
    pub fn is_closing(&self) -> bool {
        self.write.is_closing()
    }
}

impl<S> From<S> for Connection<S>
where
    S: Socket,
{
    fn from(socket: S) -> Self {
        Self::new(socket)
    }
}

pub(crate) const BUFFER_SIZE: usize = 4 * 1024;

// Don't allow a single frame over 100MB.
const MAX_BUFFER_SIZE: usize = 100 * 1024 * 1024;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_socket::MockSocket;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn send_and_receive() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"value":1},"continues":true}"#,
            r#"{"parameters":{"value":2}}"#,
            r#"{"error":"org.example.test.Failed"}"#,
        ]);
        let mut conn = Connection::new(socket);

        let call = Call::new("org.example.test.Next").set_more(true);
        conn.send_call(&call, &[]).await?;

        let (reply, fds) = conn.receive_reply().await?.unwrap();
        let reply = reply.unwrap();
        assert_eq!(reply.continues(), Some(true));
        assert_eq!(reply.parameters(), Some(&json!({"value": 1})));
        assert!(fds.is_empty());

        let (reply, _) = conn.receive_reply().await?.unwrap();
        assert_eq!(reply.unwrap().continues(), None);

        let (reply, _) = conn.receive_reply().await?.unwrap();
        assert_eq!(reply.unwrap_err().name(), "org.example.test.Failed");

        // Clean end of stream.
        assert!(conn.receive_reply().await?.is_none());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn fds_are_refused_on_plain_endpoints() {
        let socket = MockSocket::new(&[]);
        let mut conn = Connection::new(socket);

        let owned: std::os::fd::OwnedFd = std::fs::File::open("/dev/null").unwrap().into();
        let fd = Fd::from(owned);
        let call = Call::new("org.example.test.Open");
        let err = conn.send_call(&call, &[fd]).await.unwrap_err();
        assert!(matches!(err, crate::Error::FdPassingNotSupported));

        // The connection is still usable afterwards.
        conn.send_call(&call, &[]).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn eof_mid_frame_is_a_protocol_violation() {
        let socket = MockSocket::new_raw(br#"{"method":"org.example.test.Ping""#.to_vec());
        let mut conn = Connection::new(socket);

        let err = conn.receive_call().await.unwrap_err();
        assert!(matches!(err, crate::Error::ProtocolViolation(_)));
    }

    #[test_log::test(tokio::test)]
    async fn enqueued_calls_flush_in_one_write() -> Result<()> {
        let socket = MockSocket::new(&[]);
        let log = socket.written_log();
        let mut conn = Connection::new(socket);

        conn.enqueue_call(&Call::new("org.example.test.A"))?;
        conn.enqueue_call(&Call::new("org.example.test.B"))?;
        conn.flush().await?;

        let log = log.lock().unwrap();
        assert_eq!(
            log.bytes,
            b"{\"method\":\"org.example.test.A\"}\0{\"method\":\"org.example.test.B\"}\0"
        );
        assert_eq!(log.writes, 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn close_refuses_further_sends() -> Result<()> {
        let socket = MockSocket::new(&[]);
        let mut conn = Connection::new(socket);

        conn.enqueue_call(&Call::new("org.example.test.A"))?;
        conn.close().await?;
        assert!(conn.is_closing());

        let err = conn
            .send_call(&Call::new("org.example.test.B"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ConnectionClosed));
        Ok(())
    }
}
