//! The client protocol role.

mod reply_stream;
pub use reply_stream::ReplyStream;

use std::collections::VecDeque;

use crate::{
    connection::{Call, Connection, ReplyResult, Socket},
    Error, Fd, FdArray, Result,
};

/// A client on a connection.
///
/// Varlink has no wire call id: replies arrive in the order the calls were issued. The client
/// therefore keeps a FIFO of pending calls and matches replies positionally. Calls may be
/// pipelined freely with [`Client::call`] or [`Client::enqueue`] plus [`Client::flush`];
/// [`Client::next_reply`] always delivers the reply belonging to the oldest pending call.
///
/// Any protocol violation or I/O failure poisons the client: every pending and future
/// operation fails (with [`Error::ConnectionClosed`] once the original error was returned), as
/// the positional correspondence cannot be re-established.
#[derive(Debug)]
pub struct Client<S: Socket> {
    conn: Connection<S>,
    pending: VecDeque<PendingCall>,
    poisoned: bool,
}

#[derive(Debug)]
struct PendingCall {
    more: bool,
    discarded: bool,
}

impl<S: Socket> Client<S> {
    /// Create a client on the given connection.
    pub fn new(conn: Connection<S>) -> Self {
        Self {
            conn,
            pending: VecDeque::new(),
            poisoned: false,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    /// Consume the client, returning the raw connection.
    ///
    /// This is the second half of a connection upgrade: after
    /// [`Client::call_upgrade`] succeeded, the returned connection's halves carry whatever
    /// protocol the upgraded method speaks.
    pub fn into_connection(self) -> Connection<S> {
        self.conn
    }

    /// The number of calls awaiting replies.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Issue a call, attaching `fds` to its frame.
    ///
    /// For oneway calls this resolves once the bytes are flushed and no reply is ever
    /// expected; otherwise a pending-call slot is pushed and the reply is retrieved with
    /// [`Client::next_reply`].
    pub async fn call(&mut self, call: &Call, fds: &[Fd]) -> Result<()> {
        self.check_usable()?;
        validate_flags(call)?;

        self.conn.send_call(call, fds).await?;
        if !call.oneway() {
            self.pending.push_back(PendingCall {
                more: call.more(),
                discarded: false,
            });
        }
        Ok(())
    }

    /// Enqueue a call without writing it out, for batched pipelining.
    ///
    /// Enqueued calls cannot carry descriptors. Call [`Client::flush`] to put them on the
    /// wire in a single write.
    pub fn enqueue(&mut self, call: &Call) -> Result<()> {
        self.check_usable()?;
        validate_flags(call)?;

        self.conn.enqueue_call(call)?;
        if !call.oneway() {
            self.pending.push_back(PendingCall {
                more: call.more(),
                discarded: false,
            });
        }
        Ok(())
    }

    /// Flush enqueued calls to the wire.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        self.conn.flush().await
    }

    /// Receive the next reply for the oldest pending call.
    ///
    /// Replies for discarded calls (dropped [`ReplyStream`]s) are skipped transparently. A
    /// reply with no pending call, or a streaming reply for a non-streaming call, is a
    /// protocol violation and poisons the client.
    pub async fn next_reply(&mut self) -> Result<(ReplyResult, FdArray)> {
        loop {
            self.check_usable()?;

            let received = match self.conn.receive_reply().await {
                Ok(Some(received)) => received,
                Ok(None) => {
                    self.poisoned = true;
                    return Err(Error::ConnectionClosed);
                }
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            };

            let head = match self.pending.front() {
                Some(head) => head,
                None => {
                    self.poisoned = true;
                    return Err(Error::protocol("reply without a pending call"));
                }
            };

            let (reply, fds) = received;
            match reply {
                Err(error) => {
                    // An error reply is terminal regardless of flags.
                    let discarded = head.discarded;
                    self.pending.pop_front();
                    if discarded {
                        continue;
                    }
                    return Ok((Err(error), fds));
                }
                Ok(reply) => {
                    let continues = reply.continues() == Some(true);
                    if continues && !head.more {
                        self.poisoned = true;
                        return Err(Error::protocol(
                            "continues on a reply to a non-streaming call",
                        ));
                    }
                    let discarded = head.discarded;
                    if !continues {
                        self.pending.pop_front();
                    }
                    if discarded {
                        continue;
                    }
                    return Ok((Ok(reply), fds));
                }
            }
        }
    }

    /// Call a method and receive its single reply.
    ///
    /// The call must not have `more`, `oneway` or `upgrade` set.
    pub async fn call_method(&mut self, call: &Call, fds: &[Fd]) -> Result<(ReplyResult, FdArray)> {
        if call.more() || call.oneway() || call.upgrade() {
            return Err(Error::Configuration(
                "call_method requires a plain call".into(),
            ));
        }
        self.call(call, fds).await?;
        self.next_reply().await
    }

    /// Issue a oneway call; resolves when the bytes are flushed.
    ///
    /// The call must have `oneway` set.
    pub async fn call_oneway(&mut self, call: &Call, fds: &[Fd]) -> Result<()> {
        if !call.oneway() {
            return Err(Error::Configuration(
                "call_oneway requires the oneway flag".into(),
            ));
        }
        self.call(call, fds).await
    }

    /// Issue a streaming call and return a handle yielding its replies.
    ///
    /// The call must have `more` set, and no other calls may be pending (pipelining around a
    /// stream is possible with the lower-level [`Client::call`] and [`Client::next_reply`]).
    /// The stream ends after the first reply without `continues: true`, or after an error.
    /// Dropping it earlier discards the remaining replies as they arrive.
    pub async fn call_more(&mut self, call: &Call, fds: &[Fd]) -> Result<ReplyStream<'_, S>> {
        if !call.more() {
            return Err(Error::Configuration(
                "call_more requires the more flag".into(),
            ));
        }
        if !self.pending.is_empty() {
            return Err(Error::Configuration(
                "call_more requires no outstanding calls".into(),
            ));
        }
        self.call(call, fds).await?;
        Ok(ReplyStream::new(self))
    }

    /// Issue an upgrade call and receive its first reply.
    ///
    /// After a successful reply, use [`Client::into_connection`] to take the raw connection
    /// over; subsequent bytes on it bypass the message framing.
    pub async fn call_upgrade(
        &mut self,
        call: &Call,
        fds: &[Fd],
    ) -> Result<(ReplyResult, FdArray)> {
        if !call.upgrade() {
            return Err(Error::Configuration(
                "call_upgrade requires the upgrade flag".into(),
            ));
        }
        if !self.pending.is_empty() {
            return Err(Error::Configuration(
                "call_upgrade requires no outstanding calls".into(),
            ));
        }
        self.call(call, fds).await?;
        self.next_reply().await
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn discard_head(&mut self) {
        if let Some(head) = self.pending.front_mut() {
            head.discarded = true;
        }
    }
}

impl<S: Socket> From<Connection<S>> for Client<S> {
    fn from(conn: Connection<S>) -> Self {
        Self::new(conn)
    }
}

fn validate_flags(call: &Call) -> Result<()> {
    if call.oneway() && (call.more() || call.upgrade()) {
        return Err(Error::Configuration(
            "oneway excludes the more and upgrade flags".into(),
        ));
    }
    if call.more() && call.upgrade() {
        return Err(Error::Configuration(
            "more and upgrade are mutually exclusive".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_socket::MockSocket;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn pipelined_replies_arrive_in_issue_order() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"n":1}}"#,
            r#"{"parameters":{"n":2}}"#,
            r#"{"parameters":{"n":3}}"#,
        ]);
        let log = socket.written_log();
        let mut client = Client::new(Connection::new(socket));

        for _ in 0..3 {
            client.enqueue(&Call::new("org.example.seq.Next"))?;
        }
        client.flush().await?;
        assert_eq!(client.pending_calls(), 3);

        for n in 1..=3i64 {
            let (reply, _) = client.next_reply().await?;
            assert_eq!(reply.unwrap().parameters().unwrap()["n"], json!(n));
        }
        assert_eq!(client.pending_calls(), 0);
        // All three calls left in one write.
        assert_eq!(log.lock().unwrap().writes, 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn streaming_replies_end_on_terminal() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"value":0},"continues":true}"#,
            r#"{"parameters":{"value":1},"continues":true}"#,
            r#"{"parameters":{"value":2}}"#,
        ]);
        let mut client = Client::new(Connection::new(socket));

        let call = Call::new("com.example.demo.Range")
            .set_more(true)
            .with_parameters(json!({"count": 3}));
        let mut stream = client.call_more(&call, &[]).await?;

        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            let (reply, _) = item?;
            values.push(reply.parameters().unwrap()["value"].as_i64().unwrap());
        }
        drop(stream);

        assert_eq!(values, [0, 1, 2]);
        assert_eq!(client.pending_calls(), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn oneway_calls_have_no_pending_slot() -> Result<()> {
        let socket = MockSocket::new(&[]);
        let mut client = Client::new(Connection::new(socket));

        let call = Call::new("com.example.demo.Sleep")
            .set_oneway(true)
            .with_parameters(json!({"delay": 0.01}));
        client.call_oneway(&call, &[]).await?;
        assert_eq!(client.pending_calls(), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn error_reply_is_terminal_for_streams() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"value":0},"continues":true}"#,
            r#"{"error":"com.example.demo.Failed"}"#,
        ]);
        let mut client = Client::new(Connection::new(socket));

        let call = Call::new("com.example.demo.Range").set_more(true);
        let mut stream = client.call_more(&call, &[]).await?;

        let first = stream.next().await.unwrap()?;
        assert_eq!(first.0.continues(), Some(true));
        let second = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(second, Error::Call(e) if e.name() == "com.example.demo.Failed"));
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(client.pending_calls(), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn dropped_stream_discards_remaining_replies() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"value":0},"continues":true}"#,
            r#"{"parameters":{"value":1},"continues":true}"#,
            r#"{"parameters":{"value":2}}"#,
            r#"{"parameters":{"answer":42}}"#,
        ]);
        let mut client = Client::new(Connection::new(socket));

        let call = Call::new("com.example.demo.Range").set_more(true);
        let mut stream = client.call_more(&call, &[]).await?;
        // Consume one element, then abandon the stream.
        stream.next().await.unwrap()?;
        drop(stream);

        // The next plain call sees its own reply; the tail of the stream is skipped.
        let (reply, _) = client
            .call_method(&Call::new("com.example.demo.Ask"), &[])
            .await?;
        assert_eq!(reply.unwrap().parameters().unwrap()["answer"], json!(42));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn reply_without_pending_call_poisons() {
        let socket = MockSocket::new(&[r#"{"parameters":{}}"#]);
        let mut client = Client::new(Connection::new(socket));

        let err = client.next_reply().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));

        // Everything afterwards fails fast.
        let err = client
            .call(&Call::new("org.example.seq.Next"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test_log::test(tokio::test)]
    async fn connection_close_fails_pending_calls() -> Result<()> {
        let socket = MockSocket::new(&[r#"{"parameters":{"n":1}}"#]);
        let mut client = Client::new(Connection::new(socket));

        client.enqueue(&Call::new("org.example.seq.Next"))?;
        client.enqueue(&Call::new("org.example.seq.Next"))?;
        client.flush().await?;

        // First reply arrives, then the peer hangs up with one call still pending.
        client.next_reply().await?;
        let err = client.next_reply().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn invalid_flag_combinations_are_rejected() {
        let socket = MockSocket::new(&[]);
        let mut client = Client::new(Connection::new(socket));

        let call = Call::new("org.example.seq.Next")
            .set_oneway(true)
            .set_more(true);
        let err = client.call(&call, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
