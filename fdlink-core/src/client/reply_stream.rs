//! The reply handle for streaming calls.

use crate::{
    connection::{Reply, Socket},
    Error, FdArray, Result,
};

use super::Client;

/// The replies of a single streaming (`more`) call, in arrival order.
///
/// This is a lazy sequence: [`ReplyStream::next`] suspends until the next reply arrives and
/// returns `None` after the terminal reply (the first one without `continues: true`) or after
/// an error. An error reply surfaces as [`Error::Call`] and ends the sequence.
///
/// Dropping the handle before the terminal reply marks the call as discarded: the remaining
/// replies still arrive and are parsed, but are thrown away as the client processes later
/// calls.
#[derive(Debug)]
pub struct ReplyStream<'c, S: Socket> {
    client: &'c mut Client<S>,
    done: bool,
}

impl<'c, S: Socket> ReplyStream<'c, S> {
    pub(super) fn new(client: &'c mut Client<S>) -> Self {
        Self {
            client,
            done: false,
        }
    }

    /// The next reply, or `None` after the sequence ended.
    pub async fn next(&mut self) -> Option<Result<(Reply, FdArray)>> {
        if self.done {
            return None;
        }

        match self.client.next_reply().await {
            Ok((Ok(reply), fds)) => {
                if reply.continues() != Some(true) {
                    self.done = true;
                }
                Some(Ok((reply, fds)))
            }
            Ok((Err(error), _fds)) => {
                self.done = true;
                Some(Err(Error::Call(error)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Collect every remaining reply into a vector.
    pub async fn collect(mut self) -> Result<Vec<(Reply, FdArray)>> {
        let mut replies = Vec::new();
        while let Some(item) = self.next().await {
            replies.push(item?);
        }
        Ok(replies)
    }
}

impl<S: Socket> Drop for ReplyStream<'_, S> {
    fn drop(&mut self) {
        if !self.done {
            self.client.discard_head();
        }
    }
}
