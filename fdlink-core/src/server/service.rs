//! Service-related API.

use core::future::Future;
use core::pin::Pin;

use futures_util::Stream;
use serde_json::Value as JsonValue;

use crate::{
    connection::{Call, ErrorReply},
    Fd, FdArray,
};

/// The parameters of one outgoing reply, plus the descriptors they reference.
#[derive(Debug, Default)]
pub struct OutgoingReply {
    /// The `parameters` object of the reply.
    pub parameters: Option<JsonValue>,
    /// Descriptors referenced by index from the parameters, in index order.
    pub fds: Vec<Fd>,
}

impl OutgoingReply {
    /// Create a reply with the given parameters and no descriptors.
    pub fn new(parameters: Option<JsonValue>) -> Self {
        Self {
            parameters,
            fds: Vec::new(),
        }
    }

    /// Attach descriptors, in index order.
    pub fn with_fds(mut self, fds: Vec<Fd>) -> Self {
        self.fds = fds;
        self
    }
}

/// The outcome of one reply in a sequence.
pub type ReplyOutcome = core::result::Result<OutgoingReply, ErrorReply>;

/// A lazily produced sequence of replies for a streaming method.
pub type ReplyItems = Pin<Box<dyn Stream<Item = ReplyOutcome> + Send>>;

/// What a service produced for one call.
pub enum MethodReply {
    /// Nothing is written (oneway semantics).
    None,
    /// A single reply or error.
    Single(ReplyOutcome),
    /// A streaming sequence; all elements but the last are sent with `continues: true`.
    Multi(ReplyItems),
    /// The first reply of a connection upgrade. After it is flushed the server withdraws the
    /// connection from the message loop and hands it to the upgrade callback. An error
    /// outcome cancels the upgrade and the connection stays in the loop.
    Upgrade(ReplyOutcome),
}

impl core::fmt::Debug for MethodReply {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MethodReply::None => f.write_str("None"),
            MethodReply::Single(outcome) => f.debug_tuple("Single").field(outcome).finish(),
            MethodReply::Multi(_) => f.write_str("Multi(..)"),
            MethodReply::Upgrade(outcome) => f.debug_tuple("Upgrade").field(outcome).finish(),
        }
    }
}

/// Service trait for handling method calls.
///
/// A service is shared by every connection of a server; handlers therefore take `&self` and
/// keep their state behind interior mutability. The [`crate::Router`] is the stock
/// implementation, dispatching to registered interfaces; implement this directly for servers
/// that want full control of the raw call.
pub trait Service {
    /// Handle a method call.
    ///
    /// Descriptors received with the call are handed over in `fds`; the array is dropped
    /// (releasing non-taken descriptors) when the returned future and any reply stream it
    /// yields are done.
    fn handle(&self, call: Call, fds: FdArray) -> impl Future<Output = MethodReply> + Send;
}
