//! The listener trait.

use core::future::Future;

use crate::{connection::Socket, Connection, Result};

/// A listener for incoming connections.
///
/// Concrete listeners (Unix sockets, socket pairs handed in by a service manager, ...) live in
/// the endpoint crates.
pub trait Listener {
    /// The socket type of accepted connections.
    type Socket: Socket;

    /// Wait for the next incoming connection.
    fn accept(&mut self) -> impl Future<Output = Result<Connection<Self::Socket>>>;
}
