//! Unix domain socket transport with descriptor passing.

mod listener;
pub use listener::{bind, Listener};
mod stream;
pub use stream::{connect, Stream};

/// The connection type for Unix domain sockets.
pub type Connection = fdlink_core::Connection<Stream>;

/// The client type for Unix domain sockets.
pub type Client = fdlink_core::Client<Stream>;
