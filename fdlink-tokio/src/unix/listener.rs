use tokio::net::UnixListener;
use tracing::trace;

use fdlink_core::Result;

use super::Stream;

/// Bind a listener to the Unix domain socket at the given path.
pub fn bind<P>(path: P) -> Result<Listener>
where
    P: AsRef<std::path::Path>,
{
    UnixListener::bind(path).map(Listener).map_err(Into::into)
}

/// The [`fdlink_core::Listener`] implementation for Unix domain sockets.
#[derive(Debug)]
pub struct Listener(UnixListener);

impl fdlink_core::Listener for Listener {
    type Socket = Stream;

    async fn accept(&mut self) -> Result<super::Connection> {
        let (stream, _) = self.0.accept().await?;
        let conn = super::Connection::new(Stream::from(stream));
        trace!("connection {}: accepted", conn.id());
        Ok(conn)
    }
}

impl From<UnixListener> for Listener {
    fn from(listener: UnixListener) -> Self {
        Self(listener)
    }
}
