//! The server protocol role.

pub(crate) mod listener;
pub mod service;

use core::future::Future;
use std::collections::VecDeque;

use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use serde_json::json;
use tracing::{trace, warn};

use crate::{
    connection::{Call, Connection, Reply, Socket, WriteConnection},
    FdArray, Result,
};
use listener::Listener;
use service::{MethodReply, OutgoingReply, ReplyItems, Service};

/// A server.
///
/// The server listens for incoming connections and handles method calls using a service. All
/// connections are driven cooperatively on the calling task; each connection's replies are
/// written in call-arrival order, and independent connections make progress concurrently.
#[derive(Debug)]
pub struct Server<Listener, Service> {
    listener: Option<Listener>,
    service: Service,
}

impl<L, Svc> Server<L, Svc>
where
    L: Listener,
    Svc: Service,
{
    /// Create a new server that serves `service` to incoming connections from `listener`.
    pub fn new(listener: L, service: Svc) -> Self {
        Self {
            listener: Some(listener),
            service,
        }
    }

    /// Run the server.
    ///
    /// Connections upgraded by an `upgrade` method are dropped after the first reply; use
    /// [`Server::run_with_upgrade`] to take them over instead.
    pub async fn run(self) -> Result<()> {
        self.run_with_upgrade(|_call, conn: Connection<L::Socket>| async move {
            drop(conn);
        })
        .await
    }

    /// Run the server, handing upgraded connections to `on_upgrade`.
    ///
    /// When a method declared as upgrading replies successfully, the connection is withdrawn
    /// from the message loop right after that reply is flushed and passed to `on_upgrade`
    /// together with the call that triggered the upgrade. The callback's future is driven
    /// alongside the remaining connections; bytes it exchanges bypass the message framing.
    pub async fn run_with_upgrade<F, Fut>(mut self, mut on_upgrade: F) -> Result<()>
    where
        F: FnMut(Call, Connection<L::Socket>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut listener = self.listener.take().expect("server already running");
        let service = &self.service;
        let mut connections = FuturesUnordered::new();
        let mut upgrades = FuturesUnordered::new();

        loop {
            futures_util::select_biased! {
                conn = listener.accept().fuse() => {
                    let conn = conn?;
                    trace!("accepted connection {}", conn.id());
                    connections.push(drive_connection(conn, service));
                }
                res = connections.select_next_some() => match res {
                    Ok(Some((call, conn))) => {
                        trace!("connection {} upgraded", conn.id());
                        upgrades.push(on_upgrade(call, conn));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("connection error: {:?}", e),
                },
                _ = upgrades.select_next_some() => {}
            }
        }
    }
}

/// Serve a single connection until the peer hangs up.
///
/// For endpoints that do not come from a listener: an inherited socket, a pipe pair or stdio.
/// Connections upgraded by an `upgrade` method are dropped after the first reply.
pub async fn serve_connection<Sock: Socket, Svc: Service>(
    conn: Connection<Sock>,
    service: &Svc,
) -> Result<()> {
    drive_connection(conn, service).await.map(|_| ())
}

/// Drive one connection until the peer hangs up, an error occurs, or an upgrade hands it off.
///
/// Calls dispatch in arrival order. While a streaming reply sequence is being written, newly
/// arriving calls are parked in a backlog and dispatched after the sequence terminates, so
/// replies on the connection keep the call-arrival order.
async fn drive_connection<Sock: Socket, Svc: Service>(
    mut conn: Connection<Sock>,
    service: &Svc,
) -> Result<Option<(Call, Connection<Sock>)>> {
    let mut backlog: VecDeque<(Call, FdArray)> = VecDeque::new();

    loop {
        let (call, fds) = match backlog.pop_front() {
            Some(queued) => queued,
            None => match conn.receive_call().await? {
                Some(received) => received,
                None => return Ok(None),
            },
        };

        let oneway = call.oneway();
        let upgrade_call = call.upgrade().then(|| call.clone());

        match service.handle(call, fds).await {
            MethodReply::None => {}
            MethodReply::Single(Ok(out)) => {
                if !oneway {
                    let reply = Reply::new(out.parameters);
                    conn.write_mut().send_reply(&reply, &out.fds).await?;
                }
            }
            MethodReply::Single(Err(error)) => {
                if !oneway {
                    conn.write_mut().send_error(&error).await?;
                }
            }
            MethodReply::Multi(items) => {
                match drive_stream(&mut conn, &mut backlog, items, oneway).await? {
                    StreamEnd::Done => {}
                    StreamEnd::PeerClosed => return Ok(None),
                }
            }
            MethodReply::Upgrade(Ok(out)) => {
                let reply = Reply::new(out.parameters);
                conn.write_mut().send_reply(&reply, &out.fds).await?;
                match upgrade_call {
                    Some(call) => return Ok(Some((call, conn))),
                    // The service upgraded a call that did not ask for it; nothing to hand
                    // over, keep serving.
                    None => {}
                }
            }
            MethodReply::Upgrade(Err(error)) => {
                if !oneway {
                    conn.write_mut().send_error(&error).await?;
                }
            }
        }
    }
}

enum StreamEnd {
    Done,
    PeerClosed,
}

/// Write out a streaming reply sequence while keeping the connection's read side live.
///
/// Every element but the last is sent with `continues: true`; the last is sent without
/// `continues` (terminal). A handler error flushes pending elements and terminates the
/// sequence. Calls arriving meanwhile go to the backlog; a peer hangup cancels the handler by
/// dropping its stream.
async fn drive_stream<Sock: Socket>(
    conn: &mut Connection<Sock>,
    backlog: &mut VecDeque<(Call, FdArray)>,
    items: ReplyItems,
    oneway: bool,
) -> Result<StreamEnd> {
    let (read, write) = conn.halves_mut();
    let mut items = items.fuse();
    // Sending element K is delayed until element K+1 (or the end) is known, so the terminal
    // element can go out without `continues`.
    let mut held: Option<OutgoingReply> = None;

    loop {
        futures_util::select_biased! {
            item = items.next() => match item {
                Some(Ok(out)) => {
                    if let Some(prev) = held.take() {
                        send_streamed(write, prev, true, oneway).await?;
                    }
                    held = Some(out);
                }
                Some(Err(error)) => {
                    if let Some(prev) = held.take() {
                        send_streamed(write, prev, true, oneway).await?;
                    }
                    if !oneway {
                        write.send_error(&error).await?;
                    }
                    return Ok(StreamEnd::Done);
                }
                None => {
                    let out = held.take().unwrap_or_else(|| {
                        OutgoingReply::new(Some(json!({})))
                    });
                    send_streamed(write, out, false, oneway).await?;
                    return Ok(StreamEnd::Done);
                }
            },
            incoming = read.receive_call().fuse() => match incoming? {
                Some(queued) => backlog.push_back(queued),
                None => return Ok(StreamEnd::PeerClosed),
            },
        }
    }
}

async fn send_streamed<Write: crate::connection::socket::WriteHalf>(
    write: &mut WriteConnection<Write>,
    out: OutgoingReply,
    continues: bool,
    oneway: bool,
) -> Result<()> {
    if oneway {
        return Ok(());
    }
    let reply = Reply::new(out.parameters).set_continues(continues.then_some(true));
    write.send_reply(&reply, &out.fds).await
}
