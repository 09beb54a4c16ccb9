#![deny(
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    missing_docs
)]
#![warn(unreachable_pub)]
#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

pub mod connection;
pub use connection::{Call, Connection, ErrorReply, Message, Reply, ReplyResult};
mod error;
pub use error::{Error, Result};
mod fd;
pub use fd::{Fd, FdArray, RetainUntil};
mod value;
pub use value::Value;
pub mod idl;
pub mod convert;
pub mod client;
pub use client::Client;
mod server;
pub use server::{
    listener::Listener,
    serve_connection,
    service::{self, MethodReply, Service},
    Server,
};
mod binding;
pub use binding::{CallArgs, HandlerResult, InterfaceBinding};
mod router;
pub use router::Router;
pub mod proxy;
pub use proxy::Proxy;
pub mod varlink_service;

#[doc(hidden)]
pub mod test_utils;
