//! The client-side interface binding.
//!
//! A [`Proxy`] couples an interface declaration with a [`Client`]: invocations convert typed
//! [`Value`] arguments to wire JSON (collecting outgoing descriptors), issue the call with the
//! flags of the method declaration, and convert every reply back against the declared output
//! shape (resolving descriptor indices).

use serde_json::json;

use crate::{
    client::{Client, ReplyStream},
    connection::{Call, Socket},
    convert::{self, DeserializeContext, SerializeContext},
    idl::{Interface, Method},
    Error, Fd, FdArray, Result, Value,
};

/// Typed method handles for one interface on one client connection.
#[derive(Debug)]
pub struct Proxy<'a, 'c, S: Socket> {
    interface: &'a Interface<'a>,
    client: &'c mut Client<S>,
}

impl<'a, 'c, S: Socket> Proxy<'a, 'c, S> {
    /// Create a proxy for `interface` on `client`.
    pub fn new(client: &'c mut Client<S>, interface: &'a Interface<'a>) -> Self {
        Self { interface, client }
    }

    /// The interface declaration this proxy speaks.
    pub fn interface(&self) -> &'a Interface<'a> {
        self.interface
    }

    /// Invoke a plain method and return its converted output.
    ///
    /// `args` is a struct value matching the method's declared inputs. An error reply
    /// surfaces as [`Error::Call`].
    pub async fn invoke(&mut self, method: &str, args: Value) -> Result<Value> {
        let (decl, call, fds) = self.prepare(method, args)?;
        if decl.flags().more || decl.flags().oneway || decl.flags().upgrade {
            return Err(Error::Configuration(format!(
                "method '{method}' is not a plain call"
            )));
        }

        let (reply, reply_fds) = self.client.call_method(&call, &fds).await?;
        self.convert_reply(decl, reply, reply_fds)
    }

    /// Invoke a oneway method; resolves once the call is flushed.
    pub async fn invoke_oneway(&mut self, method: &str, args: Value) -> Result<()> {
        let (decl, call, fds) = self.prepare(method, args)?;
        if !decl.flags().oneway {
            return Err(Error::Configuration(format!(
                "method '{method}' is not oneway"
            )));
        }

        self.client.call_oneway(&call.set_oneway(true), &fds).await
    }

    /// Invoke a streaming method and return its converted reply sequence.
    pub async fn invoke_more(&mut self, method: &str, args: Value) -> Result<ValueStream<'_, 'a, S>> {
        let (decl, call, fds) = self.prepare(method, args)?;
        if !decl.flags().more {
            return Err(Error::Configuration(format!(
                "method '{method}' does not stream"
            )));
        }

        let inner = self.client.call_more(&call.set_more(true), &fds).await?;
        Ok(ValueStream {
            inner,
            interface: self.interface,
            decl,
        })
    }

    /// Invoke an upgrade method and return its converted first reply.
    ///
    /// Afterwards, drop the proxy and take the raw connection with
    /// [`Client::into_connection`]; subsequent bytes bypass the message framing.
    pub async fn invoke_upgrade(&mut self, method: &str, args: Value) -> Result<Value> {
        let (decl, call, fds) = self.prepare(method, args)?;
        if !decl.flags().upgrade {
            return Err(Error::Configuration(format!(
                "method '{method}' does not upgrade the connection"
            )));
        }

        let (reply, reply_fds) = self
            .client
            .call_upgrade(&call.set_upgrade(true), &fds)
            .await?;
        self.convert_reply(decl, reply, reply_fds)
    }

    fn prepare(&self, method: &str, args: Value) -> Result<(&'a Method<'a>, Call, Vec<Fd>)> {
        let decl = self.interface.method(method).ok_or_else(|| {
            Error::Configuration(format!(
                "interface {} declares no method '{method}'",
                self.interface.name()
            ))
        })?;

        let no_args = Default::default();
        let entries = match &args {
            Value::Map(entries) => entries,
            Value::Null => &no_args,
            _ => {
                return Err(Error::Configuration(
                    "method arguments must be a struct value".into(),
                ))
            }
        };

        let mut ctx = SerializeContext::new(self.interface);
        let parameters = convert::object_to_json(decl.inputs(), entries, false, &mut ctx)?;
        let call = Call::new(format!("{}.{}", self.interface.name(), decl.name()))
            .with_parameters(parameters);
        Ok((decl, call, ctx.into_fds()))
    }

    fn convert_reply(
        &self,
        decl: &Method<'_>,
        reply: crate::connection::ReplyResult,
        fds: FdArray,
    ) -> Result<Value> {
        match reply {
            Ok(reply) => {
                let parameters = reply.into_parameters().unwrap_or_else(|| json!({}));
                let ctx = DeserializeContext::new(self.interface, &fds);
                convert::object_from_json(decl.outputs(), &parameters, false, &ctx)
                    .map_err(Into::into)
            }
            Err(error) => Err(Error::Call(error)),
        }
    }
}

/// The converted replies of a streaming invocation, in arrival order.
///
/// Ends after the terminal reply; dropping it earlier discards the remaining replies.
#[derive(Debug)]
pub struct ValueStream<'c, 'a, S: Socket> {
    inner: ReplyStream<'c, S>,
    interface: &'a Interface<'a>,
    decl: &'a Method<'a>,
}

impl<S: Socket> ValueStream<'_, '_, S> {
    /// The next converted reply, or `None` after the sequence ended.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        let item = match self.inner.next().await? {
            Ok((reply, fds)) => {
                let parameters = reply.into_parameters().unwrap_or_else(|| json!({}));
                let ctx = DeserializeContext::new(self.interface, &fds);
                convert::object_from_json(self.decl.outputs(), &parameters, false, &ctx)
                    .map_err(Into::into)
            }
            Err(e) => Err(e),
        };
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::Connection,
        idl::{MethodFlags, Parameter, Type},
        test_utils::mock_socket::MockSocket,
    };

    static DEMO: Interface<'static> = {
        const COUNT: &[Parameter<'static>] = &[Parameter::new("count", &Type::Int)];
        const VALUE: &[Parameter<'static>] = &[Parameter::new("value", &Type::Int)];
        const OPEN_IN: &[Parameter<'static>] = &[Parameter::new("path", &Type::String)];
        const OPEN_OUT: &[Parameter<'static>] = &[Parameter::new("file", &Type::Fd)];
        const DELAY: &[Parameter<'static>] = &[Parameter::new("delay", &Type::Float)];
        const METHODS: &[Method<'static>] = &[
            Method::new("Open", OPEN_IN, OPEN_OUT, MethodFlags::NONE),
            Method::new("Range", COUNT, VALUE, MethodFlags::MORE),
            Method::new("Sleep", DELAY, &[], MethodFlags::ONEWAY),
        ];
        Interface::new("com.example.demo", &[], METHODS, &[])
    };

    #[test_log::test(tokio::test)]
    async fn invoke_converts_fd_outputs() -> Result<()> {
        let socket = MockSocket::new(&[r#"{"parameters":{"file":0}}"#])
            .with_fd_passing()
            .with_incoming_fds(vec![std::fs::File::open("/dev/null").unwrap().into()]);
        let mut client = Client::new(Connection::new(socket));
        let mut proxy = Proxy::new(&mut client, &DEMO);

        let out = proxy
            .invoke("Open", Value::map([("path", Value::from("/tmp/x"))]))
            .await?;
        let file = out.as_map().unwrap().get("file").unwrap();
        assert!(file.as_fd().is_some());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn invoke_more_converts_each_reply() -> Result<()> {
        let socket = MockSocket::new(&[
            r#"{"parameters":{"value":0},"continues":true}"#,
            r#"{"parameters":{"value":1}}"#,
        ]);
        let mut client = Client::new(Connection::new(socket));
        let mut proxy = Proxy::new(&mut client, &DEMO);

        let mut stream = proxy
            .invoke_more("Range", Value::map([("count", Value::Int(2))]))
            .await?;
        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            values.push(item?.as_map().unwrap()["value"].as_int().unwrap());
        }
        assert_eq!(values, [0, 1]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn invoke_oneway_sets_the_flag() -> Result<()> {
        let socket = MockSocket::new(&[]);
        let log = socket.written_log();
        let mut client = Client::new(Connection::new(socket));
        let mut proxy = Proxy::new(&mut client, &DEMO);

        proxy
            .invoke_oneway("Sleep", Value::map([("delay", Value::Float(0.01))]))
            .await?;

        let bytes = log.lock().unwrap().bytes.clone();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""oneway":true"#));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn error_replies_surface_as_call_errors() {
        let socket = MockSocket::new(&[
            r#"{"error":"org.varlink.service.MethodNotFound","parameters":{"method":"com.example.demo.Open"}}"#,
        ]);
        let mut client = Client::new(Connection::new(socket));
        let mut proxy = Proxy::new(&mut client, &DEMO);

        let err = proxy
            .invoke("Open", Value::map([("path", Value::from("/tmp/x"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Call(e) if e.name() == "org.varlink.service.MethodNotFound"));
    }

    #[test_log::test(tokio::test)]
    async fn unknown_and_mismatched_methods_are_configuration_errors() {
        let socket = MockSocket::new(&[]);
        let mut client = Client::new(Connection::new(socket));
        let mut proxy = Proxy::new(&mut client, &DEMO);

        let err = proxy.invoke("Missing", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = proxy.invoke("Range", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
