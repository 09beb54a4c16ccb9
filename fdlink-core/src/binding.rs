//! The server-side interface binding.
//!
//! An [`InterfaceBinding`] couples an interface declaration with a dispatch table of handler
//! closures, keyed by method name and populated at registration time. Dispatch resolves the
//! method declaration, converts the call parameters to [`Value`]s (resolving descriptor
//! indices), invokes the handler and converts everything it produces back to wire JSON.

use core::future::Future;
use core::pin::Pin;
use std::collections::HashMap;

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::warn;

use crate::{
    connection::{Call, ErrorReply},
    convert::{self, DeserializeContext, SerializeContext},
    idl::{is_valid_interface_name, CustomType, Interface, Method, Type},
    server::service::{MethodReply, OutgoingReply, ReplyOutcome},
    varlink_service, Error, FdArray, Result, Value,
};

/// The converted arguments of one call.
#[derive(Debug)]
pub struct CallArgs {
    /// The input parameters as a struct value, with descriptor fields resolved to handles.
    pub parameters: Value,
    /// The raw descriptor array of the call, for handlers that want to `take` or retain it.
    pub fds: FdArray,
}

impl CallArgs {
    /// The value of the input field `name`.
    ///
    /// Returns [`Value::Null`] for fields the declaration does not name.
    pub fn get(&self, name: &str) -> &Value {
        self.parameters
            .as_map()
            .and_then(|map| map.get(name))
            .unwrap_or(&Value::Null)
    }
}

/// What a plain handler resolves to: an output struct value or a domain error.
///
/// Domain error parameters are raw JSON built by the handler (see
/// [`crate::connection::ErrorReply::with_parameters`]); they are passed through without
/// conversion and therefore cannot reference descriptors.
pub type HandlerResult = core::result::Result<Value, ErrorReply>;

type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type HandlerStream = Pin<Box<dyn Stream<Item = HandlerResult> + Send>>;

enum MethodHandler {
    Call(Box<dyn Fn(CallArgs) -> HandlerFuture + Send + Sync>),
    Stream(Box<dyn Fn(CallArgs) -> HandlerStream + Send + Sync>),
}

impl core::fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MethodHandler::Call(_) => f.write_str("Call(..)"),
            MethodHandler::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An interface declaration bound to its method handlers.
#[derive(Debug)]
pub struct InterfaceBinding {
    interface: &'static Interface<'static>,
    handlers: HashMap<&'static str, MethodHandler>,
}

impl InterfaceBinding {
    /// Create a binding for `interface`, validating the declaration.
    ///
    /// Fails with [`Error::Configuration`] on an invalid interface name, duplicate member
    /// names, invalid flag combinations, unresolvable type references, or an output
    /// declaration on a oneway method.
    pub fn new(interface: &'static Interface<'static>) -> Result<Self> {
        validate(interface)?;
        Ok(Self {
            interface,
            handlers: HashMap::new(),
        })
    }

    /// The bound interface declaration.
    pub fn interface(&self) -> &'static Interface<'static> {
        self.interface
    }

    /// Register the handler for a non-streaming method.
    ///
    /// The handler receives the converted [`CallArgs`] and resolves to an output struct value
    /// (or a domain error). Upgrade methods register here too: their handler produces the
    /// first reply, after which the server hands the connection over. For oneway methods the
    /// handler runs but its result is discarded.
    pub fn on<F, Fut>(mut self, method: &'static str, handler: F) -> Result<Self>
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let decl = self.declared(method)?;
        if decl.flags().more {
            return Err(Error::Configuration(format!(
                "method '{method}' streams; register it with on_stream"
            )));
        }
        self.insert(
            method,
            MethodHandler::Call(Box::new(move |args| Box::pin(handler(args)))),
        )?;
        Ok(self)
    }

    /// Register the handler for a streaming (`more`) method.
    ///
    /// The handler returns a lazy sequence of output struct values; each is converted and
    /// sent as one reply, all but the last with `continues: true`.
    pub fn on_stream<F, St>(mut self, method: &'static str, handler: F) -> Result<Self>
    where
        F: Fn(CallArgs) -> St + Send + Sync + 'static,
        St: Stream<Item = HandlerResult> + Send + 'static,
    {
        let decl = self.declared(method)?;
        if !decl.flags().more {
            return Err(Error::Configuration(format!(
                "method '{method}' does not stream; register it with on"
            )));
        }
        self.insert(
            method,
            MethodHandler::Stream(Box::new(move |args| Box::pin(handler(args)))),
        )?;
        Ok(self)
    }

    fn declared(&self, method: &str) -> Result<&'static Method<'static>> {
        self.interface.method(method).ok_or_else(|| {
            Error::Configuration(format!(
                "interface {} declares no method '{method}'",
                self.interface.name()
            ))
        })
    }

    fn insert(&mut self, method: &'static str, handler: MethodHandler) -> Result<()> {
        if self.handlers.insert(method, handler).is_some() {
            return Err(Error::Configuration(format!(
                "duplicate handler for method '{method}'"
            )));
        }
        Ok(())
    }

    /// Dispatch a call to the member `method` of this interface.
    pub(crate) async fn dispatch(&self, method: &str, mut call: Call, fds: FdArray) -> MethodReply {
        let full_name = call.method().to_string();
        let interface = self.interface;
        let decl = match interface.method(method) {
            Some(decl) => decl,
            None => {
                return error_reply(&call, varlink_service::method_not_found(&full_name));
            }
        };

        let flags = decl.flags();
        if flags.more && !call.more() {
            return error_reply(&call, varlink_service::expected_more());
        }
        if flags.upgrade != call.upgrade() {
            return error_reply(&call, varlink_service::invalid_parameter("upgrade"));
        }

        let parameters = call.take_parameters().unwrap_or_else(|| json!({}));
        let ctx = DeserializeContext::new(interface, &fds);
        let parameters = match convert::object_from_json(decl.inputs(), &parameters, false, &ctx) {
            Ok(parameters) => parameters,
            Err(e) => {
                return error_reply(&call, varlink_service::invalid_parameter(e.parameter()));
            }
        };

        let handler = match self.handlers.get(method) {
            Some(handler) => handler,
            None => {
                return error_reply(&call, varlink_service::method_not_implemented(&full_name));
            }
        };

        let args = CallArgs { parameters, fds };
        match handler {
            MethodHandler::Call(handler) => {
                let outcome = handler(args).await;
                if flags.oneway {
                    return MethodReply::None;
                }
                let outcome = convert_outcome(interface, decl, outcome);
                if flags.upgrade {
                    MethodReply::Upgrade(outcome)
                } else {
                    MethodReply::Single(outcome)
                }
            }
            MethodHandler::Stream(handler) => {
                let items = handler(args)
                    .map(move |outcome| convert_outcome(interface, decl, outcome));
                MethodReply::Multi(Box::pin(items))
            }
        }
    }
}

fn error_reply(call: &Call, error: ErrorReply) -> MethodReply {
    if call.oneway() {
        MethodReply::None
    } else {
        MethodReply::Single(Err(error))
    }
}

fn convert_outcome(
    interface: &'static Interface<'static>,
    decl: &Method<'_>,
    outcome: HandlerResult,
) -> ReplyOutcome {
    let value = match outcome {
        Ok(value) => value,
        Err(error) => return Err(error),
    };

    let entries = match &value {
        Value::Map(entries) => entries,
        _ => {
            warn!(
                "handler for {}.{} returned a non-struct value",
                interface.name(),
                decl.name()
            );
            return Err(varlink_service::invalid_parameter(""));
        }
    };

    let mut ctx = SerializeContext::new(interface);
    match convert::object_to_json(decl.outputs(), entries, false, &mut ctx) {
        Ok(parameters) => Ok(OutgoingReply::new(Some(parameters)).with_fds(ctx.into_fds())),
        Err(e) => {
            warn!(
                "handler output for {}.{} does not match its declaration: {e}",
                interface.name(),
                decl.name()
            );
            Err(varlink_service::invalid_parameter(e.parameter()))
        }
    }
}

fn validate(interface: &Interface<'static>) -> Result<()> {
    let name = interface.name();
    if !is_valid_interface_name(name) {
        return Err(Error::Configuration(format!(
            "'{name}' is not a valid interface name"
        )));
    }

    let mut seen = Vec::new();
    for custom_type in interface.custom_types() {
        if seen.contains(&custom_type.name()) {
            return Err(Error::Configuration(format!(
                "duplicate type '{}' in {name}",
                custom_type.name()
            )));
        }
        seen.push(custom_type.name());
        match custom_type {
            CustomType::Object(object) => {
                for field in object.fields() {
                    validate_type(interface, field.ty())?;
                }
            }
            CustomType::Enum(custom_enum) => {
                if custom_enum.variants().next().is_none() {
                    return Err(Error::Configuration(format!(
                        "enum '{}' in {name} has no variants",
                        custom_enum.name()
                    )));
                }
            }
        }
    }

    let mut seen = Vec::new();
    for method in interface.methods() {
        if seen.contains(&method.name()) {
            return Err(Error::Configuration(format!(
                "duplicate method '{}' in {name}",
                method.name()
            )));
        }
        seen.push(method.name());
        if !method.flags().is_valid() {
            return Err(Error::Configuration(format!(
                "method '{}' in {name} has conflicting flags",
                method.name()
            )));
        }
        if method.flags().oneway && method.outputs().next().is_some() {
            return Err(Error::Configuration(format!(
                "oneway method '{}' in {name} declares outputs",
                method.name()
            )));
        }
        for parameter in method.inputs().chain(method.outputs()) {
            validate_type(interface, parameter.ty())?;
        }
    }

    for error in interface.errors() {
        for field in error.fields() {
            validate_type(interface, field.ty())?;
        }
    }

    Ok(())
}

fn validate_type(interface: &Interface<'_>, ty: &Type<'_>) -> Result<()> {
    match ty {
        Type::Optional(inner) | Type::Array(inner) | Type::Map(inner) => {
            validate_type(interface, inner)
        }
        Type::Custom(name) => {
            if interface.custom_type(name).is_none() {
                return Err(Error::Configuration(format!(
                    "unresolved type reference '{name}' in {}",
                    interface.name()
                )));
            }
            Ok(())
        }
        Type::Object(fields) => {
            for field in fields.iter() {
                validate_type(interface, field.ty())?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{Field, MethodFlags, Parameter};
    use futures_util::stream;

    static DEMO: Interface<'static> = {
        const COUNT: &[Parameter<'static>] = &[Parameter::new("count", &Type::Int)];
        const VALUE: &[Parameter<'static>] = &[Parameter::new("value", &Type::Int)];
        const ECHO_IN: &[Parameter<'static>] = &[Parameter::new("text", &Type::String)];
        const ECHO_OUT: &[Parameter<'static>] = &[Parameter::new("text", &Type::String)];
        const METHODS: &[Method<'static>] = &[
            Method::new("Echo", ECHO_IN, ECHO_OUT, MethodFlags::NONE),
            Method::new("Range", COUNT, VALUE, MethodFlags::MORE),
            Method::new("Quit", &[], &[], MethodFlags::ONEWAY),
        ];
        Interface::new("com.example.demo", &[], METHODS, &[])
    };

    fn demo_binding() -> InterfaceBinding {
        InterfaceBinding::new(&DEMO)
            .unwrap()
            .on("Echo", |args: CallArgs| async move {
                let text = args.get("text").clone();
                Ok(Value::map([("text", text)]))
            })
            .unwrap()
            .on_stream("Range", |args: CallArgs| {
                let count = args.get("count").as_int().unwrap_or_default();
                stream::iter(
                    (0..count).map(|value| Ok(Value::map([("value", Value::Int(value))]))),
                )
            })
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn echo_converts_both_ways() {
        let binding = demo_binding();
        let call = Call::new("com.example.demo.Echo").with_parameters(json!({"text": "hi"}));
        match binding.dispatch("Echo", call, FdArray::new()).await {
            MethodReply::Single(Ok(out)) => {
                assert_eq!(out.parameters.unwrap(), json!({"text": "hi"}));
                assert!(out.fds.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn bad_parameters_name_the_field() {
        let binding = demo_binding();
        let call = Call::new("com.example.demo.Echo").with_parameters(json!({"text": 5}));
        match binding.dispatch("Echo", call, FdArray::new()).await {
            MethodReply::Single(Err(error)) => {
                assert_eq!(error.name(), "org.varlink.service.InvalidParameter");
                assert_eq!(error.parameters().unwrap()["parameter"], json!("text"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn streaming_without_more_is_refused() {
        let binding = demo_binding();
        let call = Call::new("com.example.demo.Range").with_parameters(json!({"count": 2}));
        match binding.dispatch("Range", call, FdArray::new()).await {
            MethodReply::Single(Err(error)) => {
                assert_eq!(error.name(), "org.varlink.service.ExpectedMore");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn streaming_yields_converted_items() {
        let binding = demo_binding();
        let call = Call::new("com.example.demo.Range")
            .set_more(true)
            .with_parameters(json!({"count": 2}));
        let mut items = match binding.dispatch("Range", call, FdArray::new()).await {
            MethodReply::Multi(items) => items,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let first = items.next().await.unwrap().unwrap();
        assert_eq!(first.parameters.unwrap(), json!({"value": 0}));
        let second = items.next().await.unwrap().unwrap();
        assert_eq!(second.parameters.unwrap(), json!({"value": 1}));
        assert!(items.next().await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn unimplemented_and_unknown_methods() {
        let binding = InterfaceBinding::new(&DEMO).unwrap();
        let call = Call::new("com.example.demo.Echo").with_parameters(json!({"text": "x"}));
        match binding.dispatch("Echo", call, FdArray::new()).await {
            MethodReply::Single(Err(error)) => {
                assert_eq!(error.name(), "org.varlink.service.MethodNotImplemented");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let call = Call::new("com.example.demo.Missing");
        match binding.dispatch("Missing", call, FdArray::new()).await {
            MethodReply::Single(Err(error)) => {
                assert_eq!(error.name(), "org.varlink.service.MethodNotFound");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn oneway_discards_handler_result() {
        let binding = InterfaceBinding::new(&DEMO)
            .unwrap()
            .on("Quit", |_args| async move { Ok(Value::map::<&str, _>([])) })
            .unwrap();
        let call = Call::new("com.example.demo.Quit").set_oneway(true);
        match binding.dispatch("Quit", call, FdArray::new()).await {
            MethodReply::None => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn registration_errors() {
        // Unknown method.
        let err = InterfaceBinding::new(&DEMO)
            .unwrap()
            .on("Missing", |_args| async move { Ok(Value::Null) })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        // Streaming method registered as plain.
        let err = InterfaceBinding::new(&DEMO)
            .unwrap()
            .on("Range", |_args| async move { Ok(Value::Null) })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        // Invalid declarations.
        static BAD_NAME: Interface<'static> = Interface::new("nodots", &[], &[], &[]);
        assert!(InterfaceBinding::new(&BAD_NAME).is_err());

        static BAD_REF: Interface<'static> = {
            const OUT: &[Field<'static>] = &[Field::new("x", &Type::Custom("Missing"))];
            const METHODS: &[Method<'static>] =
                &[Method::new("Get", &[], OUT, MethodFlags::NONE)];
            Interface::new("org.example.bad", &[], METHODS, &[])
        };
        assert!(InterfaceBinding::new(&BAD_REF).is_err());
    }
}
