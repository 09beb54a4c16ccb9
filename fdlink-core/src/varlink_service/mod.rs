//! Types for the `org.varlink.service` interface.
//!
//! The interface itself is served by [`crate::Router`] when constructed with
//! [`crate::Router::with_info`]; this module provides its declaration, the service identity
//! type and constructors for the standard errors every varlink service may return.

mod info;
pub use info::Info;

use serde_json::json;

use crate::{
    connection::ErrorReply,
    idl::{Interface, Method, MethodFlags, Parameter, Type, TypeRef},
};

/// The declaration of the `org.varlink.service` interface.
pub const INTERFACE: &Interface<'static> = &{
    static STRING_ARRAY: Type<'static> = Type::Array(TypeRef::new(&Type::String));
    const GET_INFO_OUTPUTS: &[Parameter<'static>] = &[
        Parameter::new("vendor", &Type::String),
        Parameter::new("product", &Type::String),
        Parameter::new("version", &Type::String),
        Parameter::new("url", &Type::String),
        Parameter::new("interfaces", &STRING_ARRAY),
    ];
    const GET_DESCRIPTION_INPUTS: &[Parameter<'static>] =
        &[Parameter::new("interface", &Type::String)];
    const GET_DESCRIPTION_OUTPUTS: &[Parameter<'static>] =
        &[Parameter::new("description", &Type::String)];
    const METHODS: &[Method<'static>] = &[
        Method::new("GetInfo", &[], GET_INFO_OUTPUTS, MethodFlags::NONE),
        Method::new(
            "GetInterfaceDescription",
            GET_DESCRIPTION_INPUTS,
            GET_DESCRIPTION_OUTPUTS,
            MethodFlags::NONE,
        ),
    ];

    Interface::new("org.varlink.service", &[], METHODS, &[])
};

/// The requested interface is not provided by this service.
pub fn interface_not_found(interface: &str) -> ErrorReply {
    ErrorReply::new("org.varlink.service.InterfaceNotFound")
        .with_parameters(json!({ "interface": interface }))
}

/// The requested method does not exist on its interface.
pub fn method_not_found(method: &str) -> ErrorReply {
    ErrorReply::new("org.varlink.service.MethodNotFound")
        .with_parameters(json!({ "method": method }))
}

/// The interface declares the method but the service does not implement it.
pub fn method_not_implemented(method: &str) -> ErrorReply {
    ErrorReply::new("org.varlink.service.MethodNotImplemented")
        .with_parameters(json!({ "method": method }))
}

/// One of the call parameters does not match the declaration.
pub fn invalid_parameter(parameter: &str) -> ErrorReply {
    ErrorReply::new("org.varlink.service.InvalidParameter")
        .with_parameters(json!({ "parameter": parameter }))
}

/// A streaming method was called without the `more` flag.
pub fn expected_more() -> ErrorReply {
    ErrorReply::new("org.varlink.service.ExpectedMore")
}

/// The client is denied access.
pub fn permission_denied() -> ErrorReply {
    ErrorReply::new("org.varlink.service.PermissionDenied")
}
