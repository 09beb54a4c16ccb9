//! The interface registry and call router.

use serde_json::json;

use crate::{
    binding::InterfaceBinding,
    connection::Call,
    idl::{is_valid_interface_name, split_qualified_name},
    server::service::{MethodReply, OutgoingReply, Service},
    varlink_service::{self, Info},
    Error, FdArray, Result,
};

/// A registry of interfaces, routing each call by its qualified method name.
///
/// Registration is append-only and happens before the router is handed to a
/// [`crate::Server`]; registering the same interface name twice is a configuration error.
/// When constructed with [`Router::with_info`], the router also serves the
/// `org.varlink.service` introspection interface from its registry.
#[derive(Debug, Default)]
pub struct Router {
    interfaces: Vec<InterfaceBinding>,
    info: Option<Info>,
}

impl Router {
    /// Create an empty router without the introspection interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router that serves `org.varlink.service` with the given identity.
    pub fn with_info(info: Info) -> Self {
        Self {
            interfaces: Vec::new(),
            info: Some(info),
        }
    }

    /// Register an interface.
    pub fn add(&mut self, binding: InterfaceBinding) -> Result<()> {
        let name = binding.interface().name();
        if name == varlink_service::INTERFACE.name() && self.info.is_some() {
            return Err(Error::Configuration(format!(
                "'{name}' is already served by the router"
            )));
        }
        if self.interfaces.iter().any(|b| b.interface().name() == name) {
            return Err(Error::Configuration(format!(
                "duplicate interface '{name}'"
            )));
        }
        self.interfaces.push(binding);
        Ok(())
    }

    /// The names of all served interfaces, in registration order.
    pub fn interface_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.interfaces.len() + 1);
        if self.info.is_some() {
            names.push(varlink_service::INTERFACE.name());
        }
        names.extend(self.interfaces.iter().map(|b| b.interface().name()));
        names
    }

    /// The rendered description of a served interface.
    pub fn description(&self, interface: &str) -> Option<String> {
        if interface == varlink_service::INTERFACE.name() && self.info.is_some() {
            return Some(varlink_service::INTERFACE.to_string());
        }
        self.interfaces
            .iter()
            .find(|b| b.interface().name() == interface)
            .map(|b| b.interface().to_string())
    }

    fn handle_service_call(&self, member: &str, call: &Call, info: &Info) -> MethodReply {
        let outcome = match member {
            "GetInfo" => {
                let mut parameters = match serde_json::to_value(info) {
                    Ok(parameters) => parameters,
                    Err(_) => json!({}),
                };
                parameters["interfaces"] = json!(self.interface_names());
                Ok(OutgoingReply::new(Some(parameters)))
            }
            "GetInterfaceDescription" => {
                let requested = call
                    .parameters()
                    .and_then(|p| p.get("interface"))
                    .and_then(|v| v.as_str());
                match requested {
                    Some(name) => match self.description(name) {
                        Some(description) => Ok(OutgoingReply::new(Some(
                            json!({ "description": description }),
                        ))),
                        None => Err(varlink_service::interface_not_found(name)),
                    },
                    None => Err(varlink_service::invalid_parameter("interface")),
                }
            }
            _ => Err(varlink_service::method_not_found(call.method())),
        };

        if call.oneway() {
            MethodReply::None
        } else {
            MethodReply::Single(outcome)
        }
    }
}

impl Service for Router {
    async fn handle(&self, call: Call, fds: FdArray) -> MethodReply {
        // A method whose interface part is not even a well-formed interface name cannot name
        // anything; report the whole method as unknown. A well-formed but unregistered
        // interface reports InterfaceNotFound below.
        let (interface, member) = match split_qualified_name(call.method()) {
            Some((interface, member)) if is_valid_interface_name(interface) => (interface, member),
            _ => {
                let error = varlink_service::method_not_found(call.method());
                return if call.oneway() {
                    MethodReply::None
                } else {
                    MethodReply::Single(Err(error))
                };
            }
        };

        if interface == varlink_service::INTERFACE.name() {
            if let Some(info) = &self.info {
                return self.handle_service_call(member, &call, info);
            }
        }

        let binding = self
            .interfaces
            .iter()
            .find(|b| b.interface().name() == interface);
        match binding {
            Some(binding) => {
                let member = member.to_string();
                binding.dispatch(&member, call, fds).await
            }
            None => {
                let error = varlink_service::interface_not_found(interface);
                if call.oneway() {
                    MethodReply::None
                } else {
                    MethodReply::Single(Err(error))
                }
            }
        }
    }
}
