//! The wire message shapes.
//!
//! Frames are JSON objects with a small fixed vocabulary of top-level fields. Incoming frames
//! are validated strictly: an unknown top-level field is a protocol violation. Serialization
//! and deserialization are hand-written so the validation and the flag-elision rules (`false`
//! flags are never written) stay in one place.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::{Error, Result};

/// A method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    method: String,
    parameters: Option<JsonValue>,
    oneway: bool,
    more: bool,
    upgrade: bool,
}

impl Call {
    /// Create a new method call for the fully qualified `method` name.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            parameters: None,
            oneway: false,
            more: false,
            upgrade: false,
        }
    }

    /// Set the call parameters.
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Set the oneway flag.
    pub fn set_oneway(mut self, oneway: bool) -> Self {
        self.oneway = oneway;
        self
    }

    /// Set the more flag.
    pub fn set_more(mut self, more: bool) -> Self {
        self.more = more;
        self
    }

    /// Set the upgrade flag.
    pub fn set_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// The fully qualified method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The call parameters.
    pub fn parameters(&self) -> Option<&JsonValue> {
        self.parameters.as_ref()
    }

    /// Take the call parameters out of the call.
    pub fn take_parameters(&mut self) -> Option<JsonValue> {
        self.parameters.take()
    }

    /// If the method call doesn't want a reply.
    pub fn oneway(&self) -> bool {
        self.oneway
    }

    /// If the method call is requesting multiple replies.
    pub fn more(&self) -> bool {
        self.more
    }

    /// If the method call is requesting a connection upgrade.
    pub fn upgrade(&self) -> bool {
        self.upgrade
    }

    fn into_json(self) -> JsonValue {
        let mut object = JsonMap::new();
        object.insert("method".into(), JsonValue::String(self.method));
        if let Some(parameters) = self.parameters {
            object.insert("parameters".into(), parameters);
        }
        if self.oneway {
            object.insert("oneway".into(), JsonValue::Bool(true));
        }
        if self.more {
            object.insert("more".into(), JsonValue::Bool(true));
        }
        if self.upgrade {
            object.insert("upgrade".into(), JsonValue::Bool(true));
        }
        JsonValue::Object(object)
    }
}

/// A successful method call reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    parameters: Option<JsonValue>,
    continues: Option<bool>,
}

impl Reply {
    /// Create a new reply.
    pub fn new(parameters: Option<JsonValue>) -> Self {
        Self {
            parameters,
            continues: None,
        }
    }

    /// Set the continues flag.
    pub fn set_continues(mut self, continues: Option<bool>) -> Self {
        self.continues = continues;
        self
    }

    /// The parameters of the reply.
    pub fn parameters(&self) -> Option<&JsonValue> {
        self.parameters.as_ref()
    }

    /// Convert the reply into its parameters.
    pub fn into_parameters(self) -> Option<JsonValue> {
        self.parameters
    }

    /// If there are more replies to come.
    pub fn continues(&self) -> Option<bool> {
        self.continues
    }

    fn into_json(self) -> JsonValue {
        let mut object = JsonMap::new();
        if let Some(parameters) = self.parameters {
            object.insert("parameters".into(), parameters);
        }
        if let Some(continues) = self.continues {
            object.insert("continues".into(), JsonValue::Bool(continues));
        }
        JsonValue::Object(object)
    }
}

/// An error reply, naming a fully qualified error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReply {
    error: String,
    parameters: Option<JsonValue>,
}

impl ErrorReply {
    /// Create a new error reply for the fully qualified `error` name.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            parameters: None,
        }
    }

    /// Set the error parameters.
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// The fully qualified error name.
    pub fn name(&self) -> &str {
        &self.error
    }

    /// The parameters of the error.
    pub fn parameters(&self) -> Option<&JsonValue> {
        self.parameters.as_ref()
    }

    fn into_json(self) -> JsonValue {
        let mut object = JsonMap::new();
        object.insert("error".into(), JsonValue::String(self.error));
        if let Some(parameters) = self.parameters {
            object.insert("parameters".into(), parameters);
        }
        JsonValue::Object(object)
    }
}

/// The outcome of a single call: a successful reply or an error reply.
pub type ReplyResult = core::result::Result<Reply, ErrorReply>;

/// Any message that can appear in a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A method call.
    Call(Call),
    /// A successful reply.
    Reply(Reply),
    /// An error reply.
    Error(ErrorReply),
}

impl Message {
    /// Parse a single frame (without its terminator).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let json: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| Error::protocol(format!("invalid JSON in frame: {e}")))?;
        let mut object = match json {
            JsonValue::Object(object) => object,
            _ => return Err(Error::protocol("frame is not a JSON object")),
        };

        if object.contains_key("method") {
            let method = match object.remove("method") {
                Some(JsonValue::String(method)) => method,
                _ => return Err(Error::protocol("'method' is not a string")),
            };
            let parameters = take_parameters(&mut object)?;
            let oneway = take_flag(&mut object, "oneway")?;
            let more = take_flag(&mut object, "more")?;
            let upgrade = take_flag(&mut object, "upgrade")?;
            reject_unknown(&object)?;

            Ok(Message::Call(Call {
                method,
                parameters,
                oneway,
                more,
                upgrade,
            }))
        } else if object.contains_key("error") {
            let error = match object.remove("error") {
                Some(JsonValue::String(error)) => error,
                _ => return Err(Error::protocol("'error' is not a string")),
            };
            let parameters = take_parameters(&mut object)?;
            reject_unknown(&object)?;

            Ok(Message::Error(ErrorReply { error, parameters }))
        } else {
            let parameters = take_parameters(&mut object)?;
            let continues = match object.remove("continues") {
                Some(JsonValue::Bool(continues)) => Some(continues),
                Some(_) => return Err(Error::protocol("'continues' is not a boolean")),
                None => None,
            };
            reject_unknown(&object)?;

            Ok(Message::Reply(Reply {
                parameters,
                continues,
            }))
        }
    }

    /// Serialize to the minimal JSON frame body (without the terminator).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let json = match self.clone() {
            Message::Call(call) => call.into_json(),
            Message::Reply(reply) => reply.into_json(),
            Message::Error(error) => error.into_json(),
        };
        serde_json::to_vec(&json).map_err(Into::into)
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        Message::Call(call)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}

impl From<ErrorReply> for Message {
    fn from(error: ErrorReply) -> Self {
        Message::Error(error)
    }
}

fn take_parameters(object: &mut JsonMap<String, JsonValue>) -> Result<Option<JsonValue>> {
    match object.remove("parameters") {
        Some(parameters @ JsonValue::Object(_)) => Ok(Some(parameters)),
        Some(_) => Err(Error::protocol("'parameters' is not an object")),
        None => Ok(None),
    }
}

fn take_flag(object: &mut JsonMap<String, JsonValue>, name: &str) -> Result<bool> {
    match object.remove(name) {
        Some(JsonValue::Bool(flag)) => Ok(flag),
        Some(_) => Err(Error::protocol(format!("'{name}' is not a boolean"))),
        None => Ok(false),
    }
}

fn reject_unknown(object: &JsonMap<String, JsonValue>) -> Result<()> {
    match object.keys().next() {
        Some(key) => Err(Error::protocol(format!("unknown field '{key}'"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_serialization_elides_false_flags() {
        let call = Call::new("org.example.ftl.Jump")
            .with_parameters(json!({"speed": 7}))
            .set_more(true);
        let bytes = Message::from(call.clone()).to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"method":"org.example.ftl.Jump","parameters":{"speed":7},"more":true}"#
        );

        let parsed = Message::from_slice(text.as_bytes()).unwrap();
        assert_eq!(parsed, Message::Call(call));
    }

    #[test]
    fn reply_and_error_round_trip() {
        let reply = Reply::new(Some(json!({"value": 1}))).set_continues(Some(true));
        let bytes = Message::from(reply.clone()).to_bytes().unwrap();
        assert_eq!(
            Message::from_slice(&bytes).unwrap(),
            Message::Reply(reply)
        );

        let error =
            ErrorReply::new("org.example.ftl.NotEnoughEnergy").with_parameters(json!({"need": 3}));
        let bytes = Message::from(error.clone()).to_bytes().unwrap();
        assert_eq!(
            Message::from_slice(&bytes).unwrap(),
            Message::Error(error)
        );

        // An empty object is a bare reply.
        assert_eq!(
            Message::from_slice(b"{}").unwrap(),
            Message::Reply(Reply::new(None))
        );
    }

    #[test]
    fn unknown_top_level_fields_are_rejected() {
        assert!(Message::from_slice(br#"{"method":"a.b.C","id":1}"#).is_err());
        assert!(Message::from_slice(br#"{"parameters":{},"token":true}"#).is_err());
        assert!(Message::from_slice(br#"{"error":"a.b.C","more":true}"#).is_err());
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(Message::from_slice(b"[1,2]").is_err());
        assert!(Message::from_slice(b"{\"method\":7}").is_err());
        assert!(Message::from_slice(br#"{"method":"a.b.C","parameters":[1]}"#).is_err());
        assert!(Message::from_slice(br#"{"continues":"yes"}"#).is_err());
        assert!(Message::from_slice(b"{\"method\":\"a.b.C\"").is_err());
    }
}
