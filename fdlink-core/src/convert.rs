//! Conversion between wire JSON and [`Value`]s, driven by declared types.
//!
//! Descriptor-typed fields are special: on serialization the descriptor handle is pushed into
//! the context's outgoing array and the field carries its index; on deserialization the index
//! is resolved against the message's [`FdArray`]. The same handle referenced twice serializes
//! to the same index.

use core::fmt;
use std::collections::BTreeMap;

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::{
    idl::{CustomType, Field, Interface, Type},
    Fd, FdArray, Value,
};

/// A value did not match its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    path: String,
    message: String,
}

impl ConversionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }

    fn nested(mut self, segment: &str) -> Self {
        if self.path.is_empty() || self.path.starts_with('[') {
            self.path = format!("{segment}{}", self.path);
        } else {
            self.path = format!("{segment}.{}", self.path);
        }
        self
    }

    fn in_element(mut self, index: usize) -> Self {
        self.path = format!("[{index}]{}{}", if self.path.is_empty() { "" } else { "." },
            self.path);
        self
    }

    /// The dotted path of the offending field, or the empty string at the top level.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The first path segment; what `org.varlink.service.InvalidParameter` reports.
    pub fn parameter(&self) -> &str {
        self.path
            .split(['.', '['])
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// The problem description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl core::error::Error for ConversionError {}

type Result<T> = core::result::Result<T, ConversionError>;

/// Context for [`to_json`]: resolves named types and collects outgoing descriptors.
#[derive(Debug)]
pub struct SerializeContext<'a> {
    interface: &'a Interface<'a>,
    fds: Vec<Fd>,
}

impl<'a> SerializeContext<'a> {
    /// Create a context resolving named types against `interface`.
    pub fn new(interface: &'a Interface<'a>) -> Self {
        Self {
            interface,
            fds: Vec::new(),
        }
    }

    /// The descriptors collected so far, in index order.
    pub fn fds(&self) -> &[Fd] {
        &self.fds
    }

    /// Consume the context, returning the collected descriptors.
    pub fn into_fds(self) -> Vec<Fd> {
        self.fds
    }

    fn push_fd(&mut self, fd: &Fd) -> usize {
        match self.fds.iter().position(|f| f.same_handle(fd)) {
            Some(index) => index,
            None => {
                self.fds.push(fd.clone());
                self.fds.len() - 1
            }
        }
    }
}

/// Context for [`from_json`]: resolves named types and incoming descriptor indices.
#[derive(Debug)]
pub struct DeserializeContext<'a, 'f> {
    interface: &'a Interface<'a>,
    fds: &'f FdArray,
}

impl<'a, 'f> DeserializeContext<'a, 'f> {
    /// Create a context resolving named types against `interface` and descriptor indices
    /// against `fds`.
    pub fn new(interface: &'a Interface<'a>, fds: &'f FdArray) -> Self {
        Self { interface, fds }
    }
}

/// Serialize `value` as a JSON value conforming to `ty`.
pub fn to_json(ty: &Type<'_>, value: &Value, ctx: &mut SerializeContext<'_>) -> Result<JsonValue> {
    match (ty, value) {
        (Type::Bool, Value::Bool(b)) => Ok(JsonValue::Bool(*b)),
        (Type::Int, Value::Int(i)) => Ok(json!(*i)),
        (Type::Float, Value::Float(f)) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| ConversionError::new("float is not representable in JSON")),
        (Type::Float, Value::Int(i)) => Ok(json!(*i as f64)),
        (Type::String, Value::String(s)) => Ok(JsonValue::String(s.clone())),
        (Type::ForeignObject, Value::Foreign(json)) => Ok(json.clone()),
        (Type::Fd, Value::Fd(fd)) => Ok(json!(ctx.push_fd(fd))),
        (Type::Optional(_), Value::Null) => Ok(JsonValue::Null),
        (Type::Optional(inner), _) => to_json(inner, value, ctx),
        (Type::Array(elem), Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(to_json(elem, item, ctx).map_err(|e| e.in_element(i))?);
            }
            Ok(JsonValue::Array(out))
        }
        (Type::Map(elem), Value::Map(entries)) => {
            let mut out = JsonMap::new();
            for (key, item) in entries {
                out.insert(key.clone(), to_json(elem, item, ctx).map_err(|e| e.nested(key))?);
            }
            Ok(JsonValue::Object(out))
        }
        (Type::StringSet, Value::Set(entries)) => {
            let mut out = JsonMap::new();
            for key in entries {
                out.insert(key.clone(), json!({}));
            }
            Ok(JsonValue::Object(out))
        }
        (Type::Enum(variants), Value::String(symbol)) => {
            if variants.iter().any(|v| v.name() == symbol) {
                Ok(JsonValue::String(symbol.clone()))
            } else {
                Err(ConversionError::new(format!("'{symbol}' is not a declared symbol")))
            }
        }
        (Type::Object(fields), Value::Map(entries)) => {
            object_to_json(fields.iter(), entries, false, ctx)
        }
        (Type::Custom(name), _) => match ctx.interface.custom_type(name) {
            Some(CustomType::Object(object)) => match value {
                Value::Map(entries) => {
                    object_to_json(object.fields(), entries, false, ctx)
                }
                _ => Err(mismatch(ty, value)),
            },
            Some(CustomType::Enum(custom_enum)) => match value {
                Value::String(symbol) if custom_enum.has_variant(symbol) => {
                    Ok(JsonValue::String(symbol.clone()))
                }
                Value::String(symbol) => Err(ConversionError::new(format!(
                    "'{symbol}' is not a declared symbol of {name}"
                ))),
                _ => Err(mismatch(ty, value)),
            },
            None => Err(ConversionError::new(format!("unknown type '{name}'"))),
        },
        _ => Err(mismatch(ty, value)),
    }
}

/// Serialize a struct value field by field, in declaration order.
///
/// Optional fields holding [`Value::Null`] (or absent from the map) are omitted, which is the
/// canonical output form. Entries not present in the declaration are an error.
pub fn object_to_json<'f, 'a: 'f>(
    fields: impl Iterator<Item = &'f Field<'a>>,
    entries: &BTreeMap<String, Value>,
    tolerant: bool,
    ctx: &mut SerializeContext<'_>,
) -> Result<JsonValue> {
    let mut out = JsonMap::new();
    let mut declared = Vec::new();
    for field in fields {
        let name = field.name();
        declared.push(name);
        match entries.get(name) {
            Some(value) => {
                if value.is_null() {
                    if field.ty().as_optional().is_none() {
                        return Err(
                            ConversionError::new("missing required field").nested(name)
                        );
                    }
                    // Canonical form: absent, not null.
                    continue;
                }
                let json = to_json(field.ty(), value, ctx).map_err(|e| e.nested(name))?;
                out.insert(name.to_string(), json);
            }
            None => {
                if field.ty().as_optional().is_none() {
                    return Err(ConversionError::new("missing required field").nested(name));
                }
            }
        }
    }
    if !tolerant {
        if let Some(unknown) = entries.keys().find(|k| !declared.contains(&k.as_str())) {
            return Err(ConversionError::new("unknown field").nested(unknown));
        }
    }
    Ok(JsonValue::Object(out))
}

/// Deserialize a JSON value conforming to `ty`.
pub fn from_json(ty: &Type<'_>, json: &JsonValue, ctx: &DeserializeContext<'_, '_>) -> Result<Value> {
    match ty {
        Type::Bool => match json {
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(expected("a boolean", json)),
        },
        Type::Int => match json.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => Err(expected("a 64-bit signed integer", json)),
        },
        Type::Float => match json.as_f64() {
            Some(f) => Ok(Value::Float(f)),
            None => Err(expected("a number", json)),
        },
        Type::String => match json {
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            _ => Err(expected("a string", json)),
        },
        Type::ForeignObject => Ok(Value::Foreign(json.clone())),
        Type::Fd => {
            let index = json
                .as_u64()
                .ok_or_else(|| expected("a descriptor index", json))?;
            ctx.fds
                .get(index as usize)
                .cloned()
                .map(Value::Fd)
                .ok_or_else(|| {
                    ConversionError::new(format!("descriptor index {index} out of range"))
                })
        }
        Type::Optional(inner) => match json {
            JsonValue::Null => Ok(Value::Null),
            _ => from_json(inner, json, ctx),
        },
        Type::Array(elem) => match json {
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(from_json(elem, item, ctx).map_err(|e| e.in_element(i))?);
                }
                Ok(Value::List(out))
            }
            _ => Err(expected("an array", json)),
        },
        Type::Map(elem) => match json {
            JsonValue::Object(entries) => {
                let mut out = BTreeMap::new();
                for (key, item) in entries {
                    let value = from_json(elem, item, ctx).map_err(|e| e.nested(key))?;
                    out.insert(key.clone(), value);
                }
                Ok(Value::Map(out))
            }
            _ => Err(expected("an object", json)),
        },
        Type::StringSet => match json {
            JsonValue::Object(entries) => {
                let mut out = std::collections::BTreeSet::new();
                for (key, item) in entries {
                    match item {
                        JsonValue::Object(inner) if inner.is_empty() => {
                            out.insert(key.clone());
                        }
                        _ => {
                            return Err(
                                expected("an empty object set entry", item).nested(key)
                            )
                        }
                    }
                }
                Ok(Value::Set(out))
            }
            _ => Err(expected("an object", json)),
        },
        Type::Enum(variants) => match json {
            JsonValue::String(symbol) if variants.iter().any(|v| v.name() == symbol) => {
                Ok(Value::String(symbol.clone()))
            }
            JsonValue::String(symbol) => Err(ConversionError::new(format!(
                "'{symbol}' is not a declared symbol"
            ))),
            _ => Err(expected("an enum symbol", json)),
        },
        Type::Object(fields) => object_from_json(fields.iter(), json, false, ctx),
        Type::Custom(name) => match ctx.interface.custom_type(name) {
            Some(CustomType::Object(object)) => {
                object_from_json(object.fields(), json, object.is_tolerant(), ctx)
            }
            Some(CustomType::Enum(custom_enum)) => match json {
                JsonValue::String(symbol) if custom_enum.has_variant(symbol) => {
                    Ok(Value::String(symbol.clone()))
                }
                JsonValue::String(symbol) => Err(ConversionError::new(format!(
                    "'{symbol}' is not a declared symbol of {name}"
                ))),
                _ => Err(expected("an enum symbol", json)),
            },
            None => Err(ConversionError::new(format!("unknown type '{name}'"))),
        },
    }
}

/// Deserialize a struct field by field against its declaration.
///
/// Both an absent field and an explicit `null` normalize to [`Value::Null`] for optional
/// fields; either is an error for required ones. Unknown input fields are an error unless
/// `tolerant`.
pub fn object_from_json<'f, 'a: 'f>(
    fields: impl Iterator<Item = &'f Field<'a>>,
    json: &JsonValue,
    tolerant: bool,
    ctx: &DeserializeContext<'_, '_>,
) -> Result<Value> {
    let entries = match json {
        JsonValue::Object(entries) => entries,
        _ => return Err(expected("an object", json)),
    };

    let mut out = BTreeMap::new();
    let mut known = 0;
    for field in fields {
        let name = field.name();
        match entries.get(name) {
            Some(item) => {
                known += 1;
                let value = from_json(field.ty(), item, ctx).map_err(|e| e.nested(name))?;
                out.insert(name.to_string(), value);
            }
            None => {
                if field.ty().as_optional().is_none() {
                    return Err(ConversionError::new("missing required field").nested(name));
                }
                out.insert(name.to_string(), Value::Null);
            }
        }
    }
    if !tolerant && known < entries.len() {
        let unknown = entries
            .keys()
            .find(|k| !out.contains_key(*k))
            .cloned()
            .unwrap_or_default();
        return Err(ConversionError::new("unknown field").nested(&unknown));
    }
    Ok(Value::Map(out))
}

fn mismatch(ty: &Type<'_>, value: &Value) -> ConversionError {
    ConversionError::new(format!("value {value:?} does not conform to '{ty}'"))
}

fn expected(what: &str, json: &JsonValue) -> ConversionError {
    ConversionError::new(format!("expected {what}, got {json}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{
        CustomEnum, CustomObject, EnumVariant, Interface, Method, MethodFlags, Parameter, TypeRef,
    };
    use std::os::fd::OwnedFd;

    fn test_interface() -> Interface<'static> {
        Interface::new_owned(
            "org.example.test",
            vec![
                CustomType::Object(CustomObject::new_owned(
                    "Entry",
                    vec![
                        Field::new_owned("name", Type::String),
                        Field::new_owned("size", Type::Optional(TypeRef::new_owned(Type::Int))),
                    ],
                )),
                CustomType::Object(
                    CustomObject::new_owned(
                        "Loose",
                        vec![Field::new_owned("name", Type::String)],
                    )
                    .tolerant(),
                ),
                CustomType::Enum(CustomEnum::new_owned(
                    "Mode",
                    vec![EnumVariant::new("read"), EnumVariant::new("write")],
                )),
            ],
            vec![Method::new_owned(
                "Open",
                vec![Parameter::new_owned("path", Type::String)],
                vec![Parameter::new_owned("file", Type::Fd)],
                MethodFlags::NONE,
            )],
            vec![],
        )
    }

    fn dev_null_fd() -> Fd {
        let owned: OwnedFd = std::fs::File::open("/dev/null").unwrap().into();
        Fd::from(owned)
    }

    #[test]
    fn primitives_round_trip() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        for (ty, value) in [
            (Type::Bool, Value::Bool(true)),
            (Type::Int, Value::Int(-42)),
            (Type::Float, Value::Float(1.5)),
            (Type::String, Value::String("hello".into())),
        ] {
            let mut ser = SerializeContext::new(&interface);
            let json = to_json(&ty, &value, &mut ser).unwrap();
            assert_eq!(from_json(&ty, &json, &de).unwrap(), value);
        }
    }

    #[test]
    fn int_range_is_enforced() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        let too_big = json!(u64::MAX);
        assert!(from_json(&Type::Int, &too_big, &de).is_err());
        let not_integer = json!(1.5);
        assert!(from_json(&Type::Int, &not_integer, &de).is_err());
        // A JSON integer is fine in a float position.
        assert_eq!(
            from_json(&Type::Float, &json!(3), &de).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn optional_absent_and_null_are_equivalent() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);
        let ty = Type::Custom("Entry");

        let absent = json!({"name": "a"});
        let null = json!({"name": "a", "size": null});
        let expected = Value::map([("name", Value::from("a")), ("size", Value::Null)]);
        assert_eq!(from_json(&ty, &absent, &de).unwrap(), expected);
        assert_eq!(from_json(&ty, &null, &de).unwrap(), expected);

        // Canonical output omits the field entirely.
        let mut ser = SerializeContext::new(&interface);
        let out = to_json(&ty, &expected, &mut ser).unwrap();
        assert_eq!(out, json!({"name": "a"}));
    }

    #[test]
    fn null_inside_list_is_kept() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);
        let ty = Type::Array(TypeRef::new_owned(Type::Optional(TypeRef::new_owned(
            Type::Int,
        ))));

        let value = Value::List(vec![Value::Int(1), Value::Null, Value::Int(3)]);
        let mut ser = SerializeContext::new(&interface);
        let json = to_json(&ty, &value, &mut ser).unwrap();
        assert_eq!(json, json!([1, null, 3]));
        assert_eq!(from_json(&ty, &json, &de).unwrap(), value);
    }

    #[test]
    fn string_set_wire_form() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        let value = Value::set(["a", "b"]);
        let mut ser = SerializeContext::new(&interface);
        let json = to_json(&Type::StringSet, &value, &mut ser).unwrap();
        assert_eq!(json, json!({"a": {}, "b": {}}));
        assert_eq!(from_json(&Type::StringSet, &json, &de).unwrap(), value);

        let bad = json!({"a": 1});
        assert!(from_json(&Type::StringSet, &bad, &de).is_err());
    }

    #[test]
    fn unknown_fields_rejected_unless_tolerant() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        let json = json!({"name": "a", "extra": 1});
        let err = from_json(&Type::Custom("Entry"), &json, &de).unwrap_err();
        assert_eq!(err.parameter(), "extra");

        let loose = from_json(&Type::Custom("Loose"), &json, &de).unwrap();
        assert_eq!(loose, Value::map([("name", Value::from("a"))]));
    }

    #[test]
    fn enum_symbols_are_checked() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);
        let ty = Type::Custom("Mode");

        assert_eq!(
            from_json(&ty, &json!("read"), &de).unwrap(),
            Value::String("read".into())
        );
        assert!(from_json(&ty, &json!("append"), &de).is_err());

        let mut ser = SerializeContext::new(&interface);
        assert!(to_json(&ty, &Value::String("append".into()), &mut ser).is_err());
    }

    #[test]
    fn fd_fields_become_indices() {
        let interface = test_interface();
        let fd = dev_null_fd();
        let other = dev_null_fd();

        let ty = Type::Object(
            vec![
                Field::new_owned("a", Type::Fd),
                Field::new_owned("b", Type::Fd),
                Field::new_owned("c", Type::Fd),
            ]
            .into(),
        );
        let value = Value::map([
            ("a", Value::Fd(fd.clone())),
            ("b", Value::Fd(other.clone())),
            // Same handle as `a`: must reuse the same index.
            ("c", Value::Fd(fd.clone())),
        ]);

        let mut ser = SerializeContext::new(&interface);
        let json = to_json(&ty, &value, &mut ser).unwrap();
        assert_eq!(json, json!({"a": 0, "b": 1, "c": 0}));
        let fds = ser.into_fds();
        assert_eq!(fds.len(), 2);
        assert!(fds[0].same_handle(&fd));
        assert!(fds[1].same_handle(&other));

        // And back: identity is preserved through the array.
        let array = FdArray::from_owned(vec![
            fd.try_clone_owned().unwrap(),
            other.try_clone_owned().unwrap(),
        ]);
        let de = DeserializeContext::new(&interface, &array);
        let back = from_json(&ty, &json, &de).unwrap();
        let map = back.as_map().unwrap();
        assert!(map["a"].as_fd().unwrap().same_handle(array.get(0).unwrap()));
        assert!(map["c"].as_fd().unwrap().same_handle(array.get(0).unwrap()));
        assert!(map["b"].as_fd().unwrap().same_handle(array.get(1).unwrap()));
    }

    #[test]
    fn fd_index_out_of_range() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        let err = from_json(&Type::Fd, &json!(0), &de).unwrap_err();
        assert!(err.message().contains("out of range"));
        assert!(from_json(&Type::Fd, &json!(-1), &de).is_err());
    }

    #[test]
    fn error_paths_are_dotted() {
        let interface = test_interface();
        let fds = FdArray::new();
        let de = DeserializeContext::new(&interface, &fds);

        let ty = Type::Object(
            vec![Field::new_owned(
                "entries",
                Type::Array(TypeRef::new_owned(Type::Custom("Entry"))),
            )]
            .into(),
        );
        let json = json!({"entries": [{"name": "ok"}, {"name": 7}]});
        let err = from_json(&ty, &json, &de).unwrap_err();
        assert_eq!(err.parameter(), "entries");
        assert_eq!(err.path(), "entries[1].name");
    }
}
