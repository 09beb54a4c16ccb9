//! Parser for the canonical interface description text, using winnow.
//!
//! Byte-based parsing; the grammar is ASCII. Comments (`# ...`) are treated as whitespace.

use std::borrow::Cow;

use winnow::{
    ascii::multispace0,
    combinator::{alt, separated},
    error::{ErrMode, InputError, ParserError},
    token::{literal, take_while},
    ModalResult, Parser,
};

use super::{
    CustomEnum, CustomObject, CustomType, EnumVariant, ErrorDecl, Field, Interface, Method,
    MethodFlags, Parameter, Type, TypeRef,
};

/// Parse the canonical description text into an [`Interface`] borrowing from `text`.
pub(super) fn parse_interface(text: &str) -> crate::Result<Interface<'_>> {
    let mut input = text.as_bytes();

    interface(&mut input).map_err(|_| {
        let consumed = text.len() - input.len();
        crate::Error::IdlParse(format!(
            "invalid interface description near offset {consumed}"
        ))
    })
}

fn interface<'a>(input: &mut &'a [u8]) -> ModalResult<Interface<'a>, InputError<&'a [u8]>> {
    ws(input)?;
    literal("interface").parse_next(input)?;
    take_while(1.., |c: u8| c.is_ascii_whitespace()).parse_next(input)?;
    let name = interface_name(input)?;

    let mut custom_types = Vec::new();
    let mut methods = Vec::new();
    let mut errors = Vec::new();

    loop {
        ws(input)?;
        if input.is_empty() {
            break;
        }
        if input.starts_with(b"type") {
            custom_types.push(type_def(input)?);
        } else if input.starts_with(b"method") {
            methods.push(method_def(input)?);
        } else if input.starts_with(b"error") {
            errors.push(error_def(input)?);
        } else {
            return Err(ErrMode::Cut(ParserError::from_input(input)));
        }
    }

    Ok(Interface::new_owned(name, custom_types, methods, errors))
}

/// Whitespace and comments; the `_` production of the varlink grammar.
fn ws<'a>(input: &mut &'a [u8]) -> ModalResult<(), InputError<&'a [u8]>> {
    loop {
        let start_len = input.len();

        multispace0::<_, InputError<&'a [u8]>>
            .parse_next(input)
            .ok();

        if input.starts_with(b"#") {
            while !input.is_empty() && input[0] != b'\n' && input[0] != b'\r' {
                *input = &input[1..];
            }
        }

        if input.len() == start_len {
            break;
        }
    }
    Ok(())
}

// The parsers only accept ASCII, so the sub-slice is always valid UTF-8.
fn bytes_to_str(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap()
}

/// A field name: starts with a letter, continues with alphanumerics and underscores.
fn field_name<'a>(input: &mut &'a [u8]) -> ModalResult<&'a str, InputError<&'a [u8]>> {
    let start = *input;
    if input.is_empty() || !input[0].is_ascii_alphabetic() {
        return Err(ErrMode::Backtrack(ParserError::from_input(input)));
    }

    let mut end = 1;
    while end < input.len() && (input[end].is_ascii_alphanumeric() || input[end] == b'_') {
        end += 1;
    }

    let name = bytes_to_str(&start[..end]);
    *input = &input[end..];
    Ok(name)
}

/// A type or member name: starts with an uppercase letter, continues with alphanumerics.
fn type_name<'a>(input: &mut &'a [u8]) -> ModalResult<&'a str, InputError<&'a [u8]>> {
    let start = *input;
    if input.is_empty() || !input[0].is_ascii_uppercase() {
        return Err(ErrMode::Backtrack(ParserError::from_input(input)));
    }

    let mut end = 1;
    while end < input.len() && input[end].is_ascii_alphanumeric() {
        end += 1;
    }

    let name = bytes_to_str(&start[..end]);
    *input = &input[end..];
    Ok(name)
}

/// An interface name in reverse-domain notation.
fn interface_name<'a>(input: &mut &'a [u8]) -> ModalResult<&'a str, InputError<&'a [u8]>> {
    let start = *input;
    let mut pos = 0;

    if pos >= input.len() || !input[pos].is_ascii_alphabetic() {
        return Err(ErrMode::Backtrack(ParserError::from_input(input)));
    }
    pos += 1;
    while pos < input.len() && (input[pos].is_ascii_alphanumeric() || input[pos] == b'-') {
        pos += 1;
    }

    let mut found_dot = false;
    while pos < input.len() && input[pos] == b'.' {
        pos += 1;
        if pos >= input.len() || !input[pos].is_ascii_alphanumeric() {
            return Err(ErrMode::Backtrack(ParserError::from_input(input)));
        }
        found_dot = true;
        while pos < input.len() && (input[pos].is_ascii_alphanumeric() || input[pos] == b'-') {
            pos += 1;
        }
    }

    if !found_dot {
        return Err(ErrMode::Backtrack(ParserError::from_input(input)));
    }

    let name = bytes_to_str(&start[..pos]);
    *input = &input[pos..];
    Ok(name)
}

fn primitive_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    alt((
        literal("bool").map(|_| Type::Bool),
        literal("int").map(|_| Type::Int),
        literal("float").map(|_| Type::Float),
        literal("fd").map(|_| Type::Fd),
        literal("string").map(|_| Type::String),
        literal("object").map(|_| Type::ForeignObject),
    ))
    .parse_next(input)
}

fn field<'a>(input: &mut &'a [u8]) -> ModalResult<Field<'a>, InputError<&'a [u8]>> {
    let name = field_name(input)?;
    ws(input)?;
    literal(":").parse_next(input)?;
    ws(input)?;
    let ty = varlink_type(input)?;
    Ok(Field::new_owned(name, ty))
}

/// An inline struct type: `(field1: type1, field2: type2)`.
fn struct_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    literal("(").parse_next(input)?;
    ws(input)?;
    let fields: Vec<Field<'a>> = separated(0.., field, (ws, literal(","), ws)).parse_next(input)?;
    ws(input)?;
    literal(")").parse_next(input)?;
    Ok(Type::Object(Cow::Owned(fields)))
}

/// An inline enum type: `(variant1, variant2)`.
fn enum_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    literal("(").parse_next(input)?;
    ws(input)?;
    let variants: Vec<&str> =
        separated(1.., field_name, (ws, literal(","), ws)).parse_next(input)?;
    ws(input)?;
    literal(")").parse_next(input)?;
    Ok(Type::Enum(Cow::Owned(
        variants.into_iter().map(EnumVariant::new).collect(),
    )))
}

/// An inline type; a struct if the parenthesized content contains a `:`, an empty struct if it
/// is empty, an enum otherwise.
fn inline_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    match input.iter().position(|&b| b == b')') {
        Some(pos) => {
            let content = &input[1..pos];
            if content.contains(&b':') {
                struct_type(input)
            } else if content.iter().all(|b| b.is_ascii_whitespace()) {
                literal("(").parse_next(input)?;
                ws(input)?;
                literal(")").parse_next(input)?;
                Ok(Type::Object(Cow::Borrowed(&[])))
            } else {
                enum_type(input)
            }
        }
        None => Err(ErrMode::Backtrack(ParserError::from_input(input))),
    }
}

fn element_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    alt((primitive_type, type_name.map(Type::Custom), inline_type)).parse_next(input)
}

fn optional_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    literal("?").parse_next(input)?;
    let inner = alt((array_type, map_type, element_type)).parse_next(input)?;
    Ok(Type::Optional(TypeRef::new_owned(inner)))
}

fn array_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    literal("[]").parse_next(input)?;
    let inner = varlink_type(input)?;
    Ok(Type::Array(TypeRef::new_owned(inner)))
}

/// A map type `[string]T`, or the string-set form `[string]()`.
fn map_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    literal("[string]").parse_next(input)?;
    let inner = varlink_type(input)?;
    match &inner {
        Type::Object(fields) if fields.is_empty() => Ok(Type::StringSet),
        _ => Ok(Type::Map(TypeRef::new_owned(inner))),
    }
}

fn varlink_type<'a>(input: &mut &'a [u8]) -> ModalResult<Type<'a>, InputError<&'a [u8]>> {
    alt((optional_type, array_type, map_type, element_type)).parse_next(input)
}

/// A parameter list: `(param1: type1, param2: type2)`.
fn parameter_list<'a>(
    input: &mut &'a [u8],
) -> ModalResult<Vec<Parameter<'a>>, InputError<&'a [u8]>> {
    literal("(").parse_next(input)?;
    ws(input)?;
    let params: Vec<Parameter<'a>> =
        separated(0.., field, (ws, literal(","), ws)).parse_next(input)?;
    ws(input)?;
    literal(")").parse_next(input)?;
    Ok(params)
}

/// A method definition: `method Name(inputs) -> (outputs)`.
fn method_def<'a>(input: &mut &'a [u8]) -> ModalResult<Method<'a>, InputError<&'a [u8]>> {
    literal("method").parse_next(input)?;
    take_while(1.., |c: u8| c.is_ascii_whitespace()).parse_next(input)?;
    let name = type_name(input)?;
    ws(input)?;
    let inputs = parameter_list(input)?;
    ws(input)?;
    literal("->").parse_next(input)?;
    ws(input)?;
    let outputs = parameter_list(input)?;

    Ok(Method::new_owned(name, inputs, outputs, MethodFlags::NONE))
}

/// An error definition: `error Name (fields)`.
fn error_def<'a>(input: &mut &'a [u8]) -> ModalResult<ErrorDecl<'a>, InputError<&'a [u8]>> {
    literal("error").parse_next(input)?;
    take_while(1.., |c: u8| c.is_ascii_whitespace()).parse_next(input)?;
    let name = type_name(input)?;
    ws(input)?;
    let fields = parameter_list(input)?;

    Ok(ErrorDecl::new_owned(name, fields))
}

/// A type definition: `type Name (...)`, a struct if any member is typed, an enum otherwise.
fn type_def<'a>(input: &mut &'a [u8]) -> ModalResult<CustomType<'a>, InputError<&'a [u8]>> {
    literal("type").parse_next(input)?;
    take_while(1.., |c: u8| c.is_ascii_whitespace()).parse_next(input)?;
    let name = type_name(input)?;
    ws(input)?;

    match inline_type(input)? {
        Type::Object(fields) => Ok(CustomType::Object(CustomObject::new_owned(
            name,
            fields.into_owned(),
        ))),
        Type::Enum(variants) => Ok(CustomType::Enum(CustomEnum::new_owned(
            name,
            variants.into_owned(),
        ))),
        _ => Err(ErrMode::Cut(ParserError::from_input(input))),
    }
}
