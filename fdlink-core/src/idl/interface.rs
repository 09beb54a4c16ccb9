//! Interface definitions.

use core::fmt;
use std::borrow::Cow;

use crate::Error;

use super::{CustomType, ErrorDecl, Method};

/// An interface definition: a reverse-domain name plus its custom types, methods and errors.
///
/// Declared once and immutable thereafter. The member collections are copy-on-write slices:
/// in-code declarations borrow `const` slices, the parser produces owned vectors. Rendering
/// via [`fmt::Display`] produces the canonical interface description text;
/// [`Interface::try_from`] parses it back.
#[derive(Debug, Clone, Eq)]
pub struct Interface<'a> {
    name: &'a str,
    custom_types: Cow<'a, [CustomType<'a>]>,
    methods: Cow<'a, [Method<'a>]>,
    errors: Cow<'a, [ErrorDecl<'a>]>,
}

impl<'a> Interface<'a> {
    /// Creates a new interface with borrowed collections.
    pub const fn new(
        name: &'a str,
        custom_types: &'a [CustomType<'a>],
        methods: &'a [Method<'a>],
        errors: &'a [ErrorDecl<'a>],
    ) -> Self {
        Self {
            name,
            custom_types: Cow::Borrowed(custom_types),
            methods: Cow::Borrowed(methods),
            errors: Cow::Borrowed(errors),
        }
    }

    /// Creates a new interface with owned collections.
    pub fn new_owned(
        name: &'a str,
        custom_types: Vec<CustomType<'a>>,
        methods: Vec<Method<'a>>,
        errors: Vec<ErrorDecl<'a>>,
    ) -> Self {
        Self {
            name,
            custom_types: Cow::Owned(custom_types),
            methods: Cow::Owned(methods),
            errors: Cow::Owned(errors),
        }
    }

    /// The name of the interface in reverse-domain notation.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// An iterator over the custom types of the interface.
    pub fn custom_types(&self) -> impl Iterator<Item = &CustomType<'a>> {
        self.custom_types.iter()
    }

    /// An iterator over the methods of the interface.
    pub fn methods(&self) -> impl Iterator<Item = &Method<'a>> {
        self.methods.iter()
    }

    /// An iterator over the errors of the interface.
    pub fn errors(&self) -> impl Iterator<Item = &ErrorDecl<'a>> {
        self.errors.iter()
    }

    /// Look up a method by its unqualified name.
    pub fn method(&self, name: &str) -> Option<&Method<'a>> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Look up a custom type by name.
    pub fn custom_type(&self, name: &str) -> Option<&CustomType<'a>> {
        self.custom_types.iter().find(|t| t.name() == name)
    }

    /// Look up an error by its unqualified name.
    pub fn error(&self, name: &str) -> Option<&ErrorDecl<'a>> {
        self.errors.iter().find(|e| e.name() == name)
    }

    /// Whether the interface has no members.
    pub fn is_empty(&self) -> bool {
        self.custom_types.is_empty() && self.methods.is_empty() && self.errors.is_empty()
    }
}

impl<'a> fmt::Display for Interface<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface {}", self.name)?;
        for custom_type in self.custom_types.iter() {
            write!(f, "\n\n{custom_type}")?;
        }
        for method in self.methods.iter() {
            write!(f, "\n\n{method}")?;
        }
        for error in self.errors.iter() {
            write!(f, "\n\n{error}")?;
        }
        Ok(())
    }
}

impl<'a> TryFrom<&'a str> for Interface<'a> {
    type Error = Error;

    fn try_from(value: &'a str) -> Result<Self, Error> {
        super::parse::parse_interface(value)
    }
}

impl PartialEq for Interface<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.custom_types == other.custom_types
            && self.methods == other.methods
            && self.errors == other.errors
    }
}

/// Whether `name` is a valid interface name: at least two dot-separated segments, each
/// starting with a letter and continuing with lowercase alphanumerics or hyphens.
pub fn is_valid_interface_name(name: &str) -> bool {
    let mut segments = 0;
    for segment in name.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

/// Split a fully qualified `<interface>.<Member>` name at the last dot.
pub fn split_qualified_name(full: &str) -> Option<(&str, &str)> {
    let (interface, member) = full.rsplit_once('.')?;
    if interface.is_empty() || member.is_empty() {
        return None;
    }
    Some((interface, member))
}
