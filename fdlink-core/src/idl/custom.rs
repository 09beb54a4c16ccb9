//! Named custom type definitions.

use core::fmt;
use std::borrow::Cow;

use super::{EnumVariant, Field};

/// A named struct type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomObject<'a> {
    name: &'a str,
    fields: Cow<'a, [Field<'a>]>,
    tolerant: bool,
}

impl<'a> CustomObject<'a> {
    /// Creates a new object type with the given name and borrowed fields.
    pub const fn new(name: &'a str, fields: &'a [Field<'a>]) -> Self {
        Self {
            name,
            fields: Cow::Borrowed(fields),
            tolerant: false,
        }
    }

    /// Creates a new object type with the given name and owned fields.
    pub fn new_owned(name: &'a str, fields: Vec<Field<'a>>) -> Self {
        Self {
            name,
            fields: Cow::Owned(fields),
            tolerant: false,
        }
    }

    /// Accept (and drop) unknown fields when converting values of this type from JSON.
    ///
    /// By default unknown fields are a conversion error.
    pub const fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    /// The name of the object type.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// An iterator over the fields of the object type.
    pub fn fields(&self) -> impl Iterator<Item = &Field<'a>> {
        self.fields.iter()
    }

    /// Whether unknown input fields are accepted.
    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }
}

impl<'a> fmt::Display for CustomObject<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {} (", self.name)?;
        let mut first = true;
        for field in self.fields.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{field}")?;
        }
        write!(f, ")")
    }
}

/// A named enum type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEnum<'a> {
    name: &'a str,
    variants: Cow<'a, [EnumVariant<'a>]>,
}

impl<'a> CustomEnum<'a> {
    /// Creates a new enum type with the given name and borrowed variants.
    pub const fn new(name: &'a str, variants: &'a [EnumVariant<'a>]) -> Self {
        Self {
            name,
            variants: Cow::Borrowed(variants),
        }
    }

    /// Creates a new enum type with the given name and owned variants.
    pub fn new_owned(name: &'a str, variants: Vec<EnumVariant<'a>>) -> Self {
        Self {
            name,
            variants: Cow::Owned(variants),
        }
    }

    /// The name of the enum type.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// An iterator over the variants.
    pub fn variants(&self) -> impl Iterator<Item = &EnumVariant<'a>> {
        self.variants.iter()
    }

    /// Whether `symbol` is one of the declared variants.
    pub fn has_variant(&self, symbol: &str) -> bool {
        self.variants.iter().any(|v| v.name() == symbol)
    }
}

impl<'a> fmt::Display for CustomEnum<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {} (", self.name)?;
        let mut first = true;
        for variant in self.variants.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", variant.name())?;
        }
        write!(f, ")")
    }
}

/// A named type declared by an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomType<'a> {
    /// A struct with named fields.
    Object(CustomObject<'a>),
    /// A finite set of symbols.
    Enum(CustomEnum<'a>),
}

impl<'a> CustomType<'a> {
    /// The name of the custom type.
    pub fn name(&self) -> &'a str {
        match self {
            CustomType::Object(object) => object.name(),
            CustomType::Enum(custom_enum) => custom_enum.name(),
        }
    }

    /// The object definition, if this is a struct type.
    pub const fn as_object(&self) -> Option<&CustomObject<'a>> {
        match self {
            CustomType::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The enum definition, if this is an enum type.
    pub const fn as_enum(&self) -> Option<&CustomEnum<'a>> {
        match self {
            CustomType::Enum(custom_enum) => Some(custom_enum),
            _ => None,
        }
    }
}

impl<'a> fmt::Display for CustomType<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomType::Object(object) => write!(f, "{object}"),
            CustomType::Enum(custom_enum) => write!(f, "{custom_enum}"),
        }
    }
}

impl<'a> From<CustomObject<'a>> for CustomType<'a> {
    fn from(object: CustomObject<'a>) -> Self {
        CustomType::Object(object)
    }
}

impl<'a> From<CustomEnum<'a>> for CustomType<'a> {
    fn from(custom_enum: CustomEnum<'a>) -> Self {
        CustomType::Enum(custom_enum)
    }
}
