//! Field and enum variant definitions.

use core::fmt;

use super::{Type, TypeRef};

/// A named field in a struct, method parameter list or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'a> {
    name: &'a str,
    ty: TypeRef<'a>,
}

/// Type alias for method parameters, which have the same structure as fields.
pub type Parameter<'a> = Field<'a>;

impl<'a> Field<'a> {
    /// Creates a new field with the given name and borrowed type.
    pub const fn new(name: &'a str, ty: &'a Type<'a>) -> Self {
        Self {
            name,
            ty: TypeRef::new(ty),
        }
    }

    /// Creates a new field with the given name and owned type.
    pub fn new_owned(name: &'a str, ty: Type<'a>) -> Self {
        Self {
            name,
            ty: TypeRef::new_owned(ty),
        }
    }

    /// The name of the field.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The type of the field.
    pub fn ty(&self) -> &Type<'a> {
        self.ty.inner()
    }
}

impl<'a> fmt::Display for Field<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// A single symbol of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant<'a> {
    name: &'a str,
}

impl<'a> EnumVariant<'a> {
    /// Creates a new enum variant.
    pub const fn new(name: &'a str) -> Self {
        Self { name }
    }

    /// The name of the variant.
    pub fn name(&self) -> &'a str {
        self.name
    }
}

impl<'a> fmt::Display for EnumVariant<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
