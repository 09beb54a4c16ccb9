//! Type descriptors for interface descriptions.

use core::{fmt, ops::Deref};
use std::borrow::Cow;

use super::{EnumVariant, Field};

/// A type in an interface description.
///
/// Beyond standard varlink, two extensions are understood: `fd` declares a file-descriptor
/// field (on the wire a non-negative index into the message's descriptor array) and
/// `[string]()` declares a set of strings (on the wire an object whose values are all `{}`).
///
/// Inline member lists are copy-on-write slices: declarations written in code borrow
/// `const` slices, the parser produces owned vectors, and the two compare equal element-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type<'a> {
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Foreign untyped object.
    ForeignObject,
    /// File descriptor (extension).
    Fd,
    /// Optional/nullable type.
    Optional(TypeRef<'a>),
    /// Array type.
    Array(TypeRef<'a>),
    /// Map type with string keys.
    Map(TypeRef<'a>),
    /// Set of strings (extension).
    StringSet,
    /// Named reference to one of the interface's custom types.
    Custom(&'a str),
    /// Inline enum type.
    Enum(Cow<'a, [EnumVariant<'a>]>),
    /// Inline struct type.
    Object(Cow<'a, [Field<'a>]>),
}

impl<'a> Type<'a> {
    /// The element type if this type is optional.
    pub const fn as_optional(&self) -> Option<&TypeRef<'a>> {
        match self {
            Type::Optional(inner) => Some(inner),
            _ => None,
        }
    }
}

impl<'a> fmt::Display for Type<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::ForeignObject => write!(f, "object"),
            Type::Fd => write!(f, "fd"),
            Type::Optional(inner) => write!(f, "?{inner}"),
            Type::Array(inner) => write!(f, "[]{inner}"),
            Type::Map(inner) => write!(f, "[string]{inner}"),
            Type::StringSet => write!(f, "[string]()"),
            Type::Custom(name) => write!(f, "{name}"),
            Type::Enum(variants) => {
                write!(f, "(")?;
                let mut first = true;
                for variant in variants.iter() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}", variant.name())?;
                }
                write!(f, ")")
            }
            Type::Object(fields) => {
                write!(f, "(")?;
                let mut first = true;
                for field in fields.iter() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl<'a> PartialEq<TypeRef<'a>> for Type<'a> {
    fn eq(&self, other: &TypeRef<'a>) -> bool {
        self == other.inner()
    }
}

/// A type reference that is either borrowed or owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef<'a>(TypeRefInner<'a>);

impl<'a> TypeRef<'a> {
    /// Creates a new borrowed type reference.
    pub const fn new(inner: &'a Type<'a>) -> Self {
        Self(TypeRefInner::Borrowed(inner))
    }

    /// Creates a new owned type reference.
    pub fn new_owned(inner: Type<'a>) -> Self {
        Self(TypeRefInner::Owned(Box::new(inner)))
    }

    /// A reference to the inner type.
    pub const fn inner(&self) -> &Type<'a> {
        match &self.0 {
            TypeRefInner::Borrowed(inner) => inner,
            TypeRefInner::Owned(inner) => inner,
        }
    }
}

impl<'a> Deref for TypeRef<'a> {
    type Target = Type<'a>;

    fn deref(&self) -> &Self::Target {
        self.inner()
    }
}

impl<'a> fmt::Display for TypeRef<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl<'a> PartialEq<Type<'a>> for TypeRef<'a> {
    fn eq(&self, other: &Type<'a>) -> bool {
        self.inner() == other
    }
}

#[derive(Debug, Clone, Eq)]
enum TypeRefInner<'a> {
    Borrowed(&'a Type<'a>),
    Owned(Box<Type<'a>>),
}

impl PartialEq for TypeRefInner<'_> {
    fn eq(&self, other: &Self) -> bool {
        let ty = match self {
            TypeRefInner::Borrowed(inner) => *inner,
            TypeRefInner::Owned(inner) => inner.as_ref(),
        };
        let other_ty = match other {
            TypeRefInner::Borrowed(inner) => *inner,
            TypeRefInner::Owned(inner) => inner.as_ref(),
        };
        ty == other_ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names() {
        assert_eq!(Type::Bool.to_string(), "bool");
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Float.to_string(), "float");
        assert_eq!(Type::String.to_string(), "string");
        assert_eq!(Type::ForeignObject.to_string(), "object");
        assert_eq!(Type::Fd.to_string(), "fd");
        assert_eq!(Type::StringSet.to_string(), "[string]()");
    }

    #[test]
    fn nested_types() {
        const INT: Type<'static> = Type::Int;
        assert_eq!(Type::Optional(TypeRef::new(&INT)).to_string(), "?int");
        assert_eq!(
            Type::Array(TypeRef::new_owned(Type::Optional(TypeRef::new_owned(
                Type::String
            ))))
            .to_string(),
            "[]?string"
        );
        assert_eq!(Type::Map(TypeRef::new_owned(Type::Fd)).to_string(), "[string]fd");
    }

    #[test]
    fn inline_enum_and_object() {
        let variants = vec![EnumVariant::new("on"), EnumVariant::new("off")];
        assert_eq!(Type::Enum(variants.into()).to_string(), "(on, off)");

        let fields = vec![
            Field::new("first", &Type::Int),
            Field::new("second", &Type::String),
        ];
        assert_eq!(
            Type::Object(fields.into()).to_string(),
            "(first: int, second: string)"
        );
    }

    #[test]
    fn borrowed_and_owned_forms_compare_equal() {
        const STRING: Type<'static> = Type::String;
        let borrowed = TypeRef::new(&STRING);
        let owned = TypeRef::new_owned(Type::String);
        assert_eq!(borrowed, owned);

        const FIELDS: &[Field<'static>] = &[Field::new("x", &Type::Int)];
        let borrowed = Type::Object(Cow::Borrowed(FIELDS));
        let owned = Type::Object(vec![Field::new("x", &Type::Int)].into());
        assert_eq!(borrowed, owned);

        let shorter = Type::Object(Cow::Borrowed(&[]));
        assert_ne!(borrowed, shorter);
    }
}
