//! Error definitions.

use core::fmt;
use std::borrow::Cow;

use super::Field;

/// An error declared by an interface.
#[derive(Debug, Clone, Eq)]
pub struct ErrorDecl<'a> {
    name: &'a str,
    fields: Cow<'a, [Field<'a>]>,
}

impl<'a> ErrorDecl<'a> {
    /// Creates a new error with the given name and borrowed fields.
    pub const fn new(name: &'a str, fields: &'a [Field<'a>]) -> Self {
        Self {
            name,
            fields: Cow::Borrowed(fields),
        }
    }

    /// Creates a new error with the given name and owned fields.
    pub fn new_owned(name: &'a str, fields: Vec<Field<'a>>) -> Self {
        Self {
            name,
            fields: Cow::Owned(fields),
        }
    }

    /// The name of the error, unqualified.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// An iterator over the fields of the error.
    pub fn fields(&self) -> impl Iterator<Item = &Field<'a>> {
        self.fields.iter()
    }
}

impl<'a> fmt::Display for ErrorDecl<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {} (", self.name)?;
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

impl PartialEq for ErrorDecl<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}
