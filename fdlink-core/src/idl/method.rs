//! Method definitions.

use core::fmt;
use std::borrow::Cow;

use super::Parameter;

/// Behavioral flags of a method declaration.
///
/// The interface description text does not carry flags; they are part of the in-memory
/// declaration only and govern the call-time protocol: `more` methods reply with a stream,
/// `oneway` methods never reply, `upgrade` methods hand the connection over after their first
/// reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodFlags {
    /// The method replies with a stream of values when called with `more`.
    pub more: bool,
    /// The method never produces a reply.
    pub oneway: bool,
    /// The method upgrades the connection after its first reply.
    pub upgrade: bool,
}

impl MethodFlags {
    /// Flags with everything unset (a plain call-reply method).
    pub const NONE: Self = Self {
        more: false,
        oneway: false,
        upgrade: false,
    };

    /// Flags for a streaming method.
    pub const MORE: Self = Self {
        more: true,
        oneway: false,
        upgrade: false,
    };

    /// Flags for a oneway method.
    pub const ONEWAY: Self = Self {
        more: false,
        oneway: true,
        upgrade: false,
    };

    /// Flags for a connection-upgrading method.
    pub const UPGRADE: Self = Self {
        more: false,
        oneway: false,
        upgrade: true,
    };

    /// Whether the combination is allowed: `oneway` and `upgrade` each exclude the other
    /// flags.
    pub fn is_valid(&self) -> bool {
        !(self.oneway && (self.more || self.upgrade)) && !(self.upgrade && self.more)
    }
}

/// A method definition.
#[derive(Debug, Clone, Eq)]
pub struct Method<'a> {
    name: &'a str,
    inputs: Cow<'a, [Parameter<'a>]>,
    outputs: Cow<'a, [Parameter<'a>]>,
    flags: MethodFlags,
}

impl<'a> Method<'a> {
    /// Creates a new method with the given name and borrowed parameters.
    pub const fn new(
        name: &'a str,
        inputs: &'a [Parameter<'a>],
        outputs: &'a [Parameter<'a>],
        flags: MethodFlags,
    ) -> Self {
        Self {
            name,
            inputs: Cow::Borrowed(inputs),
            outputs: Cow::Borrowed(outputs),
            flags,
        }
    }

    /// Creates a new method with the given name and owned parameters.
    pub fn new_owned(
        name: &'a str,
        inputs: Vec<Parameter<'a>>,
        outputs: Vec<Parameter<'a>>,
        flags: MethodFlags,
    ) -> Self {
        Self {
            name,
            inputs: Cow::Owned(inputs),
            outputs: Cow::Owned(outputs),
            flags,
        }
    }

    /// The name of the method.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// An iterator over the input parameters.
    pub fn inputs(&self) -> impl Iterator<Item = &Parameter<'a>> {
        self.inputs.iter()
    }

    /// An iterator over the output parameters.
    pub fn outputs(&self) -> impl Iterator<Item = &Parameter<'a>> {
        self.outputs.iter()
    }

    /// The method's flags.
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }
}

impl<'a> fmt::Display for Method<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method {}(", self.name)?;
        let mut first = true;
        for param in self.inputs.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{param}")?;
        }
        write!(f, ") -> (")?;
        let mut first = true;
        for param in self.outputs.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

impl PartialEq for Method<'_> {
    fn eq(&self, other: &Self) -> bool {
        // Flags are not part of the rendered text, so they are excluded from equality; the
        // parse round-trip compares rendered declarations.
        self.name == other.name && self.inputs == other.inputs && self.outputs == other.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::Type;

    #[test]
    fn display() {
        let method = Method::new("Ping", &[], &[], MethodFlags::NONE);
        assert_eq!(method.to_string(), "method Ping() -> ()");

        let inputs = [Parameter::new("count", &Type::Int)];
        let outputs = [Parameter::new("value", &Type::Int)];
        let method = Method::new("Range", &inputs, &outputs, MethodFlags::MORE);
        assert_eq!(method.to_string(), "method Range(count: int) -> (value: int)");
        assert!(method.flags().more);
    }

    #[test]
    fn flag_combinations() {
        assert!(MethodFlags::NONE.is_valid());
        assert!(MethodFlags::MORE.is_valid());
        assert!(MethodFlags::ONEWAY.is_valid());
        assert!(MethodFlags::UPGRADE.is_valid());

        let invalid = MethodFlags {
            more: true,
            oneway: true,
            upgrade: false,
        };
        assert!(!invalid.is_valid());

        let invalid = MethodFlags {
            more: false,
            oneway: true,
            upgrade: true,
        };
        assert!(!invalid.is_valid());

        let invalid = MethodFlags {
            more: true,
            oneway: false,
            upgrade: true,
        };
        assert!(!invalid.is_valid());
    }
}
