//! The interface description model.
//!
//! Interfaces are declared in code (const-friendly builders) or parsed from the canonical
//! description text. Rendering an [`Interface`] with `Display` yields that text back; for any
//! declaration the parse of the rendering compares equal to the declaration. Member
//! collections are `Cow` slices, so the two construction paths share one representation and
//! compare element-wise.

mod ty;
pub use ty::{Type, TypeRef};
mod field;
pub use field::{EnumVariant, Field, Parameter};
mod custom;
pub use custom::{CustomEnum, CustomObject, CustomType};
mod method;
pub use method::{Method, MethodFlags};
mod error_decl;
pub use error_decl::ErrorDecl;
mod interface;
pub use interface::{is_valid_interface_name, split_qualified_name, Interface};
mod parse;
