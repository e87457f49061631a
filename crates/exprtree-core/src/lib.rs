//! Core types for the expression-tree engine: type identity, semantic type
//! references, runtime values, errors, and the member catalog.
//!
//! This crate has no knowledge of expression nodes or executors; it is the
//! shared vocabulary the builder and both execution modes are written against.

mod catalog;
mod decimal;
mod entries;
mod error;
mod ty;
mod type_hash;
mod value;

pub use catalog::{implicit_widening, Catalog, OBJECT_ROOT};
pub use decimal::Decimal;
pub use entries::{
    FieldEntry, MemberFlags, MethodEntry, MethodRef, NativeFn, ParamDef, StructEntry,
};
pub use error::{BuildError, EvalError};
pub use ty::{PrimitiveKind, Ty};
pub use type_hash::TypeHash;
pub use value::{value_equal, DelegateValue, ObjectData, Value};
