//! An expression-tree engine: typed immutable trees, a validating builder,
//! and two observably identical executors.
//!
//! Trees are built bottom-up through the factories in [`build`], against a
//! [`Catalog`](exprtree_core::Catalog) of registered types and members.
//! Every resolution decision (operator methods, conversions, nullable
//! lifting, overload choices) is made once at construction time and
//! recorded on the nodes; [`executor::prepare`] then runs the tree either
//! by walking it or by precompiling it into closures.

pub mod build;
pub mod compile;
pub mod executor;
pub mod interpret;
pub mod node;
pub mod runtime;

pub use exprtree_core as core_types;

pub mod prelude {
    pub use crate::build;
    pub use crate::executor::{prepare, CompiledLambda, ExecMode};
    pub use crate::interpret::Interpreter;
    pub use crate::node::{BinaryOp, Node, NodeKind, NodeRef, UnaryOp};
    pub use crate::runtime::scope::Scope;
    pub use exprtree_core::{
        BuildError, Catalog, Decimal, EvalError, FieldEntry, MemberFlags, MethodEntry,
        MethodRef, NativeFn, ParamDef, PrimitiveKind, StructEntry, Ty, TypeHash, Value,
    };
}
