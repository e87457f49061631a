//! Error types for tree construction and evaluation.
//!
//! Two families, mirroring the two phases of the engine:
//!
//! - [`BuildError`]: raised synchronously by the factory functions when a
//!   tree cannot be constructed (bad arguments, no applicable operator or
//!   conversion, ambiguous member resolution). Never recoverable by the
//!   engine; the caller must build a different tree.
//! - [`EvalError`]: raised during evaluation (checked overflow, null
//!   unwrapping, invalid casts). Propagates out of `invoke` uncaught.

use thiserror::Error;

/// A tree-construction failure, raised by the builder factories.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// A null or structurally invalid argument was passed to a factory.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// Wrong number of arguments or parameters.
    #[error("arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Operand, argument, or return types are incompatible with the
    /// requested operation.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// No built-in rule and no user-defined operator method applies.
    #[error("no operator '{op}' defined for operand types {left} and {right}")]
    NoOperator {
        op: String,
        left: String,
        right: String,
    },

    /// No conversion path exists between the two types.
    #[error("no conversion from {from} to {to}")]
    NoConversion { from: String, to: String },

    /// The invocation target is not delegate-typed.
    #[error("expression of type {actual} is not invokable")]
    NotADelegate { actual: String },

    /// Multiple equally-good members or overloads matched.
    #[error("ambiguous match for '{name}': {candidates}")]
    AmbiguousMatch { name: String, candidates: String },

    /// A named member was not found on the type.
    #[error("type {owner} has no member '{name}'")]
    UnknownMember { owner: String, name: String },

    /// An assignment targets a member without a setter.
    #[error("member '{name}' of {owner} is read-only")]
    ReadOnlyMember { owner: String, name: String },

    /// Structurally legal but semantically forbidden construction.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what is forbidden.
        message: String,
    },
}

/// A runtime evaluation failure. Both execution modes raise the same
/// variants for the same tree and input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Checked arithmetic or a checked conversion exceeded the target range.
    #[error("arithmetic overflow converting to {target}")]
    Overflow {
        /// The target type name.
        target: String,
    },

    /// An empty nullable was forced into a non-nullable context.
    #[error("nullable value is empty")]
    NullUnwrap,

    /// A member was accessed on a null instance.
    #[error("null reference accessing '{member}'")]
    NullReference { member: String },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A runtime cast failed because the value's runtime type does not match.
    #[error("invalid cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    /// An invokable was called with the wrong number of arguments.
    #[error("arity mismatch: expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A value had an unexpected runtime shape.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Recursive evaluation exceeded the depth limit.
    #[error("evaluation exceeded maximum depth of {max_depth}")]
    StackOverflow { max_depth: usize },
}
