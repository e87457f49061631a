//! Validating factory functions.
//!
//! Trees are built bottom-up through these factories; each one type-checks
//! its inputs against the catalog, resolves operators, conversions, and
//! members, and records every decision on the node it returns. A factory
//! either returns a fully-resolved node or a [`BuildError`]; there is no
//! partially-built state, and the executors never re-resolve anything.

mod conversion;
mod members;
mod operators;
mod structure;

use std::rc::Rc;

use exprtree_core::{BuildError, Catalog, Ty, TypeHash, Value, OBJECT_ROOT};

use crate::node::{LambdaNode, Node, NodeKind, NodeRef, ParamId};

pub use conversion::{
    classify, coerce, convert, convert_checked, convert_with_method, type_as, type_is,
};
pub use members::{
    call, call_generic, call_generic_static, call_method, call_static, field, invoke,
};
pub use operators::{
    add, add_checked, and_, and_also, array_length, binary, binary_with_method, coalesce,
    coalesce_with, divide, equal, exclusive_or, greater_than, greater_than_or_equal,
    left_shift, less_than, less_than_or_equal, modulo, multiply, multiply_checked, negate,
    negate_checked, not_, not_equal, or_, or_else, right_shift, subtract, subtract_checked,
    unary, unary_plus, unary_with_method,
};
pub use structure::{
    bind, bind_list, bind_nested, conditional, list_init, list_init_with, member_init,
    new_array, new_instance, switch_, switch_case, switch_with,
};

pub(crate) fn invalid(message: impl Into<String>) -> BuildError {
    BuildError::InvalidArgument { message: message.into() }
}

pub(crate) fn mismatch(message: impl Into<String>) -> BuildError {
    BuildError::TypeMismatch { message: message.into() }
}

/// Whether a null value is a legal inhabitant of the type.
pub(crate) fn accepts_null(catalog: &Catalog, ty: &Ty) -> bool {
    ty.is_nullable() || !catalog.is_value_type(ty) && *ty != Ty::Void
}

/// A constant node with its type inferred from the value. Null infers the
/// object root; use [`constant_of`] to give a null, array, or nullable
/// constant a precise type.
pub fn constant(value: Value) -> Result<NodeRef, BuildError> {
    let ty = match value.runtime_ty() {
        Some(ty) => ty,
        None if value.is_null() => Ty::Object(TypeHash::from_name(OBJECT_ROOT)),
        None => {
            return Err(invalid("array constants need an explicit type"));
        }
    };
    Ok(Node::new(ty, NodeKind::Constant(value)))
}

/// A constant node with an explicit type. The value must inhabit the type.
pub fn constant_of(catalog: &Catalog, value: Value, ty: Ty) -> Result<NodeRef, BuildError> {
    if ty == Ty::Void {
        return Err(invalid("a constant cannot be void"));
    }
    if value.is_null() {
        if !accepts_null(catalog, &ty) {
            return Err(mismatch(format!(
                "null is not a value of non-nullable type {}",
                catalog.ty_name(&ty)
            )));
        }
    } else if !inhabits(catalog, &value, &ty) {
        return Err(mismatch(format!(
            "value of shape {} does not inhabit type {}",
            value.shape_name(),
            catalog.ty_name(&ty)
        )));
    }
    Ok(Node::new(ty, NodeKind::Constant(value)))
}

/// Exact inhabitation check for constants: a value's representation must
/// match the declared type, not merely be convertible to it.
fn inhabits(catalog: &Catalog, value: &Value, ty: &Ty) -> bool {
    match ty.strip_nullable() {
        Ty::Primitive(kind) => value.primitive_kind() == Some(*kind),
        Ty::Bool => matches!(value, Value::Bool(_)),
        Ty::Str => matches!(value, Value::Str(_)),
        Ty::Array(_) => matches!(value, Value::Array(_)),
        Ty::Delegate { .. } => value
            .as_delegate()
            .map(|d| d.ty == *ty.strip_nullable())
            .unwrap_or(false),
        Ty::Object(hash) => value
            .as_obj()
            .map(|obj| catalog.object_assignable(obj.borrow().ty, *hash))
            .unwrap_or(false),
        _ => false,
    }
}

/// A named parameter node. Identity is per node instance: building two
/// parameters with the same name yields two distinct variables.
pub fn parameter(ty: Ty, name: &str) -> Result<NodeRef, BuildError> {
    if ty == Ty::Void {
        return Err(invalid("a parameter cannot be void"));
    }
    Ok(Node::new(ty, NodeKind::Parameter { id: ParamId::fresh(), name: Rc::from(name) }))
}

/// A local variable node, for use in blocks. Same identity rule as
/// [`parameter`].
pub fn variable(ty: Ty, name: &str) -> Result<NodeRef, BuildError> {
    parameter(ty, name)
}

/// A lambda node closing over `body` with the given parameter nodes.
pub fn lambda(params: Vec<NodeRef>, body: NodeRef) -> Result<NodeRef, BuildError> {
    let mut param_tys = Vec::with_capacity(params.len());
    let mut seen = Vec::with_capacity(params.len());
    for param in &params {
        let NodeKind::Parameter { id, .. } = &param.kind else {
            return Err(invalid("lambda parameters must be parameter nodes"));
        };
        if seen.contains(id) {
            return Err(invalid("the same parameter node appears twice"));
        }
        seen.push(*id);
        param_tys.push(param.ty.clone());
    }
    let ty = Ty::delegate(param_tys, body.ty.clone());
    let lambda = Rc::new(LambdaNode { params, body, ty: ty.clone() });
    Ok(Node::new(ty, NodeKind::Lambda(lambda)))
}

/// A block introducing local variables and evaluating expressions in order;
/// the block's value is the last expression's value.
pub fn block(variables: Vec<NodeRef>, exprs: Vec<NodeRef>) -> Result<NodeRef, BuildError> {
    for variable in &variables {
        if !matches!(variable.kind, NodeKind::Parameter { .. }) {
            return Err(invalid("block variables must be parameter nodes"));
        }
    }
    let Some(last) = exprs.last() else {
        return Err(invalid("a block needs at least one expression"));
    };
    let ty = last.ty.clone();
    Ok(Node::new(ty, NodeKind::Block { variables, exprs }))
}

/// An assignment. The target must be a variable or a writable field reached
/// without reading through a value-type member; the assignment's value is
/// the assigned value.
pub fn assign(catalog: &Catalog, target: NodeRef, value: NodeRef) -> Result<NodeRef, BuildError> {
    match &target.kind {
        NodeKind::Parameter { .. } => {}
        NodeKind::Member { instance, field, owner } => {
            if field.is_readonly() {
                return Err(BuildError::ReadOnlyMember {
                    owner: catalog.ty_name(&Ty::Object(*owner)),
                    name: field.name.clone(),
                });
            }
            if reads_value_type_member(catalog, instance) {
                return Err(BuildError::InvalidOperation {
                    message: format!(
                        "cannot assign to '{}' through a value-type member; the write \
                         would land on a copy",
                        field.name
                    ),
                });
            }
        }
        _ => return Err(invalid("assignment target must be a variable or field")),
    }
    let value = coerce(catalog, value, &target.ty)?;
    let ty = target.ty.clone();
    Ok(Node::new(ty, NodeKind::Assign { target, value }))
}

/// Whether a member-access chain passes through a value-type-typed member
/// read. Reading such a member yields a copy, so nothing past it is a
/// writable location.
fn reads_value_type_member(catalog: &Catalog, mut node: &NodeRef) -> bool {
    while let NodeKind::Member { instance, .. } = &node.kind {
        if catalog.is_value_type(&node.ty) {
            return true;
        }
        node = instance;
    }
    false
}
