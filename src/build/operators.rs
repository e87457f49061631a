//! Unary and binary operator resolution.
//!
//! Resolution tries the built-in primitive rules first (operand promotion
//! along the fixed rank ordering, with conversion nodes inserted so both
//! runtime operands share one kind), then searches both operand types for a
//! user-defined `op_*` method. Nullable operands lift a non-nullable
//! operator; the lift is recorded on the node, never re-derived. An
//! explicitly supplied method bypasses the whole search.

use std::rc::Rc;

use exprtree_core::{BuildError, Catalog, MethodRef, PrimitiveKind, Ty};

use crate::build::members::find_best_match;
use crate::build::{accepts_null, coerce, invalid, mismatch};
use crate::node::{BinaryOp, LambdaNode, Node, NodeKind, NodeRef, UnaryOp};

fn no_operator(catalog: &Catalog, op: BinaryOp, left: &Ty, right: &Ty) -> BuildError {
    BuildError::NoOperator {
        op: op.symbol().to_string(),
        left: catalog.ty_name(left),
        right: catalog.ty_name(right),
    }
}

/// Wrap a value type in a nullable when lifting; reference types and
/// already-nullable types pass through.
fn lift_ty(catalog: &Catalog, ty: Ty, lifted: bool) -> Ty {
    if lifted && !ty.is_nullable() && catalog.is_value_type(&ty) {
        Ty::nullable(ty)
    } else {
        ty
    }
}

/// Adjust an operand to the promoted kind, preserving its nullable wrapper.
fn coerce_operand(catalog: &Catalog, operand: NodeRef, target: &Ty) -> Result<NodeRef, BuildError> {
    let full = if operand.ty.is_nullable() {
        Ty::nullable(target.clone())
    } else {
        target.clone()
    };
    coerce(catalog, operand, &full)
}

fn binary_node(
    ty: Ty,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
    method: Option<MethodRef>,
    lifted: bool,
) -> NodeRef {
    Node::new(ty, NodeKind::Binary { op, left, right, method, lifted, conversion: None })
}

/// Null literals adopt the opposite operand's type when that type can hold
/// null, so `x == null` against a nullable or reference operand resolves.
fn adopt_null(
    catalog: &Catalog,
    left: NodeRef,
    right: NodeRef,
) -> Result<(NodeRef, NodeRef), BuildError> {
    let is_null_const = |n: &NodeRef| {
        matches!(&n.kind, NodeKind::Constant(v) if v.is_null())
            && n.ty == catalog.object_ty()
    };
    if is_null_const(&left) && !is_null_const(&right) && accepts_null(catalog, &right.ty) {
        let left = coerce(catalog, left, &right.ty)?;
        return Ok((left, right));
    }
    if is_null_const(&right) && !is_null_const(&left) && accepts_null(catalog, &left.ty) {
        let right = coerce(catalog, right, &left.ty)?;
        return Ok((left, right));
    }
    Ok((left, right))
}

/// Build a binary node, resolving the operator against the operand types.
pub fn binary(
    catalog: &Catalog,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
) -> Result<NodeRef, BuildError> {
    make_binary(catalog, op, left, right, None)
}

/// Build a binary node through an explicitly chosen operator method,
/// bypassing resolution entirely.
pub fn binary_with_method(
    catalog: &Catalog,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
    method: MethodRef,
) -> Result<NodeRef, BuildError> {
    make_binary(catalog, op, left, right, Some(method))
}

pub(crate) fn make_binary(
    catalog: &Catalog,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
    method: Option<MethodRef>,
) -> Result<NodeRef, BuildError> {
    if let Some(method) = method {
        return binary_with_explicit(catalog, op, left, right, method);
    }

    match op {
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            if left.ty == Ty::Bool && right.ty == Ty::Bool {
                Ok(binary_node(Ty::Bool, op, left, right, None, false))
            } else {
                Err(no_operator(catalog, op, &left.ty, &right.ty))
            }
        }
        BinaryOp::Coalesce => coalesce_impl(catalog, left, right, None),
        _ => {
            let (left, right) = adopt_null(catalog, left, right)?;
            let lifted = left.ty.is_nullable() || right.ty.is_nullable();
            let lt = left.ty.strip_nullable().clone();
            let rt = right.ty.strip_nullable().clone();

            if op.is_shift() {
                return shift_node(catalog, op, left, right, lifted);
            }

            if let (Some(a), Some(b)) = (lt.as_primitive(), rt.as_primitive()) {
                let Some(common) = PrimitiveKind::promoted(a, b) else {
                    return Err(no_operator(catalog, op, &left.ty, &right.ty));
                };
                let target = Ty::Primitive(common);
                let left = coerce_operand(catalog, left, &target)?;
                let right = coerce_operand(catalog, right, &target)?;
                let ty = builtin_result_ty(op, target, lifted);
                return Ok(binary_node(ty, op, left, right, None, lifted));
            }

            if lt == Ty::Bool && rt == Ty::Bool {
                let ty = match op {
                    BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr => {
                        lift_ty(catalog, Ty::Bool, lifted)
                    }
                    BinaryOp::Equal | BinaryOp::NotEqual => Ty::Bool,
                    _ => return Err(no_operator(catalog, op, &left.ty, &right.ty)),
                };
                return Ok(binary_node(ty, op, left, right, None, lifted));
            }

            if lt == Ty::Str && rt == Ty::Str {
                let ty = match op {
                    BinaryOp::Add => Ty::Str,
                    BinaryOp::Equal | BinaryOp::NotEqual => Ty::Bool,
                    _ => return Err(no_operator(catalog, op, &left.ty, &right.ty)),
                };
                return Ok(binary_node(ty, op, left, right, None, false));
            }

            if let Some(node) = resolve_user_binary(catalog, op, &left, &right, lifted)? {
                return Ok(node);
            }

            // Reference identity comparison between related reference types.
            if op.is_equality()
                && !catalog.is_value_type(&left.ty)
                && !catalog.is_value_type(&right.ty)
                && (catalog.is_assignable(&left.ty, &right.ty)
                    || catalog.is_assignable(&right.ty, &left.ty))
            {
                return Ok(binary_node(Ty::Bool, op, left, right, None, false));
            }

            Err(no_operator(catalog, op, &left.ty, &right.ty))
        }
    }
}

fn builtin_result_ty(op: BinaryOp, operand: Ty, lifted: bool) -> Ty {
    if op.is_equality() {
        Ty::Bool
    } else if op.is_comparison() {
        // Lifted relationals are three-valued: a null operand yields null.
        if lifted { Ty::nullable(Ty::Bool) } else { Ty::Bool }
    } else if lifted {
        Ty::nullable(operand)
    } else {
        operand
    }
}

fn shift_node(
    catalog: &Catalog,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
    lifted: bool,
) -> Result<NodeRef, BuildError> {
    let (lty, rty) = (left.ty.clone(), right.ty.clone());
    let not_shiftable = |_| no_operator(catalog, op, &lty, &rty);

    let Some(kind) = left.ty.strip_nullable().as_primitive().filter(|k| k.is_integer()) else {
        return Err(no_operator(catalog, op, &left.ty, &right.ty));
    };
    let widened = Ty::Primitive(kind.widened());
    let left = coerce_operand(catalog, left, &widened).map_err(not_shiftable)?;
    let right = coerce_operand(catalog, right, &Ty::Primitive(PrimitiveKind::I32))
        .map_err(not_shiftable)?;
    let ty = lift_ty(catalog, widened, lifted);
    Ok(binary_node(ty, op, left, right, None, lifted))
}

/// Search both operand types for a user-defined operator method. A
/// non-lifted match on the declared types wins; with nullable operands a
/// second, lifted attempt runs against the underlying types. Ambiguity
/// propagates; a plain no-match falls through to the caller.
fn resolve_user_binary(
    catalog: &Catalog,
    op: BinaryOp,
    left: &NodeRef,
    right: &NodeRef,
    lifted: bool,
) -> Result<Option<NodeRef>, BuildError> {
    let Some(name) = op.op_method_name() else {
        return Ok(None);
    };
    let mut candidates: Vec<MethodRef> = Vec::new();
    for ty in [left.ty.strip_nullable(), right.ty.strip_nullable()] {
        if let Some(hash) = ty.as_object() {
            for method in catalog.find_operator_methods(hash, name) {
                if method.params.len() == 2 && !candidates.iter().any(|m| m.hash == method.hash) {
                    candidates.push(method);
                }
            }
        }
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    let declared = [left.ty.clone(), right.ty.clone()];
    match find_best_match(catalog, name, &candidates, &declared, 0) {
        Ok(method) => {
            let l = coerce(catalog, left.clone(), &method.params[0].ty)?;
            let r = coerce(catalog, right.clone(), &method.params[1].ty)?;
            let ty = method.ret.clone();
            return Ok(Some(binary_node(ty, op, l, r, Some(method), false)));
        }
        Err(err @ BuildError::AmbiguousMatch { .. }) => return Err(err),
        Err(_) => {}
    }

    if lifted {
        let underlying = [
            left.ty.strip_nullable().clone(),
            right.ty.strip_nullable().clone(),
        ];
        match find_best_match(catalog, name, &candidates, &underlying, 0) {
            Ok(method) => {
                // Under a lift, operands must match the parameters exactly:
                // there is no conversion between the null check and the call.
                if underlying[0] != method.params[0].ty || underlying[1] != method.params[1].ty {
                    return Ok(None);
                }
                let ty = if op.is_equality() {
                    Ty::Bool
                } else {
                    lift_ty(catalog, method.ret.clone(), true)
                };
                return Ok(Some(binary_node(
                    ty,
                    op,
                    left.clone(),
                    right.clone(),
                    Some(method),
                    true,
                )));
            }
            Err(err @ BuildError::AmbiguousMatch { .. }) => return Err(err),
            Err(_) => {}
        }
    }

    Ok(None)
}

fn binary_with_explicit(
    catalog: &Catalog,
    op: BinaryOp,
    left: NodeRef,
    right: NodeRef,
    method: MethodRef,
) -> Result<NodeRef, BuildError> {
    if !method.is_static() {
        return Err(invalid("operator methods must be static"));
    }
    if method.params.len() != 2 {
        return Err(BuildError::ArityMismatch { expected: 2, actual: method.params.len() });
    }

    let operands_nullable = left.ty.is_nullable() || right.ty.is_nullable();
    let params_plain = !method.params[0].ty.is_nullable() && !method.params[1].ty.is_nullable();
    if operands_nullable && params_plain {
        // Lifted use of a non-nullable operator method.
        if *left.ty.strip_nullable() != method.params[0].ty
            || *right.ty.strip_nullable() != method.params[1].ty
        {
            return Err(mismatch(format!(
                "operands {} and {} do not fit lifted operator '{}'",
                catalog.ty_name(&left.ty),
                catalog.ty_name(&right.ty),
                method.name
            )));
        }
        let ty = if op.is_equality() {
            Ty::Bool
        } else {
            lift_ty(catalog, method.ret.clone(), true)
        };
        return Ok(binary_node(ty, op, left, right, Some(method), true));
    }

    let l = coerce(catalog, left, &method.params[0].ty)?;
    let r = coerce(catalog, right, &method.params[1].ty)?;
    let ty = method.ret.clone();
    Ok(binary_node(ty, op, l, r, Some(method), false))
}

// === Binary convenience wrappers ===

macro_rules! binary_factory {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        pub fn $name(
            catalog: &Catalog,
            left: NodeRef,
            right: NodeRef,
        ) -> Result<NodeRef, BuildError> {
            make_binary(catalog, BinaryOp::$op, left, right, None)
        }
    };
}

binary_factory!(
    /// Addition; wraps on overflow.
    add, Add
);
binary_factory!(
    /// Addition that raises an overflow failure.
    add_checked, AddChecked
);
binary_factory!(subtract, Subtract);
binary_factory!(subtract_checked, SubtractChecked);
binary_factory!(multiply, Multiply);
binary_factory!(multiply_checked, MultiplyChecked);
binary_factory!(divide, Divide);
binary_factory!(modulo, Modulo);
binary_factory!(and_, And);
binary_factory!(or_, Or);
binary_factory!(exclusive_or, ExclusiveOr);
binary_factory!(left_shift, LeftShift);
binary_factory!(right_shift, RightShift);
binary_factory!(
    /// Short-circuit conjunction; the right operand is not evaluated when
    /// the left is false.
    and_also, AndAlso
);
binary_factory!(
    /// Short-circuit disjunction; the right operand is not evaluated when
    /// the left is true.
    or_else, OrElse
);
binary_factory!(equal, Equal);
binary_factory!(not_equal, NotEqual);
binary_factory!(less_than, LessThan);
binary_factory!(less_than_or_equal, LessThanOrEqual);
binary_factory!(greater_than, GreaterThan);
binary_factory!(greater_than_or_equal, GreaterThanOrEqual);

/// Null-coalescing: the left value when non-null, the right value otherwise.
/// The right operand is not evaluated when the left is non-null.
pub fn coalesce(catalog: &Catalog, left: NodeRef, right: NodeRef) -> Result<NodeRef, BuildError> {
    coalesce_impl(catalog, left, right, None)
}

/// Null-coalescing with a conversion lambda applied to the non-null left
/// value before it becomes the result.
pub fn coalesce_with(
    catalog: &Catalog,
    left: NodeRef,
    right: NodeRef,
    conversion: NodeRef,
) -> Result<NodeRef, BuildError> {
    let NodeKind::Lambda(lambda) = &conversion.kind else {
        return Err(invalid("the coalesce conversion must be a lambda"));
    };
    coalesce_impl(catalog, left, right, Some(lambda.clone()))
}

fn coalesce_impl(
    catalog: &Catalog,
    left: NodeRef,
    right: NodeRef,
    conversion: Option<Rc<LambdaNode>>,
) -> Result<NodeRef, BuildError> {
    if !accepts_null(catalog, &left.ty) {
        return Err(BuildError::InvalidOperation {
            message: "coalesce needs a nullable or reference left operand".into(),
        });
    }

    if let Some(lambda) = conversion {
        let Ty::Delegate { params, ret } = &lambda.ty else {
            return Err(invalid("the coalesce conversion must be a lambda"));
        };
        if params.len() != 1 {
            return Err(BuildError::ArityMismatch { expected: 1, actual: params.len() });
        }
        let source = left.ty.strip_nullable();
        if params[0] != *source && !catalog.is_assignable(source, &params[0]) {
            return Err(mismatch(format!(
                "coalesce conversion takes {}, left operand yields {}",
                catalog.ty_name(&params[0]),
                catalog.ty_name(source)
            )));
        }
        let result = (**ret).clone();
        let right = coerce(catalog, right, &result)?;
        return Ok(Node::new(
            result,
            NodeKind::Binary {
                op: BinaryOp::Coalesce,
                left,
                right,
                method: None,
                lifted: false,
                conversion: Some(lambda),
            },
        ));
    }

    if let Ty::Nullable(underlying) = &left.ty {
        let underlying = (**underlying).clone();
        if let Ok(right) = coerce(catalog, right.clone(), &underlying) {
            return Ok(binary_node(underlying, BinaryOp::Coalesce, left, right, None, false));
        }
        // Widen the left operand toward the right's type instead.
        let lifted_rt = Ty::nullable(right.ty.strip_nullable().clone());
        if catalog.is_assignable(&left.ty, &lifted_rt) {
            let result = right.ty.clone();
            let left = coerce(catalog, left, &lifted_rt)?;
            return Ok(binary_node(result, BinaryOp::Coalesce, left, right, None, false));
        }
        return Err(mismatch(format!(
            "no common type for coalesce of {} and {}",
            catalog.ty_name(&left.ty),
            catalog.ty_name(&right.ty)
        )));
    }

    // Reference-typed left operand.
    if let Ok(right) = coerce(catalog, right.clone(), &left.ty) {
        let ty = left.ty.clone();
        return Ok(binary_node(ty, BinaryOp::Coalesce, left, right, None, false));
    }
    if catalog.is_assignable(&left.ty, &right.ty) {
        let result = right.ty.clone();
        let left = coerce(catalog, left, &result)?;
        return Ok(binary_node(result, BinaryOp::Coalesce, left, right, None, false));
    }
    Err(mismatch(format!(
        "no common type for coalesce of {} and {}",
        catalog.ty_name(&left.ty),
        catalog.ty_name(&right.ty)
    )))
}

// === Unary operators ===

/// Build a unary node, resolving the operator against the operand type.
pub fn unary(catalog: &Catalog, op: UnaryOp, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, op, operand, None)
}

/// Build a unary node through an explicitly chosen operator method.
pub fn unary_with_method(
    catalog: &Catalog,
    op: UnaryOp,
    operand: NodeRef,
    method: MethodRef,
) -> Result<NodeRef, BuildError> {
    make_unary(catalog, op, operand, Some(method))
}

pub fn negate(catalog: &Catalog, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, UnaryOp::Negate, operand, None)
}

pub fn negate_checked(catalog: &Catalog, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, UnaryOp::NegateChecked, operand, None)
}

pub fn not_(catalog: &Catalog, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, UnaryOp::Not, operand, None)
}

pub fn unary_plus(catalog: &Catalog, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, UnaryOp::UnaryPlus, operand, None)
}

/// The element count of an array, as `i32`.
pub fn array_length(catalog: &Catalog, operand: NodeRef) -> Result<NodeRef, BuildError> {
    make_unary(catalog, UnaryOp::ArrayLength, operand, None)
}

fn no_unary(catalog: &Catalog, op: UnaryOp, operand: &Ty) -> BuildError {
    mismatch(format!(
        "no unary operator '{}' for {}",
        op.symbol(),
        catalog.ty_name(operand)
    ))
}

fn unary_node(ty: Ty, op: UnaryOp, operand: NodeRef, method: Option<MethodRef>, lifted: bool) -> NodeRef {
    Node::new(ty, NodeKind::Unary { op, operand, method, lifted })
}

pub(crate) fn make_unary(
    catalog: &Catalog,
    op: UnaryOp,
    operand: NodeRef,
    method: Option<MethodRef>,
) -> Result<NodeRef, BuildError> {
    if let Some(method) = method {
        return unary_with_explicit(catalog, op, operand, method);
    }

    if op == UnaryOp::ArrayLength {
        return if matches!(operand.ty, Ty::Array(_)) {
            Ok(unary_node(Ty::Primitive(PrimitiveKind::I32), op, operand, None, false))
        } else {
            Err(no_unary(catalog, op, &operand.ty))
        };
    }

    let lifted = operand.ty.is_nullable();
    let stripped = operand.ty.strip_nullable().clone();

    if stripped == Ty::Bool && op == UnaryOp::Not {
        let ty = lift_ty(catalog, Ty::Bool, lifted);
        return Ok(unary_node(ty, op, operand, None, lifted));
    }

    if let Some(kind) = stripped.as_primitive() {
        let target = match op {
            UnaryOp::Not => {
                if !kind.is_integer() {
                    return Err(no_unary(catalog, op, &operand.ty));
                }
                kind.widened()
            }
            UnaryOp::Negate | UnaryOp::NegateChecked => match kind.widened() {
                // Negating u32 widens to i64 so the result keeps its range;
                // u64 has no signed home and does not negate.
                PrimitiveKind::U32 => PrimitiveKind::I64,
                PrimitiveKind::U64 => return Err(no_unary(catalog, op, &operand.ty)),
                widened => widened,
            },
            UnaryOp::UnaryPlus => kind.widened(),
            UnaryOp::ArrayLength => unreachable!("handled above"),
        };
        let target_ty = Ty::Primitive(target);
        let operand = coerce_operand(catalog, operand, &target_ty)?;
        let ty = lift_ty(catalog, target_ty, lifted);
        return Ok(unary_node(ty, op, operand, None, lifted));
    }

    // User-defined unary operator on an object type.
    if let Some(name) = op.op_method_name()
        && let Some(hash) = stripped.as_object()
    {
        let candidates: Vec<MethodRef> = catalog
            .find_operator_methods(hash, name)
            .into_iter()
            .filter(|m| m.params.len() == 1)
            .collect();
        if !candidates.is_empty() {
            let method = find_best_match(catalog, name, &candidates, &[stripped.clone()], 0)?;
            if lifted {
                if stripped != method.params[0].ty {
                    return Err(no_unary(catalog, op, &operand.ty));
                }
                let ty = lift_ty(catalog, method.ret.clone(), true);
                return Ok(unary_node(ty, op, operand, Some(method), true));
            }
            let operand = coerce(catalog, operand, &method.params[0].ty)?;
            let ty = method.ret.clone();
            return Ok(unary_node(ty, op, operand, Some(method), false));
        }
    }

    Err(no_unary(catalog, op, &operand.ty))
}

fn unary_with_explicit(
    catalog: &Catalog,
    op: UnaryOp,
    operand: NodeRef,
    method: MethodRef,
) -> Result<NodeRef, BuildError> {
    if !method.is_static() {
        return Err(invalid("operator methods must be static"));
    }
    if method.params.len() != 1 {
        return Err(BuildError::ArityMismatch { expected: 1, actual: method.params.len() });
    }
    let lifted = operand.ty.is_nullable() && !method.params[0].ty.is_nullable();
    if lifted {
        if *operand.ty.strip_nullable() != method.params[0].ty {
            return Err(mismatch(format!(
                "operand {} does not fit lifted operator '{}'",
                catalog.ty_name(&operand.ty),
                method.name
            )));
        }
        let ty = lift_ty(catalog, method.ret.clone(), true);
        return Ok(unary_node(ty, op, operand, Some(method), true));
    }
    let operand = coerce(catalog, operand, &method.params[0].ty)?;
    let ty = method.ret.clone();
    Ok(unary_node(ty, op, operand, Some(method), false))
}
