//! Conversion classification and the `Convert` / type-test factories.
//!
//! [`classify`] is the single decision point for what a conversion between
//! two static types means; the executors replay its classification through
//! `runtime::convert` without ever consulting the catalog again. Explicit
//! conversions admit narrowing and downcasts; [`coerce`] is the implicit
//! subset used everywhere the builder adjusts an operand or argument.

use exprtree_core::{BuildError, Catalog, MethodRef, Ty, Value};

use crate::build::{accepts_null, invalid, mismatch};
use crate::node::{ConversionKind, Node, NodeKind, NodeRef};

/// An unchecked conversion node. Out-of-range numeric results wrap.
pub fn convert(catalog: &Catalog, operand: NodeRef, target: Ty) -> Result<NodeRef, BuildError> {
    make_convert(catalog, operand, target, false)
}

/// A checked conversion node. Out-of-range numeric results raise an
/// overflow failure at evaluation time.
pub fn convert_checked(
    catalog: &Catalog,
    operand: NodeRef,
    target: Ty,
) -> Result<NodeRef, BuildError> {
    make_convert(catalog, operand, target, true)
}

/// A conversion through an explicitly supplied conversion method, bypassing
/// [`classify`]'s search entirely. The method must be a static single-parameter
/// operator taking the operand's underlying type and yielding the target's;
/// nullable operands lift around it the way resolved conversions do.
pub fn convert_with_method(
    catalog: &Catalog,
    operand: NodeRef,
    target: Ty,
    method: MethodRef,
) -> Result<NodeRef, BuildError> {
    if target == Ty::Void {
        return Err(invalid("cannot convert to void"));
    }
    if !method.is_static() {
        return Err(invalid("conversion methods must be static"));
    }
    if method.params.len() != 1 {
        return Err(BuildError::ArityMismatch { expected: 1, actual: method.params.len() });
    }
    if *operand.ty.strip_nullable() != method.params[0].ty {
        return Err(mismatch(format!(
            "operand {} does not fit conversion '{}' taking {}",
            catalog.ty_name(&operand.ty),
            method.name,
            catalog.ty_name(&method.params[0].ty)
        )));
    }
    if *target.strip_nullable() != method.ret {
        return Err(mismatch(format!(
            "conversion '{}' yields {}, not {}",
            method.name,
            catalog.ty_name(&method.ret),
            catalog.ty_name(&target)
        )));
    }
    let inner = ConversionKind::Method { method };
    let kind = match (operand.ty.is_nullable(), target.is_nullable()) {
        (true, true) => ConversionKind::Lifted(Box::new(inner)),
        (true, false) => ConversionKind::Unwrap(Box::new(inner)),
        (false, true) => ConversionKind::Wrap(Box::new(inner)),
        (false, false) => inner,
    };
    Ok(Node::new(target, NodeKind::Convert { operand, kind, checked: false }))
}

fn make_convert(
    catalog: &Catalog,
    operand: NodeRef,
    target: Ty,
    checked: bool,
) -> Result<NodeRef, BuildError> {
    if target == Ty::Void {
        return Err(invalid("cannot convert to void"));
    }
    let kind = classify(catalog, &operand.ty, &target)?;
    Ok(Node::new(target, NodeKind::Convert { operand, kind, checked }))
}

/// A runtime type test producing `bool`. Null never satisfies the test.
pub fn type_is(catalog: &Catalog, operand: NodeRef, target: Ty) -> Result<NodeRef, BuildError> {
    if target == Ty::Void {
        return Err(invalid("cannot test against void"));
    }
    if let Some(hash) = target.strip_nullable().as_object()
        && catalog.get(hash).is_none()
    {
        return Err(invalid("type test against an unregistered type"));
    }
    Ok(Node::new(Ty::Bool, NodeKind::TypeIs { operand, target }))
}

/// A runtime type cast producing the target type, or null when the runtime
/// type does not match. The target must be able to hold null.
pub fn type_as(catalog: &Catalog, operand: NodeRef, target: Ty) -> Result<NodeRef, BuildError> {
    if !accepts_null(catalog, &target) {
        return Err(invalid(format!(
            "'as' target {} cannot hold null; use a nullable or reference type",
            catalog.ty_name(&target)
        )));
    }
    Ok(Node::new(target.clone(), NodeKind::TypeAs { operand, target }))
}

/// Classify the conversion from one static type to another, composing
/// nullable wrapping and unwrapping around the underlying conversion.
/// Fails with [`BuildError::NoConversion`] when no path exists.
pub fn classify(catalog: &Catalog, from: &Ty, to: &Ty) -> Result<ConversionKind, BuildError> {
    if from == to {
        return Ok(ConversionKind::Identity);
    }

    let no_conversion = || BuildError::NoConversion {
        from: catalog.ty_name(from),
        to: catalog.ty_name(to),
    };

    // Into the object root: boxing for value types, an upcast for
    // references. Null passes through either way.
    if *to == catalog.object_ty() {
        if *from == Ty::Void {
            return Err(no_conversion());
        }
        return Ok(if catalog.is_value_type(from) {
            ConversionKind::Boxing
        } else {
            ConversionKind::Reference { target: to.clone(), downcast: false }
        });
    }

    // Out of the object root: unboxing for value types (a nullable target
    // absorbs null), a checked downcast for references.
    if *from == catalog.object_ty() {
        return Ok(if catalog.is_value_type(to) {
            ConversionKind::Unboxing { target: to.clone() }
        } else {
            ConversionKind::Reference { target: to.clone(), downcast: true }
        });
    }

    match (from.is_nullable(), to.is_nullable()) {
        (true, true) => {
            let inner = classify(catalog, from.strip_nullable(), to.strip_nullable())?;
            return Ok(ConversionKind::Lifted(Box::new(inner)));
        }
        (false, true) => {
            let inner = classify(catalog, from, to.strip_nullable())?;
            return Ok(ConversionKind::Wrap(Box::new(inner)));
        }
        (true, false) => {
            let inner = classify(catalog, from.strip_nullable(), to)?;
            return Ok(ConversionKind::Unwrap(Box::new(inner)));
        }
        (false, false) => {}
    }

    if let (Some(a), Some(b)) = (from.as_primitive(), to.as_primitive()) {
        return Ok(ConversionKind::Numeric { from: a, to: b });
    }

    if let (Ty::Object(a), Ty::Object(b)) = (from, to)
        && !catalog.is_value_type(from)
        && !catalog.is_value_type(to)
    {
        if catalog.object_assignable(*a, *b) {
            return Ok(ConversionKind::Reference { target: to.clone(), downcast: false });
        }
        if catalog.object_assignable(*b, *a) {
            return Ok(ConversionKind::Reference { target: to.clone(), downcast: true });
        }
    }

    if let Some(method) = catalog.find_conversion(from, to) {
        return Ok(ConversionKind::Method { method });
    }

    Err(no_conversion())
}

/// Implicitly adjust a node to a target type, inserting a conversion node
/// when needed. Null constants adopt the target type directly. Fails when
/// the adjustment would need an explicit conversion.
pub fn coerce(catalog: &Catalog, node: NodeRef, target: &Ty) -> Result<NodeRef, BuildError> {
    if node.ty == *target {
        return Ok(node);
    }

    if let NodeKind::Constant(value) = &node.kind
        && value.is_null()
        && accepts_null(catalog, target)
    {
        return Ok(Node::new(target.clone(), NodeKind::Constant(Value::Null)));
    }

    let implicit_method = || {
        catalog
            .find_conversion(node.ty.strip_nullable(), target.strip_nullable())
            .map(|m| m.name == "op_implicit")
            .unwrap_or(false)
    };
    if !catalog.is_assignable(&node.ty, target) && !implicit_method() {
        return Err(BuildError::NoConversion {
            from: catalog.ty_name(&node.ty),
            to: catalog.ty_name(target),
        });
    }

    let kind = classify(catalog, &node.ty, target)?;
    Ok(Node::new(target.clone(), NodeKind::Convert { operand: node, kind, checked: false }))
}

#[cfg(test)]
mod tests {
    use exprtree_core::PrimitiveKind;

    use super::*;
    use crate::build;

    fn int() -> Ty {
        Ty::Primitive(PrimitiveKind::I32)
    }

    #[test]
    fn identity_for_equal_types() {
        let catalog = Catalog::new();
        assert!(matches!(
            classify(&catalog, &int(), &int()).unwrap(),
            ConversionKind::Identity
        ));
    }

    #[test]
    fn nullable_to_nullable_is_lifted() {
        let catalog = Catalog::new();
        let kind = classify(
            &catalog,
            &Ty::nullable(int()),
            &Ty::nullable(Ty::Primitive(PrimitiveKind::I64)),
        )
        .unwrap();
        assert!(matches!(
            kind,
            ConversionKind::Lifted(inner) if matches!(*inner, ConversionKind::Numeric { .. })
        ));
    }

    #[test]
    fn unwrap_then_convert_for_nullable_source() {
        let catalog = Catalog::new();
        let kind = classify(&catalog, &Ty::nullable(int()), &int()).unwrap();
        assert!(matches!(
            kind,
            ConversionKind::Unwrap(inner) if matches!(*inner, ConversionKind::Identity)
        ));
    }

    #[test]
    fn value_types_box_into_the_root() {
        let catalog = Catalog::new();
        let kind = classify(&catalog, &int(), &catalog.object_ty()).unwrap();
        assert!(matches!(kind, ConversionKind::Boxing));
        let back = classify(&catalog, &catalog.object_ty(), &int()).unwrap();
        assert!(matches!(back, ConversionKind::Unboxing { .. }));
    }

    #[test]
    fn no_conversion_between_unrelated_types() {
        let catalog = Catalog::new();
        assert!(matches!(
            classify(&catalog, &Ty::Str, &int()),
            Err(BuildError::NoConversion { .. })
        ));
    }

    #[test]
    fn coerce_rejects_implicit_narrowing() {
        let catalog = Catalog::new();
        let wide = build::constant(exprtree_core::Value::I64(1)).unwrap();
        assert!(matches!(
            coerce(&catalog, wide, &int()),
            Err(BuildError::NoConversion { .. })
        ));
    }

    #[test]
    fn null_constant_adopts_the_target_type() {
        let catalog = Catalog::new();
        let null = build::constant(exprtree_core::Value::Null).unwrap();
        let coerced = coerce(&catalog, null, &Ty::nullable(int())).unwrap();
        assert_eq!(coerced.ty, Ty::nullable(int()));
    }

    #[test]
    fn as_target_must_hold_null() {
        let catalog = Catalog::new();
        let operand = build::constant(exprtree_core::Value::I32(1)).unwrap();
        assert!(type_as(&catalog, operand, int()).is_err());
    }
}
