//! Construction, initialization, and control-flow factories.

use exprtree_core::{BuildError, Catalog, MethodRef, Ty, TypeHash};

use crate::build::members::{find_best_match, resolve_add_method};
use crate::build::{coerce, invalid, mismatch};
use crate::node::{ElementInit, MemberBinding, Node, NodeKind, NodeRef, SwitchCase};

/// A constructor invocation for a registered type. A type without declared
/// constructors gets a synthesized default constructor taking no arguments;
/// every field starts at its default value.
pub fn new_instance(
    catalog: &Catalog,
    ty: TypeHash,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    let Some(entry) = catalog.get(ty) else {
        return Err(invalid("construction of an unregistered type"));
    };
    let name = entry.name.clone();
    let ctors = catalog.find_ctors(ty);
    if ctors.is_empty() {
        if !args.is_empty() {
            return Err(BuildError::ArityMismatch { expected: 0, actual: args.len() });
        }
        return Ok(Node::new(Ty::Object(ty), NodeKind::New { ty, ctor: None, args }));
    }
    let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
    let ctor = find_best_match(catalog, &name, &ctors, &arg_tys, 0)?;
    let mut coerced = Vec::with_capacity(args.len());
    for (param, arg) in ctor.params.iter().zip(args) {
        coerced.push(coerce(catalog, arg, &param.ty)?);
    }
    Ok(Node::new(Ty::Object(ty), NodeKind::New { ty, ctor: Some(ctor), args: coerced }))
}

/// An array of the given element type initialized from the item expressions.
pub fn new_array(
    catalog: &Catalog,
    elem: Ty,
    items: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    if elem == Ty::Void {
        return Err(invalid("arrays cannot hold void"));
    }
    let mut coerced = Vec::with_capacity(items.len());
    for item in items {
        coerced.push(coerce(catalog, item, &elem)?);
    }
    Ok(Node::new(Ty::array(elem.clone()), NodeKind::NewArray { elem, items: coerced }))
}

/// Construction followed by element adds: each item argument list resolves
/// against the type's `add` method overloads.
pub fn list_init(
    catalog: &Catalog,
    new_node: NodeRef,
    items: Vec<Vec<NodeRef>>,
) -> Result<NodeRef, BuildError> {
    let owner = require_new(catalog, &new_node)?;
    let mut inits = Vec::with_capacity(items.len());
    for args in items {
        inits.push(element_init(catalog, owner, None, args)?);
    }
    Ok(Node::new(new_node.ty.clone(), NodeKind::ListInit { new_node, items: inits }))
}

/// Construction followed by element adds through an explicitly chosen add
/// method.
pub fn list_init_with(
    catalog: &Catalog,
    new_node: NodeRef,
    method: MethodRef,
    items: Vec<Vec<NodeRef>>,
) -> Result<NodeRef, BuildError> {
    let owner = require_new(catalog, &new_node)?;
    let mut inits = Vec::with_capacity(items.len());
    for args in items {
        inits.push(element_init(catalog, owner, Some(method.clone()), args)?);
    }
    Ok(Node::new(new_node.ty.clone(), NodeKind::ListInit { new_node, items: inits }))
}

fn require_new(catalog: &Catalog, node: &NodeRef) -> Result<TypeHash, BuildError> {
    match &node.kind {
        NodeKind::New { ty, .. } => Ok(*ty),
        _ => Err(invalid(format!(
            "initialization needs a construction node, got one of type {}",
            catalog.ty_name(&node.ty)
        ))),
    }
}

fn element_init(
    catalog: &Catalog,
    owner: TypeHash,
    method: Option<MethodRef>,
    args: Vec<NodeRef>,
) -> Result<ElementInit, BuildError> {
    let method = match method {
        Some(method) => method,
        None => {
            let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
            resolve_add_method(catalog, owner, &arg_tys)?
        }
    };
    if method.params.len() != args.len() {
        return Err(BuildError::ArityMismatch {
            expected: method.params.len(),
            actual: args.len(),
        });
    }
    let mut coerced = Vec::with_capacity(args.len());
    for (param, arg) in method.params.iter().zip(args) {
        coerced.push(coerce(catalog, arg, &param.ty)?);
    }
    Ok(ElementInit { method, args: coerced })
}

/// A field-assignment binding for [`member_init`].
pub fn bind(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
    value: NodeRef,
) -> Result<MemberBinding, BuildError> {
    let field = lookup_field(catalog, owner, name)?;
    if field.is_readonly() {
        return Err(BuildError::ReadOnlyMember {
            owner: catalog.ty_name(&Ty::Object(owner)),
            name: name.to_string(),
        });
    }
    let value = coerce(catalog, value, &field.ty)?;
    Ok(MemberBinding::Assignment { field, value })
}

/// A nested binding: initialize members of an object-typed field in place.
pub fn bind_nested(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
    bindings: Vec<MemberBinding>,
) -> Result<MemberBinding, BuildError> {
    let field = lookup_field(catalog, owner, name)?;
    if field.ty.strip_nullable().as_object().is_none() {
        return Err(mismatch(format!(
            "nested bindings need an object-typed field, '{}' is {}",
            name,
            catalog.ty_name(&field.ty)
        )));
    }
    Ok(MemberBinding::Nested { field, bindings })
}

/// A list binding: populate a collection-typed field through its `add`
/// method overloads.
pub fn bind_list(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
    items: Vec<Vec<NodeRef>>,
) -> Result<MemberBinding, BuildError> {
    let field = lookup_field(catalog, owner, name)?;
    let Some(field_ty) = field.ty.strip_nullable().as_object() else {
        return Err(mismatch(format!(
            "list bindings need an object-typed field, '{}' is {}",
            name,
            catalog.ty_name(&field.ty)
        )));
    };
    let mut inits = Vec::with_capacity(items.len());
    for args in items {
        inits.push(element_init(catalog, field_ty, None, args)?);
    }
    Ok(MemberBinding::List { field, items: inits })
}

fn lookup_field(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
) -> Result<std::rc::Rc<exprtree_core::FieldEntry>, BuildError> {
    catalog.find_field(owner, name)?.ok_or_else(|| BuildError::UnknownMember {
        owner: catalog.ty_name(&Ty::Object(owner)),
        name: name.to_string(),
    })
}

/// Construction followed by member bindings, evaluated in binding order.
pub fn member_init(
    catalog: &Catalog,
    new_node: NodeRef,
    bindings: Vec<MemberBinding>,
) -> Result<NodeRef, BuildError> {
    require_new(catalog, &new_node)?;
    Ok(Node::new(new_node.ty.clone(), NodeKind::MemberInit { new_node, bindings }))
}

/// A ternary conditional. The branches must share a type, with one branch
/// implicitly adjusting to the other's when they differ.
pub fn conditional(
    catalog: &Catalog,
    test: NodeRef,
    if_true: NodeRef,
    if_false: NodeRef,
) -> Result<NodeRef, BuildError> {
    if test.ty != Ty::Bool {
        return Err(mismatch(format!(
            "conditional test must be bool, got {}",
            catalog.ty_name(&test.ty)
        )));
    }
    let (if_true, if_false) = if if_true.ty == if_false.ty {
        (if_true, if_false)
    } else if let Ok(adjusted) = coerce(catalog, if_false.clone(), &if_true.ty) {
        (if_true, adjusted)
    } else {
        let target = if_false.ty.clone();
        let adjusted = coerce(catalog, if_true, &target)?;
        (adjusted, if_false)
    };
    let ty = if_true.ty.clone();
    Ok(Node::new(ty, NodeKind::Conditional { test, if_true, if_false }))
}

/// One case arm for [`switch_`]: any of the test values selects the body.
pub fn switch_case(tests: Vec<NodeRef>, body: NodeRef) -> Result<SwitchCase, BuildError> {
    if tests.is_empty() {
        return Err(invalid("a switch case needs at least one test value"));
    }
    Ok(SwitchCase { tests, body })
}

/// A switch: the subject is evaluated once, cases are tried in declaration
/// order, and within a case the test values in order; the first match wins.
/// A switch that produces a value must carry a default case. A switch with
/// no cases is legal: it evaluates the subject, then the default if one was
/// given; without a default it is void.
pub fn switch_(
    catalog: &Catalog,
    value: NodeRef,
    cases: Vec<SwitchCase>,
    default: Option<NodeRef>,
) -> Result<NodeRef, BuildError> {
    switch_with(catalog, value, None, cases, default)
}

/// [`switch_`] with a custom comparison method: a static two-parameter
/// predicate returning `bool`, replacing structural value equality.
pub fn switch_with(
    catalog: &Catalog,
    value: NodeRef,
    comparison: Option<MethodRef>,
    cases: Vec<SwitchCase>,
    default: Option<NodeRef>,
) -> Result<NodeRef, BuildError> {
    let test_ty = match &comparison {
        Some(method) => {
            if !method.is_static() {
                return Err(invalid("a switch comparison method must be static"));
            }
            if method.params.len() != 2 {
                return Err(BuildError::ArityMismatch {
                    expected: 2,
                    actual: method.params.len(),
                });
            }
            if method.ret != Ty::Bool {
                return Err(mismatch(format!(
                    "a switch comparison must return bool, '{}' returns {}",
                    method.name,
                    catalog.ty_name(&method.ret)
                )));
            }
            if value.ty != method.params[0].ty
                && !catalog.is_assignable(&value.ty, &method.params[0].ty)
            {
                return Err(mismatch(format!(
                    "switch value {} does not fit comparison parameter {}",
                    catalog.ty_name(&value.ty),
                    catalog.ty_name(&method.params[0].ty)
                )));
            }
            method.params[1].ty.clone()
        }
        None => value.ty.clone(),
    };

    let result_ty = match &default {
        Some(default) => default.ty.clone(),
        None => {
            if cases.iter().any(|c| c.body.ty != Ty::Void) {
                return Err(BuildError::InvalidOperation {
                    message: "a switch producing a value needs a default case".into(),
                });
            }
            Ty::Void
        }
    };

    let mut checked_cases = Vec::with_capacity(cases.len());
    for case in cases {
        let mut tests = Vec::with_capacity(case.tests.len());
        for test in case.tests {
            tests.push(coerce(catalog, test, &test_ty)?);
        }
        let body = if result_ty == Ty::Void {
            case.body
        } else {
            coerce(catalog, case.body, &result_ty)?
        };
        checked_cases.push(SwitchCase { tests, body });
    }

    Ok(Node::new(
        result_ty,
        NodeKind::Switch { value, cases: checked_cases, default, comparison },
    ))
}
