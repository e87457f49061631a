//! Member access, method calls, and overload ranking.
//!
//! Overloads are ranked by total implicit-conversion cost across arguments,
//! with exact matches breaking ties; a surviving tie is an ambiguity
//! failure, never an arbitrary pick. An explicitly supplied method bypasses
//! the search entirely.

use exprtree_core::{
    implicit_widening, BuildError, Catalog, MethodRef, Ty, TypeHash,
};

use crate::build::{coerce, invalid, mismatch};
use crate::node::{Node, NodeKind, NodeRef};

/// Cost of implicitly converting an argument to a parameter type. `None`
/// means no implicit conversion exists.
///
/// Exact 0, numeric widening 1, lifting into a nullable 2, reference upcast
/// 3, user-defined implicit operator 4, boxing into the root 5.
pub(crate) fn conversion_cost(catalog: &Catalog, from: &Ty, to: &Ty) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    if let (Ty::Nullable(fa), Ty::Nullable(tb)) = (from, to) {
        return conversion_cost(catalog, fa, tb);
    }
    if let Ty::Nullable(inner) = to {
        return conversion_cost(catalog, from, inner).map(|c| c + 2);
    }
    if let (Ty::Primitive(a), Ty::Primitive(b)) = (from, to) {
        return implicit_widening(*a, *b).then_some(1);
    }
    if *to == catalog.object_ty() {
        return (*from != Ty::Void).then_some(5);
    }
    if let (Ty::Object(a), Ty::Object(b)) = (from, to) {
        return catalog.object_assignable(*a, *b).then_some(3);
    }
    catalog
        .find_conversion(from, to)
        .filter(|m| m.name == "op_implicit")
        .map(|_| 4)
}

fn describe_candidates(candidates: &[MethodRef]) -> String {
    candidates
        .iter()
        .map(|m| {
            let params = m
                .params
                .iter()
                .map(|p| format!("{:?}", p.ty))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", m.name, params)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pick the single cheapest applicable overload, or fail.
pub(crate) fn find_best_match(
    catalog: &Catalog,
    name: &str,
    candidates: &[MethodRef],
    args: &[Ty],
    type_args: usize,
) -> Result<MethodRef, BuildError> {
    let mut best: Option<(u32, usize, MethodRef)> = None;
    let mut tied = false;

    for method in candidates {
        if method.params.len() != args.len() || method.type_params != type_args {
            continue;
        }
        let mut score = 0u32;
        let mut exact = 0usize;
        let mut applicable = true;
        for (param, arg) in method.params.iter().zip(args) {
            // By-ref parameters admit no conversion at all.
            let cost = if param.by_ref {
                (*arg == param.ty).then_some(0)
            } else {
                conversion_cost(catalog, arg, &param.ty)
            };
            match cost {
                Some(0) => exact += 1,
                Some(c) => score += c,
                None => {
                    applicable = false;
                    break;
                }
            }
        }
        if !applicable {
            continue;
        }
        match &best {
            None => best = Some((score, exact, method.clone())),
            Some((best_score, best_exact, _)) => {
                if score < *best_score || (score == *best_score && exact > *best_exact) {
                    best = Some((score, exact, method.clone()));
                    tied = false;
                } else if score == *best_score && exact == *best_exact {
                    tied = true;
                }
            }
        }
    }

    match best {
        Some((_, _, method)) if !tied => Ok(method),
        Some(_) => Err(BuildError::AmbiguousMatch {
            name: name.to_string(),
            candidates: describe_candidates(candidates),
        }),
        None => {
            let arg_list = args
                .iter()
                .map(|t| catalog.ty_name(t))
                .collect::<Vec<_>>()
                .join(", ");
            Err(mismatch(format!("no overload of '{}' accepts ({})", name, arg_list)))
        }
    }
}

/// The `add` overload list-initialization resolves element adds against.
pub(crate) fn resolve_add_method(
    catalog: &Catalog,
    owner: TypeHash,
    args: &[Ty],
) -> Result<MethodRef, BuildError> {
    let candidates: Vec<MethodRef> = catalog
        .find_methods(owner, "add")?
        .into_iter()
        .filter(|m| !m.is_static())
        .collect();
    if candidates.is_empty() {
        return Err(BuildError::UnknownMember {
            owner: catalog.ty_name(&Ty::Object(owner)),
            name: "add".to_string(),
        });
    }
    find_best_match(catalog, "add", &candidates, args, 0)
}

fn owner_of(catalog: &Catalog, instance: &NodeRef) -> Result<TypeHash, BuildError> {
    instance.ty.strip_nullable().as_object().ok_or_else(|| {
        mismatch(format!(
            "member access needs an object instance, got {}",
            catalog.ty_name(&instance.ty)
        ))
    })
}

/// A field access on an object instance.
pub fn field(catalog: &Catalog, instance: NodeRef, name: &str) -> Result<NodeRef, BuildError> {
    let owner = owner_of(catalog, &instance)?;
    let Some(entry) = catalog.find_field(owner, name)? else {
        return Err(BuildError::UnknownMember {
            owner: catalog.ty_name(&Ty::Object(owner)),
            name: name.to_string(),
        });
    };
    let ty = entry.ty.clone();
    Ok(Node::new(ty, NodeKind::Member { instance, field: entry, owner }))
}

/// An instance method call, resolved by name and argument types.
pub fn call(
    catalog: &Catalog,
    instance: NodeRef,
    name: &str,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    let owner = owner_of(catalog, &instance)?;
    resolve_call(catalog, Some(instance), owner, name, 0, args)
}

/// A static method call, resolved by name and argument types.
pub fn call_static(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    resolve_call(catalog, None, owner, name, 0, args)
}

/// An instance call into a generic method group. The declared type-parameter
/// count narrows the candidate set; type arguments are otherwise opaque.
pub fn call_generic(
    catalog: &Catalog,
    instance: NodeRef,
    name: &str,
    type_args: usize,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    let owner = owner_of(catalog, &instance)?;
    resolve_call(catalog, Some(instance), owner, name, type_args, args)
}

/// Static counterpart of [`call_generic`].
pub fn call_generic_static(
    catalog: &Catalog,
    owner: TypeHash,
    name: &str,
    type_args: usize,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    resolve_call(catalog, None, owner, name, type_args, args)
}

/// A call through an explicitly chosen method. No search happens: the
/// given method is used even when resolution would have picked another
/// overload.
pub fn call_method(
    catalog: &Catalog,
    method: MethodRef,
    instance: Option<NodeRef>,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    match (&instance, method.is_static()) {
        (Some(_), true) => {
            return Err(invalid("static method called with an instance"));
        }
        (None, false) => {
            return Err(invalid("instance method called without an instance"));
        }
        _ => {}
    }
    if let Some(instance) = &instance {
        let owner = owner_of(catalog, instance)?;
        if !catalog.object_assignable(owner, method.owner) {
            return Err(mismatch(format!(
                "instance of {} cannot receive a method of {}",
                catalog.ty_name(&Ty::Object(owner)),
                catalog.ty_name(&Ty::Object(method.owner))
            )));
        }
    }
    finish_call(catalog, instance, method, args)
}

fn resolve_call(
    catalog: &Catalog,
    instance: Option<NodeRef>,
    owner: TypeHash,
    name: &str,
    type_args: usize,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    let want_static = instance.is_none();
    let candidates: Vec<MethodRef> = catalog
        .find_methods(owner, name)?
        .into_iter()
        .filter(|m| m.is_static() == want_static)
        .collect();
    if candidates.is_empty() {
        return Err(BuildError::UnknownMember {
            owner: catalog.ty_name(&Ty::Object(owner)),
            name: name.to_string(),
        });
    }
    let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
    let method = find_best_match(catalog, name, &candidates, &arg_tys, type_args)?;
    finish_call(catalog, instance, method, args)
}

/// Validate and coerce arguments against a chosen method, then build the
/// call node.
pub(crate) fn finish_call(
    catalog: &Catalog,
    instance: Option<NodeRef>,
    method: MethodRef,
    args: Vec<NodeRef>,
) -> Result<NodeRef, BuildError> {
    if method.params.len() != args.len() {
        return Err(BuildError::ArityMismatch {
            expected: method.params.len(),
            actual: args.len(),
        });
    }
    let mut coerced = Vec::with_capacity(args.len());
    for (param, arg) in method.params.iter().zip(args) {
        if param.by_ref {
            let writable = match &arg.kind {
                NodeKind::Parameter { .. } => true,
                NodeKind::Member { field, .. } => !field.is_readonly(),
                _ => false,
            };
            if !writable {
                return Err(invalid(
                    "a by-ref argument must be a variable or a writable field",
                ));
            }
            if arg.ty != param.ty {
                return Err(mismatch(format!(
                    "by-ref argument of type {} does not match parameter type {}",
                    catalog.ty_name(&arg.ty),
                    catalog.ty_name(&param.ty)
                )));
            }
            coerced.push(arg);
        } else {
            coerced.push(coerce(catalog, arg, &param.ty)?);
        }
    }
    let ty = method.ret.clone();
    Ok(Node::new(ty, NodeKind::Call { instance, method, args: coerced }))
}

/// An invocation of a delegate-typed expression.
pub fn invoke(catalog: &Catalog, target: NodeRef, args: Vec<NodeRef>) -> Result<NodeRef, BuildError> {
    let Ty::Delegate { params, ret } = target.ty.clone() else {
        return Err(BuildError::NotADelegate { actual: catalog.ty_name(&target.ty) });
    };
    if params.len() != args.len() {
        return Err(BuildError::ArityMismatch { expected: params.len(), actual: args.len() });
    }
    let mut coerced = Vec::with_capacity(args.len());
    for (param, arg) in params.iter().zip(args) {
        coerced.push(coerce(catalog, arg, param)?);
    }
    Ok(Node::new(*ret, NodeKind::Invoke { target, args: coerced }))
}
