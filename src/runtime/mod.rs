//! Runtime machinery shared by both execution modes.
//!
//! The interpreter and the closure compiler differ only in how they traverse
//! a tree; everything semantic lives here so the two modes cannot drift:
//! operator ladders ([`ops`]), conversion application ([`convert`]), binding
//! environments ([`scope`]), and the small helpers below.

pub mod convert;
pub mod ops;
pub mod scope;

/// Recursion guard shared by both execution modes. A tree nesting deeper
/// than this fails with [`EvalError::StackOverflow`] instead of exhausting
/// the native stack; the limit is sized to stay inside a default-sized
/// thread stack.
pub const DEFAULT_MAX_DEPTH: usize = 512;

use std::cell::RefCell;
use std::rc::Rc;

use exprtree_core::{
    value_equal, Catalog, EvalError, FieldEntry, MethodRef, ObjectData, Ty, TypeHash, Value,
};
use rustc_hash::FxHashMap;

/// Whether a value's runtime type satisfies a static type test. Null never
/// matches; arrays match any array type because element types are not
/// tracked at runtime.
pub fn runtime_matches(catalog: &Catalog, value: &Value, target: &Ty) -> bool {
    if value.is_null() {
        return false;
    }
    let want = target.strip_nullable();
    match (value, want) {
        (Value::Array(_), Ty::Array(_)) => true,
        _ => value
            .runtime_ty()
            .map(|t| catalog.is_assignable(&t, want))
            .unwrap_or(false),
    }
}

/// Instantiate a registered type with every field at its default value.
pub fn new_default_instance(catalog: &Catalog, hash: TypeHash) -> Result<Value, EvalError> {
    let Some(entry) = catalog.get(hash) else {
        return Err(EvalError::TypeMismatch {
            expected: "registered type".into(),
            actual: format!("{}", hash),
        });
    };
    let mut fields = FxHashMap::default();
    for field in &entry.fields {
        fields.insert(field.name.clone(), Value::default_for(&field.ty));
    }
    Ok(Value::object(hash, fields))
}

/// The object handle stored in a field, creating a default instance in place
/// when the field is still null. Used by nested member initialization.
pub fn field_object(
    catalog: &Catalog,
    obj: &Rc<RefCell<ObjectData>>,
    field: &FieldEntry,
) -> Result<Rc<RefCell<ObjectData>>, EvalError> {
    let current = obj.borrow().fields.get(&field.name).cloned();
    match current {
        Some(Value::Obj(inner)) => Ok(inner),
        Some(Value::Null) | None => {
            let Some(hash) = field.ty.strip_nullable().as_object() else {
                return Err(EvalError::NullReference { member: field.name.clone() });
            };
            let fresh = new_default_instance(catalog, hash)?;
            obj.borrow_mut().fields.insert(field.name.clone(), fresh.clone());
            match fresh {
                Value::Obj(inner) => Ok(inner),
                _ => unreachable!("default instance of an object type is an object"),
            }
        }
        Some(other) => Err(EvalError::TypeMismatch {
            expected: "object".into(),
            actual: other.shape_name().to_string(),
        }),
    }
}

/// One case-test comparison of a switch: the custom comparison method when
/// one was resolved, structural value equality otherwise.
pub fn switch_matches(
    comparison: Option<&MethodRef>,
    subject: &Value,
    test: &Value,
) -> Result<bool, EvalError> {
    match comparison {
        Some(method) => {
            let mut args = [subject.clone(), test.clone()];
            let result = (method.native)(None, &mut args)?;
            expect_bool(&result)
        }
        None => Ok(value_equal(subject, test)),
    }
}

pub fn expect_bool(value: &Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| EvalError::TypeMismatch {
        expected: "bool".into(),
        actual: value.shape_name().to_string(),
    })
}
