//! Runtime value representation.
//!
//! [`Value`] is the tagged union both execution modes operate on. Primitives
//! are stored inline; strings, arrays, objects, and delegates are shared
//! behind `Rc` handles. An empty nullable and a null reference are both
//! represented as [`Value::Null`]; the node's static type tells them apart.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{Decimal, EvalError, PrimitiveKind, Ty, TypeHash};

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// Empty nullable or null reference.
    Null,
    Bool(bool),
    Str(Rc<str>),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Array(Rc<RefCell<Vec<Value>>>),
    Obj(Rc<RefCell<ObjectData>>),
    Delegate(Rc<DelegateValue>),
}

/// Field storage for a registered struct or class instance.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// The instance's runtime type.
    pub ty: TypeHash,
    pub fields: FxHashMap<String, Value>,
}

/// An invokable runtime closure produced by one of the executors.
pub struct DelegateValue {
    /// The delegate's static function type.
    pub ty: Ty,
    pub f: Box<dyn Fn(&[Value]) -> Result<Value, EvalError>>,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn object(ty: TypeHash, fields: FxHashMap<String, Value>) -> Value {
        Value::Obj(Rc::new(RefCell::new(ObjectData { ty, fields })))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&Rc<RefCell<ObjectData>>> {
        match self {
            Value::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_delegate(&self) -> Option<&Rc<DelegateValue>> {
        match self {
            Value::Delegate(d) => Some(d),
            _ => None,
        }
    }

    /// The primitive kind of a numeric value, or `None`.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::I8(_) => PrimitiveKind::I8,
            Value::I16(_) => PrimitiveKind::I16,
            Value::I32(_) => PrimitiveKind::I32,
            Value::I64(_) => PrimitiveKind::I64,
            Value::U8(_) => PrimitiveKind::U8,
            Value::U16(_) => PrimitiveKind::U16,
            Value::U32(_) => PrimitiveKind::U32,
            Value::U64(_) => PrimitiveKind::U64,
            Value::F32(_) => PrimitiveKind::F32,
            Value::F64(_) => PrimitiveKind::F64,
            Value::Decimal(_) => PrimitiveKind::Decimal,
            _ => return None,
        })
    }

    /// Widening read of any integer value as `i128`.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::I8(v) => *v as i128,
            Value::I16(v) => *v as i128,
            Value::I32(v) => *v as i128,
            Value::I64(v) => *v as i128,
            Value::U8(v) => *v as i128,
            Value::U16(v) => *v as i128,
            Value::U32(v) => *v as i128,
            Value::U64(v) => *v as i128,
            _ => return None,
        })
    }

    /// Widening read of any numeric value as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Value::F32(v) => *v as f64,
            Value::F64(v) => *v,
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128()? as f64,
        })
    }

    /// The runtime type of the value, or `None` for null.
    pub fn runtime_ty(&self) -> Option<Ty> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => Ty::Bool,
            Value::Str(_) => Ty::Str,
            Value::Delegate(d) => d.ty.clone(),
            Value::Obj(obj) => Ty::Object(obj.borrow().ty),
            // Element types are not tracked at runtime; the static type is
            // authoritative for arrays.
            Value::Array(_) => return None,
            other => Ty::Primitive(other.primitive_kind()?),
        })
    }

    /// Short name of the value's runtime shape, for error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Obj(_) => "object",
            Value::Delegate(_) => "delegate",
            other => other.primitive_kind().map(PrimitiveKind::name).unwrap_or("value"),
        }
    }

    /// The default value for a type: zero for numerics, false for bool,
    /// null for every reference and nullable type.
    pub fn default_for(ty: &Ty) -> Value {
        match ty {
            Ty::Bool => Value::Bool(false),
            Ty::Primitive(kind) => match kind {
                PrimitiveKind::I8 => Value::I8(0),
                PrimitiveKind::I16 => Value::I16(0),
                PrimitiveKind::I32 => Value::I32(0),
                PrimitiveKind::I64 => Value::I64(0),
                PrimitiveKind::U8 => Value::U8(0),
                PrimitiveKind::U16 => Value::U16(0),
                PrimitiveKind::U32 => Value::U32(0),
                PrimitiveKind::U64 => Value::U64(0),
                PrimitiveKind::F32 => Value::F32(0.0),
                PrimitiveKind::F64 => Value::F64(0.0),
                PrimitiveKind::Decimal => Value::Decimal(Decimal::ZERO),
            },
            _ => Value::Null,
        }
    }
}

/// Non-lifted equality: same-kind primitives by value, strings by content,
/// objects/arrays/delegates by handle identity, null equal only to null.
pub fn value_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::I8(x), Value::I8(y)) => x == y,
        (Value::I16(x), Value::I16(y)) => x == y,
        (Value::I32(x), Value::I32(y)) => x == y,
        (Value::I64(x), Value::I64(y)) => x == y,
        (Value::U8(x), Value::U8(y)) => x == y,
        (Value::U16(x), Value::U16(y)) => x == y,
        (Value::U32(x), Value::U32(y)) => x == y,
        (Value::U64(x), Value::U64(y)) => x == y,
        (Value::F32(x), Value::F32(y)) => x == y,
        (Value::F64(x), Value::F64(y)) => x == y,
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Obj(x), Value::Obj(y)) => Rc::ptr_eq(x, y),
        (Value::Delegate(x), Value::Delegate(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_equal(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::I8(v) => write!(f, "{}i8", v),
            Value::I16(v) => write!(f, "{}i16", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}i64", v),
            Value::U8(v) => write!(f, "{}u8", v),
            Value::U16(v) => write!(f, "{}u16", v),
            Value::U32(v) => write!(f, "{}u32", v),
            Value::U64(v) => write!(f, "{}u64", v),
            Value::F32(v) => write!(f, "{}f32", v),
            Value::F64(v) => write!(f, "{}f64", v),
            Value::Decimal(d) => write!(f, "{}m", d),
            Value::Array(items) => write!(f, "{:?}", items.borrow()),
            Value::Obj(obj) => {
                let data = obj.borrow();
                write!(f, "object#{} {:?}", data.ty, data.fields)
            }
            Value::Delegate(d) => write!(f, "delegate:{:?}", d.ty),
        }
    }
}

impl fmt::Debug for DelegateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelegateValue({:?})", self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_matches_only_null() {
        assert!(value_equal(&Value::Null, &Value::Null));
        assert!(!value_equal(&Value::Null, &Value::I32(0)));
        assert!(!value_equal(&Value::Bool(false), &Value::Null));
    }

    #[test]
    fn strings_compare_by_content() {
        assert!(value_equal(&Value::str("hi"), &Value::str("hi")));
        assert!(!value_equal(&Value::str("hi"), &Value::str("ho")));
    }

    #[test]
    fn objects_compare_by_handle() {
        let a = Value::object(TypeHash::from_name("Point"), FxHashMap::default());
        let b = Value::object(TypeHash::from_name("Point"), FxHashMap::default());
        assert!(value_equal(&a, &a.clone()));
        assert!(!value_equal(&a, &b));
    }

    #[test]
    fn defaults_per_type() {
        assert_eq!(Value::default_for(&Ty::Bool), Value::Bool(false));
        assert_eq!(Value::default_for(&Ty::Primitive(PrimitiveKind::I32)), Value::I32(0));
        assert!(Value::default_for(&Ty::Str).is_null());
        assert!(Value::default_for(&Ty::nullable(Ty::Primitive(PrimitiveKind::I32))).is_null());
    }
}
