//! Runtime application of build-time conversion classifications.
//!
//! The builder decides what a `Convert` node means; this module only carries
//! the decision out. Unchecked numeric conversions wrap deterministically
//! through a wide integer intermediate; checked ones range-check and raise
//! overflow failures. Decimal conversions are always checked.

use exprtree_core::{Catalog, Decimal, EvalError, PrimitiveKind, Value};

use crate::node::ConversionKind;
use crate::runtime::runtime_matches;

/// Apply a classified conversion to an already-evaluated value.
pub fn apply_conversion(
    catalog: &Catalog,
    kind: &ConversionKind,
    checked: bool,
    value: Value,
) -> Result<Value, EvalError> {
    match kind {
        ConversionKind::Identity | ConversionKind::Boxing => Ok(value),
        ConversionKind::Numeric { to, .. } => convert_numeric(&value, *to, checked),
        ConversionKind::Wrap(inner) => apply_conversion(catalog, inner, checked, value),
        ConversionKind::Unwrap(inner) => {
            if value.is_null() {
                return Err(EvalError::NullUnwrap);
            }
            apply_conversion(catalog, inner, checked, value)
        }
        ConversionKind::Lifted(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                apply_conversion(catalog, inner, checked, value)
            }
        }
        ConversionKind::Unboxing { target } => {
            if value.is_null() {
                return if target.is_nullable() {
                    Ok(Value::Null)
                } else {
                    Err(EvalError::NullUnwrap)
                };
            }
            if runtime_matches(catalog, &value, target) {
                Ok(value)
            } else {
                Err(EvalError::InvalidCast {
                    from: value.shape_name().to_string(),
                    to: catalog.ty_name(target),
                })
            }
        }
        ConversionKind::Method { method } => {
            let mut args = [value];
            (method.native)(None, &mut args)
        }
        ConversionKind::Reference { target, downcast } => {
            if value.is_null() || !downcast {
                return Ok(value);
            }
            if runtime_matches(catalog, &value, target) {
                Ok(value)
            } else {
                Err(EvalError::InvalidCast {
                    from: value.shape_name().to_string(),
                    to: catalog.ty_name(target),
                })
            }
        }
    }
}

/// Convert a numeric value to another primitive kind.
pub fn convert_numeric(
    value: &Value,
    to: PrimitiveKind,
    checked: bool,
) -> Result<Value, EvalError> {
    match value {
        Value::Decimal(d) => decimal_to(*d, to),
        Value::F32(f) => float_to(*f as f64, to, checked),
        Value::F64(f) => float_to(*f, to, checked),
        other => {
            let Some(i) = other.as_i128() else {
                return Err(EvalError::TypeMismatch {
                    expected: "numeric value".into(),
                    actual: other.shape_name().to_string(),
                });
            };
            int_to(i, to, checked)
        }
    }
}

fn int_to(i: i128, to: PrimitiveKind, checked: bool) -> Result<Value, EvalError> {
    macro_rules! narrow {
        ($variant:ident, $t:ty, $name:literal) => {
            if checked {
                <$t>::try_from(i)
                    .map(Value::$variant)
                    .map_err(|_| EvalError::Overflow { target: $name.into() })
            } else {
                Ok(Value::$variant(i as $t))
            }
        };
    }
    match to {
        PrimitiveKind::I8 => narrow!(I8, i8, "i8"),
        PrimitiveKind::I16 => narrow!(I16, i16, "i16"),
        PrimitiveKind::I32 => narrow!(I32, i32, "i32"),
        PrimitiveKind::I64 => narrow!(I64, i64, "i64"),
        PrimitiveKind::U8 => narrow!(U8, u8, "u8"),
        PrimitiveKind::U16 => narrow!(U16, u16, "u16"),
        PrimitiveKind::U32 => narrow!(U32, u32, "u32"),
        PrimitiveKind::U64 => narrow!(U64, u64, "u64"),
        PrimitiveKind::F32 => Ok(Value::F32(i as f32)),
        PrimitiveKind::F64 => Ok(Value::F64(i as f64)),
        PrimitiveKind::Decimal => Ok(Value::Decimal(Decimal::from_i128(i)?)),
    }
}

fn float_to(f: f64, to: PrimitiveKind, checked: bool) -> Result<Value, EvalError> {
    match to {
        PrimitiveKind::F32 => Ok(Value::F32(f as f32)),
        PrimitiveKind::F64 => Ok(Value::F64(f)),
        PrimitiveKind::Decimal => Ok(Value::Decimal(Decimal::from_f64(f)?)),
        integer => {
            let t = f.trunc();
            if checked {
                if !t.is_finite() || t < i128::MIN as f64 || t >= i128::MAX as f64 {
                    return Err(EvalError::Overflow { target: integer.name().into() });
                }
                int_to(t as i128, integer, true)
            } else {
                // `as` saturates (NaN to zero), then the integer narrowing
                // wraps. Deterministic on every input.
                int_to(t as i128, integer, false)
            }
        }
    }
}

fn decimal_to(d: Decimal, to: PrimitiveKind) -> Result<Value, EvalError> {
    match to {
        PrimitiveKind::Decimal => Ok(Value::Decimal(d)),
        PrimitiveKind::F32 => Ok(Value::F32(d.to_f64() as f32)),
        PrimitiveKind::F64 => Ok(Value::F64(d.to_f64())),
        // Decimal narrowing is always range-checked.
        integer => int_to(d.trunc_i128(), integer, true),
    }
}
